use std::sync::Arc;

use tracing::info;

use common::{Agent, Error, Result, StorageRepo};

use crate::simple::{SimpleConfig, SimpleStrategy};
use crate::Strategy;

/// Every strategy kind the registry can build. Stored as a number next to
/// each agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyId {
    Simple,
}

impl StrategyId {
    pub const ALL: [StrategyId; 1] = [StrategyId::Simple];

    pub fn id(self) -> i64 {
        match self {
            StrategyId::Simple => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyId::Simple => SimpleStrategy::NAME,
        }
    }
}

impl TryFrom<i64> for StrategyId {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        StrategyId::ALL
            .into_iter()
            .find(|s| s.id() == id)
            .ok_or(Error::UnknownStrategy(id))
    }
}

/// Turns a stored strategy id and its serialized configuration into a
/// runnable strategy bound to the agent's own trade store.
pub struct StrategyRegistry;

impl StrategyRegistry {
    pub fn construct(
        strategy_id: i64,
        data: &[u8],
        agent_id: i64,
        storage: &dyn StorageRepo,
    ) -> Result<Arc<dyn Strategy>> {
        let strategy: Arc<dyn Strategy> = match StrategyId::try_from(strategy_id)? {
            StrategyId::Simple => {
                let config = SimpleConfig::from_json(data)?;
                Arc::new(SimpleStrategy::new(config, storage.simple_trades(agent_id)))
            }
        };
        info!(agent_id, strategy = %strategy.name(), "Constructed strategy");
        Ok(strategy)
    }

    pub fn for_agent(agent: &Agent, storage: &dyn StorageRepo) -> Result<Arc<dyn Strategy>> {
        Self::construct(agent.strategy_id, &agent.strategy_data, agent.id, storage)
    }
}

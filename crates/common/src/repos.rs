//! Lookups the scheduler performs to turn a stored agent into a running loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Agent, AgentStatus, Error, Exchange, Result, SimpleTradeStore};

/// Agent query. `None` fields are unrestricted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentFilter {
    pub id: Option<i64>,
    pub status: Option<AgentStatus>,
    pub user_id: Option<i64>,
}

impl AgentFilter {
    pub fn active() -> Self {
        Self {
            status: Some(AgentStatus::Active),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait AgentRepo: Send + Sync {
    async fn find_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>>;

    async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> Result<()>;
}

/// Supported venues, as stored next to an exchange account's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    Binance,
}

impl ExchangeKind {
    pub fn id(self) -> i64 {
        match self {
            ExchangeKind::Binance => 1,
        }
    }
}

impl TryFrom<i64> for ExchangeKind {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        match id {
            1 => Ok(ExchangeKind::Binance),
            other => Err(Error::Config(format!("unknown exchange kind {other}"))),
        }
    }
}

/// Stored exchange account: venue kind plus opaque credentials (JSON).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    pub id: i64,
    pub kind: ExchangeKind,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait ExchangeRecordRepo: Send + Sync {
    async fn agent_exchange_records(&self, agent_id: i64) -> Result<Vec<ExchangeRecord>>;
}

/// Resolves the live exchange connections bound to an agent.
#[async_trait]
pub trait ExchangeRepo: Send + Sync {
    async fn agent_exchanges(&self, agent_id: i64) -> Result<Vec<Arc<dyn Exchange>>>;
}

/// Hands out the trade store owned by one agent, one accessor per strategy kind.
pub trait StorageRepo: Send + Sync {
    fn simple_trades(&self, agent_id: i64) -> Arc<dyn SimpleTradeStore>;
}

pub mod registry;
pub mod simple;

pub use registry::{StrategyId, StrategyRegistry};
pub use simple::{SimpleConfig, SimpleStrategy};

use std::sync::Arc;

use async_trait::async_trait;

use common::{AgentLogger, Exchange, Result, Shutdown, StrategyParameter};

/// How a cycle ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every stage ran.
    Completed,
    /// Shutdown was observed at a checkpoint; later stages were skipped.
    /// Writes made before the checkpoint are kept.
    Interrupted,
}

/// All strategy implementations must satisfy this trait.
///
/// A strategy owns its configuration and its trade store; the scheduler only
/// supplies the agent's exchanges, its logger and the shutdown signal.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Human-readable name of the strategy kind.
    fn name(&self) -> &str;

    /// Configuration projected for display.
    fn parameters(&self) -> Vec<StrategyParameter>;

    /// Execute one cycle.
    async fn run(
        &self,
        exchanges: &[Arc<dyn Exchange>],
        logger: &dyn AgentLogger,
        shutdown: &Shutdown,
    ) -> Result<CycleOutcome>;
}

use std::sync::Arc;

use tracing::{debug, error, info, warn};

/// Per-agent log sink handed to a strategy for the duration of a cycle.
pub trait AgentLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Builds the logger for one agent.
pub trait LoggerFactory: Send + Sync {
    fn for_agent(&self, agent_id: i64) -> Arc<dyn AgentLogger>;
}

/// Forwards agent log lines to `tracing`, tagged with the agent id.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    agent_id: i64,
}

impl TracingLogger {
    pub fn new(agent_id: i64) -> Self {
        Self { agent_id }
    }
}

impl AgentLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(agent_id = self.agent_id, "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(agent_id = self.agent_id, "{message}");
    }

    fn error(&self, message: &str) {
        error!(agent_id = self.agent_id, "{message}");
    }

    fn debug(&self, message: &str) {
        debug!(agent_id = self.agent_id, "{message}");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLoggerFactory;

impl LoggerFactory for TracingLoggerFactory {
    fn for_agent(&self, agent_id: i64) -> Arc<dyn AgentLogger> {
        Arc::new(TracingLogger::new(agent_id))
    }
}

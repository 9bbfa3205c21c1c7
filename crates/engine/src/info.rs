use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use common::{Agent, Exchange, StrategyParameter};
use strategy::Strategy;

/// Display summary of a running agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub strategy_name: String,
    pub exchanges: Vec<String>,
    pub parameters: Vec<StrategyParameter>,
}

pub fn agent_info(
    agent: &Agent,
    strategy: &dyn Strategy,
    exchanges: &[Arc<dyn Exchange>],
) -> AgentInfo {
    AgentInfo {
        name: format!("agent:{:04}", agent.id),
        strategy_name: strategy.name().to_string(),
        exchanges: exchanges.iter().map(|e| e.name().to_string()).collect(),
        parameters: strategy.parameters(),
    }
}

impl fmt::Display for AgentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on [{}]",
            self.name,
            self.strategy_name,
            self.exchanges.join(", ")
        )?;
        for (i, p) in self.parameters.iter().enumerate() {
            let sep = if i == 0 { " (" } else { ", " };
            write!(f, "{sep}{}: {}", p.name, p.value)?;
        }
        if !self.parameters.is_empty() {
            write!(f, ")")?;
        }
        Ok(())
    }
}

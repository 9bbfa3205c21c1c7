pub mod binance;
pub mod info;
pub mod resolver;
pub mod scheduler;

pub use binance::BinanceClient;
pub use info::{agent_info, AgentInfo};
pub use resolver::{ExchangeResolver, PaperSettings};
pub use scheduler::AgentScheduler;

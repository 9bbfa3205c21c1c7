pub mod config;
pub mod error;
pub mod exchange;
pub mod logger;
pub mod repos;
pub mod shutdown;
pub mod trade;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use logger::{AgentLogger, LoggerFactory, TracingLogger, TracingLoggerFactory};
pub use repos::{
    AgentFilter, AgentRepo, ExchangeKind, ExchangeRecord, ExchangeRecordRepo, ExchangeRepo,
    StorageRepo,
};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use trade::{SimpleTrade, SimpleTradeStore, TradeFilter, TradeLeg, TradeStatus};
pub use types::*;

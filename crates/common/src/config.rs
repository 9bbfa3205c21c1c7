use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::TradingMode;

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Trading
    pub trading_mode: TradingMode,
    pub cycle_interval: Duration,

    // Paper simulation
    pub paper_quote_asset: String,
    pub paper_quote_balance: Decimal,
    pub paper_fee_rate: Decimal,
}

impl Config {
    pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 60;

    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!(
                "ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"
            ),
        };

        Config {
            database_url: required_env("DATABASE_URL"),
            trading_mode,
            cycle_interval: Duration::from_secs(
                optional_env("CYCLE_INTERVAL_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(Self::DEFAULT_CYCLE_INTERVAL_SECS),
            ),
            paper_quote_asset: optional_env("PAPER_QUOTE_ASSET").unwrap_or_else(|| "USDT".into()),
            paper_quote_balance: optional_env("PAPER_QUOTE_BALANCE")
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or(Decimal::ONE_THOUSAND),
            paper_fee_rate: optional_env("PAPER_FEE_RATE")
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or_else(|| Decimal::new(1, 3)),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

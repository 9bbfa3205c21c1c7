use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid strategy configuration: {0}")]
    Strategy(String),

    #[error("Unknown strategy id {0}")]
    UnknownStrategy(i64),

    #[error("Unrecognized commission asset '{asset}' for trade(id={trade_id})")]
    Commission { trade_id: i64, asset: String },

    #[error("Cannot quote trade(id={trade_id}): {reason}")]
    Quote { trade_id: i64, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors raised by the storage layer. These abort a strategy cycle.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Migration(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

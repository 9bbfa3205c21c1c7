pub mod sqlite;
mod trades;

pub use sqlite::SqliteStorage;
pub use trades::SqliteTradeStore;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, Shutdown, StorageRepo, TracingLoggerFactory, TradingMode};
use engine::{AgentScheduler, ExchangeResolver, PaperSettings};
use paper::MemoryStorage;
use storage::SqliteStorage;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, interval = ?cfg.cycle_interval, "agentd starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqliteStorage::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to database: {e}"));
    db.migrate()
        .await
        .unwrap_or_else(|e| panic!("Database migration failed: {e}"));
    info!("Database ready");
    let db = Arc::new(db);

    // ── Exchanges and trade stores (injected based on TRADING_MODE) ──────────
    let exchanges = ExchangeResolver::new(
        db.clone(),
        cfg.trading_mode,
        PaperSettings {
            quote_asset: cfg.paper_quote_asset.clone(),
            quote_balance: cfg.paper_quote_balance,
            fee_rate: cfg.paper_fee_rate,
        },
    );
    let trades: Arc<dyn StorageRepo> = match cfg.trading_mode {
        TradingMode::Live => db.clone(),
        TradingMode::Paper => {
            info!("Paper trading mode: simulated trades are kept in memory");
            Arc::new(MemoryStorage::new())
        }
    };

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let scheduler = AgentScheduler::new(
        db.clone(),
        Arc::new(exchanges),
        trades,
        Arc::new(TracingLoggerFactory),
        cfg.cycle_interval,
    );

    let (trigger, shutdown) = Shutdown::new();
    let mut agents = tokio::spawn(scheduler.run(shutdown));

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            None
        }
        result = &mut agents => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!("Shutdown signal received. Waiting for agents to stop.");
            trigger.trigger();
            agents.await
        }
    };
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Scheduler failed: {e}"),
        Err(e) => panic!("Scheduler task panicked: {e}"),
    }
    info!("agentd stopped");
}

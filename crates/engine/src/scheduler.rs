use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use common::{
    Agent, AgentFilter, AgentLogger, AgentRepo, AgentStatus, Exchange, ExchangeRepo,
    LoggerFactory, Result, Shutdown, StorageRepo,
};
use strategy::{CycleOutcome, Strategy, StrategyRegistry};

use crate::agent_info;

/// Everything one agent loop needs, resolved once at start-up.
struct AgentRunner {
    agent_id: i64,
    strategy: Arc<dyn Strategy>,
    exchanges: Vec<Arc<dyn Exchange>>,
    logger: Arc<dyn AgentLogger>,
    interval: Duration,
}

impl AgentRunner {
    /// Run cycles back to back, `interval` apart, until shutdown.
    async fn run(self, mut shutdown: Shutdown) {
        loop {
            match self
                .strategy
                .run(&self.exchanges, self.logger.as_ref(), &shutdown)
                .await
            {
                Ok(CycleOutcome::Completed) => {}
                Ok(CycleOutcome::Interrupted) => {
                    self.logger.info("cycle interrupted by shutdown");
                }
                Err(e) if e.is_persistence() => {
                    self.logger.error(&format!("cycle failed, trade store unavailable: {e}"));
                }
                Err(e) => self.logger.error(&e.to_string()),
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(agent_id = self.agent_id, "Agent loop stopped");
    }
}

/// Run one agent loop in its own task. A panic ends only that loop: it is
/// logged as soon as it happens and the agent is marked `Error`.
async fn supervise(runner: AgentRunner, shutdown: Shutdown, agents: Arc<dyn AgentRepo>) {
    let agent_id = runner.agent_id;
    if let Err(e) = tokio::spawn(runner.run(shutdown)).await {
        error!(agent_id, error = %e, "Agent loop panicked");
        mark_failed(agents.as_ref(), agent_id).await;
    }
}

async fn mark_failed(agents: &dyn AgentRepo, agent_id: i64) {
    if let Err(e) = agents.set_agent_status(agent_id, AgentStatus::Error).await {
        warn!(agent_id, error = %e, "Could not mark agent as failed");
    }
}

/// Drives one independent loop per active agent until shutdown.
pub struct AgentScheduler {
    agents: Arc<dyn AgentRepo>,
    exchanges: Arc<dyn ExchangeRepo>,
    storage: Arc<dyn StorageRepo>,
    loggers: Arc<dyn LoggerFactory>,
    interval: Duration,
}

impl AgentScheduler {
    pub fn new(
        agents: Arc<dyn AgentRepo>,
        exchanges: Arc<dyn ExchangeRepo>,
        storage: Arc<dyn StorageRepo>,
        loggers: Arc<dyn LoggerFactory>,
        interval: Duration,
    ) -> Self {
        Self {
            agents,
            exchanges,
            storage,
            loggers,
            interval,
        }
    }

    /// Start every agent that is active right now and wait until all of them
    /// have stopped. Agents activated later are picked up on the next start.
    ///
    /// An agent that cannot be set up is marked `Error` and skipped. Only a
    /// failure to list agents is returned.
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let agents = self.agents.find_agents(&AgentFilter::active()).await?;
        info!(count = agents.len(), interval = ?self.interval, "Starting agents");

        let mut loops = JoinSet::new();
        for agent in &agents {
            match self.prepare(agent).await {
                Ok(runner) => {
                    loops.spawn(supervise(runner, shutdown.clone(), self.agents.clone()));
                }
                Err(e) => {
                    error!(agent_id = agent.id, error = %e, "Agent failed to start");
                    mark_failed(self.agents.as_ref(), agent.id).await;
                }
            }
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Agent supervisor failed");
            }
        }
        info!("All agents stopped");
        Ok(())
    }

    async fn prepare(&self, agent: &Agent) -> Result<AgentRunner> {
        let strategy = StrategyRegistry::for_agent(agent, self.storage.as_ref())?;
        let exchanges = self.exchanges.agent_exchanges(agent.id).await?;
        let logger = self.loggers.for_agent(agent.id);

        let info = agent_info(agent, strategy.as_ref(), &exchanges);
        logger.info(&format!("starting {info}"));

        Ok(AgentRunner {
            agent_id: agent.id,
            strategy,
            exchanges,
            logger,
            interval: self.interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Balance, Order, OrderFilter, Pair, TracingLoggerFactory};
    use rust_decimal::Decimal;
    use paper::{MemoryStorage, PaperExchange};
    use rust_decimal_macros::dec;
    use strategy::{SimpleConfig, StrategyId};

    /// Venue whose first call blows up the agent loop.
    struct Exploding;

    #[async_trait]
    impl Exchange for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }
        async fn balances(&self, _assets: &[String]) -> Result<Vec<Balance>> {
            panic!("venue client crashed");
        }
        async fn open_orders(&self, _filter: &OrderFilter) -> Result<Vec<Order>> {
            unreachable!()
        }
        async fn history_orders(&self, _pairs: &[Pair]) -> Result<Vec<Order>> {
            unreachable!()
        }
        async fn last_price(&self, _pair: &Pair) -> Result<Decimal> {
            unreachable!()
        }
        async fn buy(&self, _pair: &Pair, _amount: Decimal) -> Result<Order> {
            unreachable!()
        }
        async fn sell(&self, _pair: &Pair, _amount: Decimal, _price: Decimal) -> Result<Order> {
            unreachable!()
        }
        async fn cancel_order(&self, _id: &str, _pair: &Pair) -> Result<()> {
            unreachable!()
        }
        async fn order_fee(&self, _pair: &Pair, _amount: Decimal, _price: Decimal) -> Result<Balance> {
            unreachable!()
        }
        async fn pair_fee(&self, _pair: &Pair) -> Result<Balance> {
            unreachable!()
        }
    }

    fn btc() -> Pair {
        Pair::new("BTC", "USDT")
    }

    fn agent(id: i64, status: AgentStatus, data: Vec<u8>) -> Agent {
        Agent {
            id,
            user_id: 1,
            status,
            strategy_id: StrategyId::Simple.id(),
            strategy_data: data,
        }
    }

    fn config_json() -> Vec<u8> {
        SimpleConfig {
            pair: btc(),
            base_quantity: dec!(0.01),
            max_trades: 1,
            profit_percent: dec!(0.01),
            far_price_percent: dec!(0.01),
        }
        .to_json()
        .unwrap()
    }

    async fn venue() -> Arc<PaperExchange> {
        let exchange = PaperExchange::new(dec!(0.001));
        exchange.deposit("USDT", dec!(1000)).await;
        exchange.set_price(&btc(), dec!(20000)).await;
        Arc::new(exchange)
    }

    fn scheduler(storage: &Arc<MemoryStorage>, interval: Duration) -> AgentScheduler {
        AgentScheduler::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            Arc::new(TracingLoggerFactory),
            interval,
        )
    }

    #[tokio::test]
    async fn runs_active_agents_until_shutdown() {
        let storage = Arc::new(MemoryStorage::new());
        let exchange = venue().await;
        storage.add_agent(agent(1, AgentStatus::Active, config_json()), vec![exchange.clone()]);
        storage.add_agent(agent(2, AgentStatus::Disabled, config_json()), vec![venue().await]);

        let (trigger, shutdown) = Shutdown::new();
        let handle = tokio::spawn(scheduler(&storage, Duration::from_millis(10)).run(shutdown));

        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
        handle.await.unwrap().unwrap();

        assert_eq!(storage.trade_store(1).all().await.len(), 1);
        assert!(storage.trade_store(2).all().await.is_empty());
        // Repeated cycles did not open a second trade past max_trades.
        assert_eq!(exchange.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn broken_agent_is_marked_and_others_keep_running() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_agent(agent(1, AgentStatus::Active, b"{}".to_vec()), vec![venue().await]);
        storage.add_agent(agent(2, AgentStatus::Active, config_json()), vec![venue().await]);

        let (trigger, shutdown) = Shutdown::new();
        let handle = tokio::spawn(scheduler(&storage, Duration::from_secs(60)).run(shutdown));

        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        handle.await.unwrap().unwrap();

        assert_eq!(storage.agent(1).unwrap().status, AgentStatus::Error);
        assert_eq!(storage.agent(2).unwrap().status, AgentStatus::Active);
        assert_eq!(storage.trade_store(2).all().await.len(), 1);
    }

    #[tokio::test]
    async fn panicking_agent_is_marked_while_others_keep_trading() {
        let storage = Arc::new(MemoryStorage::new());
        let healthy = venue().await;
        storage.add_agent(agent(1, AgentStatus::Active, config_json()), vec![Arc::new(Exploding)]);
        storage.add_agent(agent(2, AgentStatus::Active, config_json()), vec![healthy.clone()]);

        let (trigger, shutdown) = Shutdown::new();
        let handle = tokio::spawn(scheduler(&storage, Duration::from_millis(10)).run(shutdown));

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Reported while the scheduler is still running, not at shutdown.
        assert_eq!(storage.agent(1).unwrap().status, AgentStatus::Error);
        let orders_so_far = healthy.orders().await.len();
        assert_eq!(orders_so_far, 2);

        // A fill a few ticks later is still picked up by agent 2.
        healthy.set_price(&btc(), dec!(20300)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
        handle.await.unwrap().unwrap();

        assert_eq!(storage.agent(2).unwrap().status, AgentStatus::Active);
        let trades = storage.trade_store(2).all().await;
        assert_eq!(trades[0].status, common::TradeStatus::Finish);
        assert!(storage.trade_store(1).all().await.is_empty());
    }

    #[tokio::test]
    async fn failing_cycles_do_not_stop_the_loop() {
        let storage = Arc::new(MemoryStorage::new());
        // No price set: every cycle fails on last_price.
        let exchange = Arc::new(PaperExchange::new(dec!(0.001)));
        exchange.deposit("USDT", dec!(1000)).await;
        storage.add_agent(agent(1, AgentStatus::Active, config_json()), vec![exchange.clone()]);

        let (trigger, shutdown) = Shutdown::new();
        let handle = tokio::spawn(scheduler(&storage, Duration::from_millis(10)).run(shutdown));

        tokio::time::sleep(Duration::from_millis(30)).await;
        exchange.set_price(&btc(), dec!(20000)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
        handle.await.unwrap().unwrap();

        assert_eq!(storage.trade_store(1).all().await.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_interval_wait() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_agent(agent(1, AgentStatus::Active, config_json()), vec![venue().await]);

        let (trigger, shutdown) = Shutdown::new();
        let handle = tokio::spawn(scheduler(&storage, Duration::from_secs(3600)).run(shutdown));

        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop promptly")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn no_active_agents_returns_after_shutdown() {
        let storage = Arc::new(MemoryStorage::new());
        let (trigger, shutdown) = Shutdown::new();
        trigger.trigger();
        scheduler(&storage, Duration::from_secs(1))
            .run(shutdown)
            .await
            .unwrap();
    }
}

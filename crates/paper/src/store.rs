use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::{
    Agent, AgentFilter, AgentRepo, AgentStatus, Error, Exchange, ExchangeRepo, Result,
    SimpleTrade, SimpleTradeStore, StorageRepo, TradeFilter,
};

/// Trade store kept in memory. Used for paper trading, where simulated
/// orders do not outlive the process, and in tests.
#[derive(Default)]
pub struct MemoryTradeStore {
    trades: RwLock<Vec<SimpleTrade>>,
    /// When set, every save fails like an unreachable database.
    failing: AtomicBool,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with trades, bypassing `failing`. Trades with id 0 get
    /// fresh ids; others are stored as given.
    pub async fn seed(&self, trades: impl IntoIterator<Item = SimpleTrade>) -> Vec<i64> {
        let mut stored = self.trades.write().await;
        let mut ids = Vec::new();
        for mut trade in trades {
            if trade.id == 0 {
                trade.id = next_id(&stored);
            }
            ids.push(trade.id);
            stored.push(trade);
        }
        ids
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of every stored trade in insertion order.
    pub async fn all(&self) -> Vec<SimpleTrade> {
        self.trades.read().await.clone()
    }

    async fn insert_or_update(&self, trade: &mut SimpleTrade) -> Result<()> {
        let mut trades = self.trades.write().await;
        if trade.id == 0 {
            trade.id = next_id(&trades);
            trades.push(trade.clone());
            return Ok(());
        }
        match trades.iter_mut().find(|t| t.id == trade.id) {
            Some(stored) => {
                *stored = trade.clone();
                Ok(())
            }
            None => Err(Error::Database(sqlx::Error::RowNotFound)),
        }
    }
}

fn next_id(trades: &[SimpleTrade]) -> i64 {
    trades.iter().map(|t| t.id).max().unwrap_or(0) + 1
}

#[async_trait]
impl SimpleTradeStore for MemoryTradeStore {
    async fn get_trades(&self, filter: &TradeFilter) -> Result<Vec<SimpleTrade>> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn save_trade(&self, trade: &mut SimpleTrade) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolClosed));
        }
        self.insert_or_update(trade).await
    }
}

/// In-memory agents, exchanges and per-agent trade stores.
#[derive(Default)]
pub struct MemoryStorage {
    agents: Mutex<Vec<Agent>>,
    exchanges: Mutex<HashMap<i64, Vec<Arc<dyn Exchange>>>>,
    stores: Mutex<HashMap<i64, Arc<MemoryTradeStore>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&self, agent: Agent, exchanges: Vec<Arc<dyn Exchange>>) {
        lock(&self.exchanges).insert(agent.id, exchanges);
        lock(&self.agents).push(agent);
    }

    /// The concrete store behind `simple_trades`, for inspection.
    pub fn trade_store(&self, agent_id: i64) -> Arc<MemoryTradeStore> {
        lock(&self.stores)
            .entry(agent_id)
            .or_insert_with(|| Arc::new(MemoryTradeStore::new()))
            .clone()
    }

    pub fn agent(&self, agent_id: i64) -> Option<Agent> {
        lock(&self.agents).iter().find(|a| a.id == agent_id).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AgentRepo for MemoryStorage {
    async fn find_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        Ok(lock(&self.agents)
            .iter()
            .filter(|a| filter.id.map_or(true, |id| a.id == id))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.user_id.map_or(true, |u| a.user_id == u))
            .cloned()
            .collect())
    }

    async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> Result<()> {
        let mut agents = lock(&self.agents);
        let agent = agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or(Error::Database(sqlx::Error::RowNotFound))?;
        agent.status = status;
        Ok(())
    }
}

#[async_trait]
impl ExchangeRepo for MemoryStorage {
    async fn agent_exchanges(&self, agent_id: i64) -> Result<Vec<Arc<dyn Exchange>>> {
        Ok(lock(&self.exchanges)
            .get(&agent_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl StorageRepo for MemoryStorage {
    fn simple_trades(&self, agent_id: i64) -> Arc<dyn SimpleTradeStore> {
        self.trade_store(agent_id)
    }
}

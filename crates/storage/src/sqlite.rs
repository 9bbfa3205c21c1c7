use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use common::{
    Agent, AgentFilter, AgentRepo, AgentStatus, Error, ExchangeKind, ExchangeRecord,
    ExchangeRecordRepo, Result, SimpleTradeStore, StorageRepo,
};

use crate::SqliteTradeStore;

/// SQLite-backed agents, exchange accounts and per-agent trade stores.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct AgentRow {
    id: i64,
    user_id: i64,
    status: AgentStatus,
    strategy_id: i64,
    strategy_data: Vec<u8>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
            strategy_id: row.strategy_id,
            strategy_data: row.strategy_data,
        }
    }
}

#[derive(FromRow)]
struct ExchangeRow {
    id: i64,
    kind: i64,
    data: Vec<u8>,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store a new agent. Agents start disabled.
    pub async fn create_agent(&self, user_id: i64, strategy_id: i64, data: &[u8]) -> Result<Agent> {
        let status = AgentStatus::Disabled;
        let id = sqlx::query(
            "INSERT INTO agents (user_id, status, strategy_id, strategy_data) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(status)
        .bind(strategy_id)
        .bind(data)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        info!(agent_id = id, user_id, strategy_id, "Agent created");
        Ok(Agent {
            id,
            user_id,
            status,
            strategy_id,
            strategy_data: data.to_vec(),
        })
    }

    pub async fn update_strategy_data(&self, agent_id: i64, data: &[u8]) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET strategy_data = ?1 WHERE id = ?2")
            .bind(data)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    /// Register an exchange account for a user.
    pub async fn add_exchange(
        &self,
        user_id: i64,
        kind: ExchangeKind,
        data: &[u8],
    ) -> Result<ExchangeRecord> {
        let id = sqlx::query("INSERT INTO exchanges (user_id, kind, data) VALUES (?1, ?2, ?3)")
            .bind(user_id)
            .bind(kind.id())
            .bind(data)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        info!(exchange_id = id, user_id, ?kind, "Exchange account added");
        Ok(ExchangeRecord {
            id,
            kind,
            data: data.to_vec(),
        })
    }

    /// Bind an existing exchange account to an agent. Attaching twice is a no-op.
    pub async fn attach_exchange(&self, agent_id: i64, exchange_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_exchange (agent_id, exchange_id) VALUES (?1, ?2) \
             ON CONFLICT(agent_id, exchange_id) DO NOTHING",
        )
        .bind(agent_id)
        .bind(exchange_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn trade_store(&self, agent_id: i64) -> SqliteTradeStore {
        SqliteTradeStore::new(self.pool.clone(), agent_id)
    }
}

#[async_trait]
impl AgentRepo for SqliteStorage {
    async fn find_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, status, strategy_id, strategy_data FROM agents WHERE 1 = 1",
        );
        if let Some(id) = filter.id {
            query.push(" AND id = ").push_bind(id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        query.push(" ORDER BY id");

        let rows: Vec<AgentRow> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Agent::from).collect())
    }

    async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::Database(sqlx::Error::RowNotFound));
        }
        info!(agent_id, ?status, "Agent status changed");
        Ok(())
    }
}

#[async_trait]
impl ExchangeRecordRepo for SqliteStorage {
    async fn agent_exchange_records(&self, agent_id: i64) -> Result<Vec<ExchangeRecord>> {
        let rows: Vec<ExchangeRow> = sqlx::query_as(
            r#"
            SELECT e.id, e.kind, e.data
            FROM agent_exchange AS ae
            JOIN exchanges AS e ON e.id = ae.exchange_id
            WHERE ae.agent_id = ?1
            ORDER BY e.id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ExchangeRecord {
                    id: row.id,
                    kind: ExchangeKind::try_from(row.kind)?,
                    data: row.data,
                })
            })
            .collect()
    }
}

impl StorageRepo for SqliteStorage {
    fn simple_trades(&self, agent_id: i64) -> Arc<dyn SimpleTradeStore> {
        Arc::new(self.trade_store(agent_id))
    }
}

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use common::{
    Balance, Error, Result, SimpleTrade, SimpleTradeStore, TradeFilter, TradeLeg, TradeStatus,
};

/// Simple-strategy trades of one agent.
#[derive(Clone)]
pub struct SqliteTradeStore {
    pool: SqlitePool,
    agent_id: i64,
}

impl SqliteTradeStore {
    pub fn new(pool: SqlitePool, agent_id: i64) -> Self {
        Self { pool, agent_id }
    }
}

#[derive(FromRow)]
struct TradeRow {
    id: i64,
    status: TradeStatus,
    amount: String,
    buy_order_id: String,
    buy_timestamp: Option<String>,
    buy_price: String,
    buy_commission_asset: String,
    buy_commission_amount: String,
    sell_order_id: String,
    sell_timestamp: Option<String>,
    sell_price: String,
    sell_commission_asset: String,
    sell_commission_amount: String,
}

fn column_error(
    column: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> Error {
    Error::Database(sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    })
}

fn decimal(column: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| column_error(column, e))
}

fn timestamp(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| column_error(column, e))
        })
        .transpose()
}

impl TryFrom<TradeRow> for SimpleTrade {
    type Error = Error;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(SimpleTrade {
            id: row.id,
            status: row.status,
            amount: decimal("amount", &row.amount)?,
            buy: TradeLeg {
                order_id: row.buy_order_id,
                timestamp: timestamp("buy_timestamp", row.buy_timestamp)?,
                price: decimal("buy_price", &row.buy_price)?,
                commission: Balance::new(
                    row.buy_commission_asset,
                    decimal("buy_commission_amount", &row.buy_commission_amount)?,
                ),
            },
            sell: TradeLeg {
                order_id: row.sell_order_id,
                timestamp: timestamp("sell_timestamp", row.sell_timestamp)?,
                price: decimal("sell_price", &row.sell_price)?,
                commission: Balance::new(
                    row.sell_commission_asset,
                    decimal("sell_commission_amount", &row.sell_commission_amount)?,
                ),
            },
        })
    }
}

#[async_trait]
impl SimpleTradeStore for SqliteTradeStore {
    async fn get_trades(&self, filter: &TradeFilter) -> Result<Vec<SimpleTrade>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, status, amount, \
             buy_order_id, buy_timestamp, buy_price, buy_commission_asset, buy_commission_amount, \
             sell_order_id, sell_timestamp, sell_price, sell_commission_asset, sell_commission_amount \
             FROM simple_trades WHERE agent_id = ",
        );
        query.push_bind(self.agent_id);
        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(*status);
            }
            statuses.push_unseparated(")");
        }
        query.push(" ORDER BY id");

        let rows: Vec<TradeRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(SimpleTrade::try_from).collect()
    }

    async fn save_trade(&self, trade: &mut SimpleTrade) -> Result<()> {
        let buy_ts = trade.buy.timestamp.map(|t| t.to_rfc3339());
        let sell_ts = trade.sell.timestamp.map(|t| t.to_rfc3339());

        if trade.id == 0 {
            let id = sqlx::query(
                r#"
                INSERT INTO simple_trades (
                    agent_id, status, amount,
                    buy_order_id, buy_timestamp, buy_price, buy_commission_asset, buy_commission_amount,
                    sell_order_id, sell_timestamp, sell_price, sell_commission_asset, sell_commission_amount
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )
            .bind(self.agent_id)
            .bind(trade.status)
            .bind(trade.amount.to_string())
            .bind(&trade.buy.order_id)
            .bind(buy_ts)
            .bind(trade.buy.price.to_string())
            .bind(&trade.buy.commission.asset)
            .bind(trade.buy.commission.amount.to_string())
            .bind(&trade.sell.order_id)
            .bind(sell_ts)
            .bind(trade.sell.price.to_string())
            .bind(&trade.sell.commission.asset)
            .bind(trade.sell.commission.amount.to_string())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

            trade.id = id;
            debug!(agent_id = self.agent_id, trade_id = id, status = %trade.status, "Trade inserted");
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE simple_trades SET
                status = ?1, amount = ?2,
                buy_order_id = ?3, buy_timestamp = ?4, buy_price = ?5,
                buy_commission_asset = ?6, buy_commission_amount = ?7,
                sell_order_id = ?8, sell_timestamp = ?9, sell_price = ?10,
                sell_commission_asset = ?11, sell_commission_amount = ?12
            WHERE id = ?13 AND agent_id = ?14
            "#,
        )
        .bind(trade.status)
        .bind(trade.amount.to_string())
        .bind(&trade.buy.order_id)
        .bind(buy_ts)
        .bind(trade.buy.price.to_string())
        .bind(&trade.buy.commission.asset)
        .bind(trade.buy.commission.amount.to_string())
        .bind(&trade.sell.order_id)
        .bind(sell_ts)
        .bind(trade.sell.price.to_string())
        .bind(&trade.sell.commission.asset)
        .bind(trade.sell.commission.amount.to_string())
        .bind(trade.id)
        .bind(self.agent_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(sqlx::Error::RowNotFound));
        }
        debug!(agent_id = self.agent_id, trade_id = trade.id, status = %trade.status, "Trade updated");
        Ok(())
    }
}

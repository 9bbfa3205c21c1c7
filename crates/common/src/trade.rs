use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Balance, Order, Result};

/// Stage of a simple-strategy round-trip. Only ever advances
/// `Buy -> Sell -> Finish`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradeStatus {
    /// Buy order placed, waiting for it to fill.
    Buy,
    /// Base asset held; a sell order may or may not be resting.
    Sell,
    /// Sell order filled. Terminal.
    Finish,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Buy => write!(f, "buy"),
            TradeStatus::Sell => write!(f, "sell"),
            TradeStatus::Finish => write!(f, "finish"),
        }
    }
}

/// One side of a round-trip. An empty `order_id` means the side was not acted on yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    pub order_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub price: Decimal,
    pub commission: Balance,
}

impl TradeLeg {
    /// Leg populated from a freshly placed order, stamped now.
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            timestamp: Some(Utc::now()),
            price: order.price,
            commission: order.commission.clone(),
        }
    }

    pub fn is_placed(&self) -> bool {
        !self.order_id.is_empty()
    }
}

/// Bookkeeping unit of the simple strategy: one buy/sell round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTrade {
    /// Assigned by the store on first save; 0 before that.
    pub id: i64,
    pub status: TradeStatus,
    /// Base-asset quantity held.
    pub amount: Decimal,
    pub buy: TradeLeg,
    pub sell: TradeLeg,
}

impl SimpleTrade {
    /// New trade for a placed buy order. Starts in `Sell` when the venue
    /// reports the order as already filled.
    pub fn opened(order: &Order) -> Self {
        Self {
            id: 0,
            status: if order.is_filled() {
                TradeStatus::Sell
            } else {
                TradeStatus::Buy
            },
            amount: order.amount,
            buy: TradeLeg::from_order(order),
            sell: TradeLeg::default(),
        }
    }

    /// Move forward to `next`. Returns false, leaving the trade untouched,
    /// when that would be a step backwards or a no-op.
    pub fn advance(&mut self, next: TradeStatus) -> bool {
        if next <= self.status {
            return false;
        }
        self.status = next;
        true
    }

    pub fn is_open(&self) -> bool {
        self.status != TradeStatus::Finish
    }

    /// Waiting for a resting sell order to fill.
    pub fn awaits_sell_fill(&self) -> bool {
        self.status == TradeStatus::Sell && self.sell.is_placed()
    }
}

/// Which trades a store query returns. An empty status list returns everything.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub statuses: Vec<TradeStatus>,
}

impl TradeFilter {
    pub fn open() -> Self {
        Self {
            statuses: vec![TradeStatus::Buy, TradeStatus::Sell],
        }
    }

    pub fn matches(&self, trade: &SimpleTrade) -> bool {
        self.statuses.is_empty() || self.statuses.contains(&trade.status)
    }
}

/// Persistence for simple-strategy trades, owned by exactly one agent.
#[async_trait]
pub trait SimpleTradeStore: Send + Sync {
    async fn get_trades(&self, filter: &TradeFilter) -> Result<Vec<SimpleTrade>>;

    /// Insert when `trade.id == 0` (assigning the new id), update by id otherwise.
    async fn save_trade(&self, trade: &mut SimpleTrade) -> Result<()>;
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trading pair, e.g. BTC/USDT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base_asset: String,
    pub quote_asset: String,
}

impl Pair {
    pub fn new(base_asset: impl Into<String>, quote_asset: impl Into<String>) -> Self {
        Self {
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
        }
    }

    /// Venue symbol without separator, e.g. "BTCUSDT".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base_asset, self.quote_asset)
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base_asset, self.quote_asset)
    }
}

/// An amount of a single asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub amount: Decimal,
}

impl Balance {
    pub fn new(asset: impl Into<String>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
        }
    }

    pub fn zero(asset: impl Into<String>) -> Self {
        Self::new(asset, Decimal::ZERO)
    }
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.asset)
    }
}

/// Venue-side lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Canceled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Snapshot of an order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub price: Decimal,
    pub amount: Decimal,
    pub pair: Pair,
    /// Fee charged for the order. The asset may be neither leg of the pair.
    pub commission: Balance,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}

/// Narrows an open-orders query. Empty vectors mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub ids: Vec<String>,
    pub statuses: Vec<OrderStatus>,
    pub pairs: Vec<Pair>,
}

impl OrderFilter {
    pub fn for_pair(pair: &Pair) -> Self {
        Self {
            pairs: vec![pair.clone()],
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        (self.ids.is_empty() || self.ids.contains(&order.id))
            && (self.statuses.is_empty() || self.statuses.contains(&order.status))
            && (self.pairs.is_empty() || self.pairs.contains(&order.pair))
    }
}

/// Whether an agent's loop is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum AgentStatus {
    Disabled,
    Active,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Disabled => write!(f, "disabled"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// A persisted binding of one strategy, its configuration and its exchanges to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub user_id: i64,
    pub status: AgentStatus,
    /// Numeric strategy identifier, resolved by the strategy registry.
    pub strategy_id: i64,
    /// Serialized strategy configuration (JSON).
    pub strategy_data: Vec<u8>,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Typed value of a strategy parameter, used for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    Pair(Pair),
    Balance(Balance),
    Int(i64),
    Percent(Decimal),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Pair(p) => write!(f, "{p}"),
            ParameterValue::Balance(b) => write!(f, "{b}"),
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Percent(v) => {
                write!(f, "{}%", (*v * Decimal::ONE_HUNDRED).normalize())
            }
        }
    }
}

/// Named, human-readable projection of one strategy configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameter {
    pub name: String,
    pub value: ParameterValue,
}

impl StrategyParameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

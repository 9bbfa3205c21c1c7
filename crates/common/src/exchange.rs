use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{Balance, Order, OrderFilter, Pair, Result};

/// Everything a strategy needs from a trading venue.
///
/// `BinanceClient` implements this for live trading.
/// `PaperExchange` implements this for simulation.
///
/// Strategies only ever see a `dyn Exchange`; every method may fail with a
/// venue error, which callers treat as retryable on the next cycle.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Short venue name for display.
    fn name(&self) -> &str;

    /// Free balances for the given assets. Assets the venue does not report
    /// are simply missing from the result.
    async fn balances(&self, assets: &[String]) -> Result<Vec<Balance>>;

    /// Currently resting orders matching `filter`.
    async fn open_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Order history (any status) for the given pairs.
    async fn history_orders(&self, pairs: &[Pair]) -> Result<Vec<Order>>;

    /// Latest traded price, in quote asset per base unit.
    async fn last_price(&self, pair: &Pair) -> Result<Decimal>;

    /// Market buy of `amount` base units.
    async fn buy(&self, pair: &Pair, amount: Decimal) -> Result<Order>;

    /// Limit sell of `amount` base units at `price`.
    async fn sell(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<Order>;

    async fn cancel_order(&self, id: &str, pair: &Pair) -> Result<()>;

    /// Expected fee for an order of `amount` at `price`.
    async fn order_fee(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<Balance>;

    /// Flat fee fraction charged on the pair (e.g. 0.001 = 0.1%).
    async fn pair_fee(&self, pair: &Pair) -> Result<Balance>;
}

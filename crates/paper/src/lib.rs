pub mod store;

pub use store::{MemoryStorage, MemoryTradeStore};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Balance, Error, Exchange, Order, OrderFilter, OrderStatus, Pair, Result};

/// Simulated exchange for paper trading and tests.
///
/// Market buys fill at the latest known price, limit sells rest until the
/// price reaches them. Fees are a flat fraction charged in the quote asset.
/// No real orders are ever sent anywhere.
pub struct PaperExchange {
    state: Arc<RwLock<PaperState>>,
    /// Optional live venue used only for `last_price`.
    price_feed: Option<Arc<dyn Exchange>>,
    /// When set, market buys rest as pending until `fill_order` is called.
    pending_buys: bool,
}

#[derive(Default)]
struct PaperState {
    balances: HashMap<String, Decimal>,
    prices: HashMap<Pair, Decimal>,
    /// Every order ever placed, oldest first.
    orders: Vec<Order>,
    fee_rate: Decimal,
}

impl PaperState {
    fn credit(&mut self, asset: &str, amount: Decimal) {
        *self.balances.entry(asset.to_string()).or_default() += amount;
    }

    fn debit(&mut self, asset: &str, amount: Decimal) -> Result<()> {
        let free = self.balances.entry(asset.to_string()).or_default();
        if *free < amount {
            return Err(Error::Exchange(format!(
                "insufficient {asset}: need {amount}, have {free}"
            )));
        }
        *free -= amount;
        Ok(())
    }

    fn fee(&self, amount: Decimal, price: Decimal) -> Decimal {
        amount * price * self.fee_rate
    }

    /// Settle a pending order at its own price.
    fn settle(&mut self, index: usize) {
        let order = self.orders[index].clone();
        let pair = &order.pair;
        if order.id.starts_with(SELL_PREFIX) {
            let fee = self.fee(order.amount, order.price);
            self.credit(&pair.quote_asset, order.amount * order.price - fee);
            self.orders[index].commission = Balance::new(pair.quote_asset.clone(), fee);
        } else {
            // Quote and fee were reserved at placement.
            self.credit(&pair.base_asset, order.amount);
        }
        self.orders[index].status = OrderStatus::Filled;
    }

    /// Fill every resting sell on `pair` priced at or below `price`.
    fn fill_crossed(&mut self, pair: &Pair, price: Decimal) {
        let crossed: Vec<usize> = self
            .orders
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                o.status == OrderStatus::Pending
                    && &o.pair == pair
                    && o.id.starts_with(SELL_PREFIX)
                    && o.price <= price
            })
            .map(|(i, _)| i)
            .collect();
        for index in crossed {
            debug!(order_id = %self.orders[index].id, %price, "Paper sell filled");
            self.settle(index);
        }
    }
}

const BUY_PREFIX: &str = "paper-buy-";
const SELL_PREFIX: &str = "paper-sell-";

impl PaperExchange {
    pub fn new(fee_rate: Decimal) -> Self {
        info!(%fee_rate, "PaperExchange initialized");
        Self {
            state: Arc::new(RwLock::new(PaperState {
                fee_rate,
                ..PaperState::default()
            })),
            price_feed: None,
            pending_buys: false,
        }
    }

    /// Take `last_price` from a live venue instead of `set_price`.
    pub fn with_price_feed(mut self, feed: Arc<dyn Exchange>) -> Self {
        self.price_feed = Some(feed);
        self
    }

    /// Leave market buys pending until `fill_order`.
    pub fn with_pending_buys(mut self) -> Self {
        self.pending_buys = true;
        self
    }

    pub async fn deposit(&self, asset: &str, amount: Decimal) {
        self.state.write().await.credit(asset, amount);
    }

    /// Update the latest price for a pair and fill sells it crosses.
    pub async fn set_price(&self, pair: &Pair, price: Decimal) {
        let mut state = self.state.write().await;
        state.prices.insert(pair.clone(), price);
        state.fill_crossed(pair, price);
    }

    pub async fn set_fee_rate(&self, fee_rate: Decimal) {
        self.state.write().await.fee_rate = fee_rate;
    }

    /// Fill a pending order at its own price.
    pub async fn fill_order(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state
            .orders
            .iter()
            .position(|o| o.id == id && o.status == OrderStatus::Pending)
            .ok_or_else(|| Error::Exchange(format!("no pending paper order '{id}'")))?;
        state.settle(index);
        Ok(())
    }

    /// Every order placed so far, any status.
    pub async fn orders(&self) -> Vec<Order> {
        self.state.read().await.orders.clone()
    }

    pub async fn balance(&self, asset: &str) -> Decimal {
        self.state
            .read()
            .await
            .balances
            .get(asset)
            .copied()
            .unwrap_or_default()
    }

    async fn current_price(&self, pair: &Pair) -> Result<Decimal> {
        self.state
            .read()
            .await
            .prices
            .get(pair)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No price available for {pair}")))
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn balances(&self, assets: &[String]) -> Result<Vec<Balance>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .iter()
            .filter(|(asset, _)| assets.is_empty() || assets.contains(asset))
            .map(|(asset, amount)| Balance::new(asset.clone(), *amount))
            .collect())
    }

    async fn open_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending && filter.matches(o))
            .cloned()
            .collect())
    }

    async fn history_orders(&self, pairs: &[Pair]) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| pairs.is_empty() || pairs.contains(&o.pair))
            .cloned()
            .collect())
    }

    async fn last_price(&self, pair: &Pair) -> Result<Decimal> {
        match &self.price_feed {
            Some(feed) => {
                let price = feed.last_price(pair).await?;
                self.set_price(pair, price).await;
                Ok(price)
            }
            None => self.current_price(pair).await,
        }
    }

    async fn buy(&self, pair: &Pair, amount: Decimal) -> Result<Order> {
        let price = self.current_price(pair).await?;
        let mut state = self.state.write().await;

        let fee = state.fee(amount, price);
        state.debit(&pair.quote_asset, amount * price + fee)?;

        let order = Order {
            id: format!("{BUY_PREFIX}{}", uuid::Uuid::new_v4()),
            status: OrderStatus::Pending,
            price,
            amount,
            pair: pair.clone(),
            commission: Balance::new(pair.quote_asset.clone(), fee),
        };
        state.orders.push(order);
        let index = state.orders.len() - 1;
        if !self.pending_buys {
            state.settle(index);
        }

        debug!(pair = %pair, %amount, %price, "Paper buy placed");
        Ok(state.orders[index].clone())
    }

    async fn sell(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<Order> {
        let mut state = self.state.write().await;
        state.debit(&pair.base_asset, amount)?;

        state.orders.push(Order {
            id: format!("{SELL_PREFIX}{}", uuid::Uuid::new_v4()),
            status: OrderStatus::Pending,
            price,
            amount,
            pair: pair.clone(),
            commission: Balance::zero(pair.quote_asset.clone()),
        });
        let index = state.orders.len() - 1;
        if let Some(market) = state.prices.get(pair).copied() {
            state.fill_crossed(pair, market);
        }

        debug!(pair = %pair, %amount, %price, "Paper sell placed");
        Ok(state.orders[index].clone())
    }

    async fn cancel_order(&self, id: &str, pair: &Pair) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state
            .orders
            .iter()
            .position(|o| o.id == id && &o.pair == pair && o.status == OrderStatus::Pending)
            .ok_or_else(|| Error::Exchange(format!("no open paper order '{id}' on {pair}")))?;

        let order = state.orders[index].clone();
        if order.id.starts_with(SELL_PREFIX) {
            state.credit(&pair.base_asset, order.amount);
        } else {
            state.credit(&pair.quote_asset, order.amount * order.price + order.commission.amount);
        }
        state.orders[index].status = OrderStatus::Canceled;
        Ok(())
    }

    async fn order_fee(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<Balance> {
        let state = self.state.read().await;
        Ok(Balance::new(pair.quote_asset.clone(), state.fee(amount, price)))
    }

    async fn pair_fee(&self, pair: &Pair) -> Result<Balance> {
        let state = self.state.read().await;
        Ok(Balance::new(pair.quote_asset.clone(), state.fee_rate))
    }
}

//! The "Simple" strategy: buy a fixed quantity, sell it back at a profit
//! target net of fees, with up to `max_trades` round-trips open at once.

pub mod pricing;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::{
    AgentLogger, Balance, Error, Exchange, OrderFilter, OrderStatus, Pair, ParameterValue, Result, Shutdown,
    SimpleTrade, SimpleTradeStore, StrategyParameter, TradeFilter, TradeLeg, TradeStatus,
};

use crate::{CycleOutcome, Strategy};

/// Configuration of one simple-strategy agent, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleConfig {
    pub pair: Pair,
    /// Base-asset quantity bought per trade.
    pub base_quantity: Decimal,
    /// Maximum number of trades open at once.
    pub max_trades: usize,
    /// Profit target as a fraction of the buy cost (0.01 = 1%).
    pub profit_percent: Decimal,
    /// Minimum fractional distance from every open trade's buy price before
    /// another trade is opened.
    pub far_price_percent: Decimal,
}

impl SimpleConfig {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let pair = &self.pair;
        if pair.base_asset.is_empty() || pair.quote_asset.is_empty() {
            return Err(Error::Strategy("pair assets must not be empty".into()));
        }
        if pair.base_asset == pair.quote_asset {
            return Err(Error::Strategy(format!("pair {pair} trades an asset against itself")));
        }
        if self.base_quantity <= Decimal::ZERO {
            return Err(Error::Strategy("base_quantity must be positive".into()));
        }
        if self.max_trades == 0 {
            return Err(Error::Strategy("max_trades must be at least 1".into()));
        }
        if self.profit_percent.is_sign_negative() || self.far_price_percent.is_sign_negative() {
            return Err(Error::Strategy("percentages must not be negative".into()));
        }
        Ok(())
    }
}

pub struct SimpleStrategy {
    config: SimpleConfig,
    store: Arc<dyn SimpleTradeStore>,
}

impl SimpleStrategy {
    pub const NAME: &'static str = "Simple";

    pub fn new(config: SimpleConfig, store: Arc<dyn SimpleTradeStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SimpleConfig {
        &self.config
    }

    /// Promote trades whose buy filled and finish trades whose sell filled,
    /// according to the venue's order history. Updates `trades` in place.
    async fn reconcile(
        &self,
        exchange: &dyn Exchange,
        trades: &mut [SimpleTrade],
        logger: &dyn AgentLogger,
        shutdown: &Shutdown,
    ) -> Result<CycleOutcome> {
        let pending = trades
            .iter()
            .any(|t| t.status == TradeStatus::Buy || t.awaits_sell_fill());
        if !pending {
            return Ok(CycleOutcome::Completed);
        }

        let history = exchange
            .history_orders(std::slice::from_ref(&self.config.pair))
            .await?;

        for order in history.iter().filter(|o| !o.id.is_empty()) {
            if shutdown.is_triggered() {
                logger.info("shutdown requested during reconciliation");
                return Ok(CycleOutcome::Interrupted);
            }

            if let Some(trade) = trades
                .iter_mut()
                .find(|t| t.awaits_sell_fill() && t.sell.order_id == order.id)
            {
                if order.is_filled() {
                    trade.advance(TradeStatus::Finish);
                    trade.sell.timestamp = Some(Utc::now());
                    self.store.save_trade(trade).await?;
                    logger.info(&format!(
                        "finished: trade(id={}), sell order(id={}, price={})",
                        trade.id, trade.sell.order_id, trade.sell.price
                    ));
                } else if order.status == OrderStatus::Canceled {
                    // Cancelled on the venue but still referenced here; free
                    // the leg so the trade is quoted again.
                    logger.warn(&format!(
                        "trade(id={}) sell order(id={}) was cancelled, re-quoting",
                        trade.id, order.id
                    ));
                    trade.sell.order_id.clear();
                    self.store.save_trade(trade).await?;
                } else {
                    logger.warn(&format!(
                        "trade(id={}) sell order(id={}) is {}, expected filled",
                        trade.id, order.id, order.status
                    ));
                }
            }

            if let Some(trade) = trades
                .iter_mut()
                .find(|t| t.status == TradeStatus::Buy && t.buy.order_id == order.id)
            {
                if order.is_filled() {
                    trade.advance(TradeStatus::Sell);
                    self.store.save_trade(trade).await?;
                    logger.info(&format!(
                        "buy filled: trade(id={}), order(id={})",
                        trade.id, order.id
                    ));
                }
            }
        }

        Ok(CycleOutcome::Completed)
    }

    /// Place a market buy when there is room for another trade, enough quote
    /// funds and the price is far enough from every open trade.
    async fn open_position(
        &self,
        exchange: &dyn Exchange,
        trades: &mut Vec<SimpleTrade>,
        quote_funds: Decimal,
        last_price: Decimal,
        logger: &dyn AgentLogger,
        shutdown: &Shutdown,
    ) -> Result<CycleOutcome> {
        let pair = &self.config.pair;
        let open: Vec<&SimpleTrade> = trades.iter().filter(|t| t.is_open()).collect();

        let amount = match pricing::affordable_amount(
            self.config.base_quantity,
            quote_funds,
            last_price,
            move |amount| async move {
                exchange
                    .order_fee(pair, amount, last_price)
                    .await
                    .map(|fee| fee.amount)
            },
        )
        .await
        {
            Ok(amount) => amount,
            Err(e) => {
                logger.warn(&format!("fee lookup failed, skipping buy: {e}"));
                None
            }
        };

        let min_spread = pricing::min_spread(last_price, open.iter().map(|t| t.buy.price));
        let room = open.len() < self.config.max_trades;
        let far_price = pricing::is_far_enough(min_spread, self.config.far_price_percent);

        logger.debug(&format!(
            "need new order: max_trades={} ({}<{}), funds={} ({}), far_price={} ({}>{})",
            room,
            open.len(),
            self.config.max_trades,
            amount.is_some(),
            amount.unwrap_or_default(),
            far_price,
            min_spread.map_or_else(|| "none".to_string(), |s| s.to_string()),
            self.config.far_price_percent,
        ));

        let amount = match amount {
            Some(amount) if room && far_price => amount,
            _ => return Ok(CycleOutcome::Completed),
        };

        if shutdown.is_triggered() {
            logger.info("shutdown requested, skipping buy");
            return Ok(CycleOutcome::Interrupted);
        }

        logger.info(&format!("buy: {amount} {}", pair.base_asset));
        let order = exchange.buy(pair, amount).await?;

        let mut trade = SimpleTrade::opened(&order);
        self.store.save_trade(&mut trade).await?;
        logger.info(&format!(
            "bought: trade(id={}), order(id={}, price={}, status={})",
            trade.id, trade.buy.order_id, trade.buy.price, order.status
        ));

        trades.push(trade);
        Ok(CycleOutcome::Completed)
    }

    /// Place sell orders for held trades and re-quote resting sells whose
    /// target moved up.
    async fn maintain_sells(
        &self,
        exchange: &dyn Exchange,
        trades: &mut [SimpleTrade],
        logger: &dyn AgentLogger,
        shutdown: &Shutdown,
    ) -> Result<CycleOutcome> {
        let pair = &self.config.pair;

        for trade in trades.iter_mut().filter(|t| t.status == TradeStatus::Sell) {
            if !trade.sell.is_placed() && shutdown.is_triggered() {
                logger.info("shutdown requested, skipping remaining sells");
                return Ok(CycleOutcome::Interrupted);
            }

            let price = match self.sell_price(exchange, trade).await {
                Ok(price) => price,
                Err(e) => {
                    logger.warn(&e.to_string());
                    continue;
                }
            };

            if !trade.sell.is_placed() {
                logger.info(&format!(
                    "sell: trade(id={}), amount={}, price={}",
                    trade.id, trade.amount, price
                ));
                let order = match exchange.sell(pair, trade.amount, price).await {
                    Ok(order) => order,
                    Err(e) => {
                        logger.error(&format!("exchange sell error, trade(id={}): {e}", trade.id));
                        continue;
                    }
                };

                trade.sell = TradeLeg::from_order(&order);
                self.store.save_trade(trade).await?;
                logger.info(&format!(
                    "sell placed: trade(id={}), order(id={}, price={})",
                    trade.id, trade.sell.order_id, trade.sell.price
                ));
            } else if price > trade.sell.price {
                logger.info(&format!(
                    "cancel order: trade(id={}), order(id={}, price={}), calc price={}",
                    trade.id, trade.sell.order_id, trade.sell.price, price
                ));
                if let Err(e) = exchange.cancel_order(&trade.sell.order_id, pair).await {
                    logger.warn(&format!(
                        "cancel failed, trade(id={}), order(id={}): {e}",
                        trade.id, trade.sell.order_id
                    ));
                    continue;
                }

                trade.sell.order_id.clear();
                self.store.save_trade(trade).await?;
            }
        }

        Ok(CycleOutcome::Completed)
    }

    async fn sell_price(&self, exchange: &dyn Exchange, trade: &SimpleTrade) -> Result<Decimal> {
        let fee = exchange.pair_fee(&self.config.pair).await.map_err(|e| {
            Error::Exchange(format!("pair fee lookup for trade(id={}) failed: {e}", trade.id))
        })?;
        pricing::target_sell_price(
            trade,
            &self.config.pair,
            self.config.profit_percent,
            fee.amount,
        )
    }
}

fn balance_of(balances: &[Balance], asset: &str) -> Balance {
    balances
        .iter()
        .find(|b| b.asset == asset)
        .cloned()
        .unwrap_or_else(|| Balance::zero(asset))
}

#[async_trait]
impl Strategy for SimpleStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn parameters(&self) -> Vec<StrategyParameter> {
        let config = &self.config;
        vec![
            StrategyParameter::new("Pair", ParameterValue::Pair(config.pair.clone())),
            StrategyParameter::new(
                "BaseQuantity",
                ParameterValue::Balance(Balance::new(
                    config.pair.base_asset.clone(),
                    config.base_quantity,
                )),
            ),
            StrategyParameter::new(
                "MaxTrades",
                ParameterValue::Int(i64::try_from(config.max_trades).unwrap_or(i64::MAX)),
            ),
            StrategyParameter::new("Profit", ParameterValue::Percent(config.profit_percent)),
            StrategyParameter::new(
                "FarPricePercent",
                ParameterValue::Percent(config.far_price_percent),
            ),
        ]
    }

    async fn run(
        &self,
        exchanges: &[Arc<dyn Exchange>],
        logger: &dyn AgentLogger,
        shutdown: &Shutdown,
    ) -> Result<CycleOutcome> {
        let exchange = match exchanges {
            [exchange] => exchange.as_ref(),
            other => {
                return Err(Error::Config(format!(
                    "{} strategy needs exactly one exchange, got {}",
                    Self::NAME,
                    other.len()
                )))
            }
        };
        let pair = &self.config.pair;

        logger.info(&format!("new cycle on {} ({pair})", exchange.name()));

        let balances = exchange
            .balances(&[pair.base_asset.clone(), pair.quote_asset.clone()])
            .await?;
        let base = balance_of(&balances, &pair.base_asset);
        let quote = balance_of(&balances, &pair.quote_asset);
        logger.debug(&format!("{} = {}", base.asset, base.amount));
        logger.debug(&format!("{} = {}", quote.asset, quote.amount));

        match exchange.open_orders(&OrderFilter::for_pair(pair)).await {
            Ok(orders) => logger.info(&format!("open orders: {}", orders.len())),
            Err(e) => logger.warn(&format!("open orders unavailable: {e}")),
        }

        let mut trades = self.store.get_trades(&TradeFilter::open()).await?;

        if self.reconcile(exchange, &mut trades, logger, shutdown).await?
            == CycleOutcome::Interrupted
        {
            return Ok(CycleOutcome::Interrupted);
        }

        let last_price = exchange.last_price(pair).await?;
        if last_price <= Decimal::ZERO {
            return Err(Error::Exchange(format!(
                "non-positive last price {last_price} for {pair}"
            )));
        }
        logger.info(&format!("current price: {last_price}"));

        // A rejected buy must not keep held trades from being quoted.
        let buy_failure = match self
            .open_position(exchange, &mut trades, quote.amount, last_price, logger, shutdown)
            .await
        {
            Ok(CycleOutcome::Interrupted) => return Ok(CycleOutcome::Interrupted),
            Ok(CycleOutcome::Completed) => None,
            Err(e) if e.is_persistence() => return Err(e),
            Err(e) => {
                logger.error(&format!("exchange buy error: {e}"));
                Some(e)
            }
        };

        match (
            self.maintain_sells(exchange, &mut trades, logger, shutdown)
                .await?,
            buy_failure,
        ) {
            (CycleOutcome::Completed, Some(e)) => Err(e),
            (outcome, _) => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> SimpleConfig {
        SimpleConfig {
            pair: Pair::new("BTC", "USDT"),
            base_quantity: dec!(0.01),
            max_trades: 3,
            profit_percent: dec!(0.01),
            far_price_percent: dec!(0.02),
        }
    }

    #[test]
    fn config_survives_json() {
        let cfg = config();
        let decoded = SimpleConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(decoded, cfg);
    }

    #[test]
    fn config_decodes_plain_json() {
        let json = br#"{
            "pair": {"base_asset": "ETH", "quote_asset": "USDT"},
            "base_quantity": "0.5",
            "max_trades": 2,
            "profit_percent": "0.015",
            "far_price_percent": "0.01"
        }"#;
        let cfg = SimpleConfig::from_json(json).unwrap();
        assert_eq!(cfg.pair, Pair::new("ETH", "USDT"));
        assert_eq!(cfg.base_quantity, dec!(0.5));
        assert_eq!(cfg.max_trades, 2);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut zero_quantity = config();
        zero_quantity.base_quantity = Decimal::ZERO;
        assert!(matches!(zero_quantity.validate(), Err(Error::Strategy(_))));

        let mut no_trades = config();
        no_trades.max_trades = 0;
        assert!(matches!(no_trades.validate(), Err(Error::Strategy(_))));

        let mut same_assets = config();
        same_assets.pair = Pair::new("USDT", "USDT");
        assert!(matches!(same_assets.validate(), Err(Error::Strategy(_))));

        let mut negative_profit = config();
        negative_profit.profit_percent = dec!(-0.01);
        assert!(matches!(negative_profit.validate(), Err(Error::Strategy(_))));
    }

    #[test]
    fn garbage_json_is_a_json_error() {
        assert!(matches!(
            SimpleConfig::from_json(b"not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn missing_balance_defaults_to_zero() {
        let balances = vec![Balance::new("USDT", dec!(10))];
        assert_eq!(balance_of(&balances, "BTC"), Balance::zero("BTC"));
        assert_eq!(balance_of(&balances, "USDT").amount, dec!(10));
    }
}

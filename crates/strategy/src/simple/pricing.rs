//! Pure arithmetic behind the simple strategy's buy and sell decisions.

use std::future::Future;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use common::{Error, Pair, Result, SimpleTrade};

/// Smallest base quantity the fund search will try before giving up.
pub const MIN_BUY_AMOUNT: Decimal = dec!(0.0001);

/// Each failed affordability check divides the amount by this.
pub const AMOUNT_STEP: Decimal = Decimal::TEN;

/// Decimal places kept by the spread calculation.
pub const SPREAD_SCALE: u32 = 5;

/// Decimal places of a quoted sell price.
pub const PRICE_SCALE: u32 = 2;

/// Round towards the larger magnitude at `scale` decimal places.
pub fn round_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::AwayFromZero)
}

/// Largest power-of-ten fraction of `base_quantity` whose cost, fee included,
/// fits into `quote_funds`. `None` once the candidate drops below
/// [`MIN_BUY_AMOUNT`].
///
/// `fee` returns the quote-asset fee for buying the given amount at `price`.
pub async fn affordable_amount<F, Fut>(
    base_quantity: Decimal,
    quote_funds: Decimal,
    price: Decimal,
    mut fee: F,
) -> Result<Option<Decimal>>
where
    F: FnMut(Decimal) -> Fut,
    Fut: Future<Output = Result<Decimal>>,
{
    let mut amount = base_quantity;
    while amount >= MIN_BUY_AMOUNT {
        let cost = amount * price + fee(amount).await?;
        if quote_funds >= cost {
            return Ok(Some(amount));
        }
        amount /= AMOUNT_STEP;
    }
    Ok(None)
}

/// Smallest fractional distance between `last_price` and any of the open
/// trades' buy prices, rounded up to [`SPREAD_SCALE`] places. `None` when there
/// are no open trades. `last_price` must be positive.
pub fn min_spread<I>(last_price: Decimal, buy_prices: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    buy_prices
        .into_iter()
        .map(|buy_price| ((last_price - buy_price) / last_price).abs())
        .min()
        .map(|spread| round_up(spread, SPREAD_SCALE))
}

/// Whether the price moved far enough from every open trade to open another.
pub fn is_far_enough(min_spread: Option<Decimal>, far_price_percent: Decimal) -> bool {
    min_spread.map_or(true, |spread| spread > far_price_percent)
}

/// Sell price that recovers the buy cost and its commission plus
/// `profit_percent` of the cost, after the venue keeps `fee_fraction` of the
/// proceeds. Rounded up to [`PRICE_SCALE`] places.
pub fn target_sell_price(
    trade: &SimpleTrade,
    pair: &Pair,
    profit_percent: Decimal,
    fee_fraction: Decimal,
) -> Result<Decimal> {
    let paid_quote = trade.buy.price * trade.amount;

    let commission = &trade.buy.commission;
    let paid_fee_quote = if commission.asset == pair.quote_asset {
        commission.amount
    } else if commission.asset == pair.base_asset {
        commission.amount * trade.buy.price
    } else {
        return Err(Error::Commission {
            trade_id: trade.id,
            asset: commission.asset.clone(),
        });
    };

    let buy_paid = paid_quote + paid_fee_quote;
    let profit = profit_percent * paid_quote;

    let net_amount = trade.amount * (Decimal::ONE - fee_fraction);
    if net_amount <= Decimal::ZERO {
        return Err(Error::Quote {
            trade_id: trade.id,
            reason: format!("amount {} after fee {} leaves nothing to sell", trade.amount, fee_fraction),
        });
    }

    (buy_paid + profit)
        .checked_div(net_amount)
        .map(|price| round_up(price, PRICE_SCALE))
        .ok_or_else(|| Error::Quote {
            trade_id: trade.id,
            reason: "sell price overflow".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Balance, TradeLeg, TradeStatus};

    fn trade(price: Decimal, amount: Decimal, commission: Balance) -> SimpleTrade {
        SimpleTrade {
            id: 7,
            status: TradeStatus::Sell,
            amount,
            buy: TradeLeg {
                order_id: "b-1".into(),
                timestamp: None,
                price,
                commission,
            },
            sell: TradeLeg::default(),
        }
    }

    fn btc_usdt() -> Pair {
        Pair::new("BTC", "USDT")
    }

    #[test]
    fn round_up_goes_away_from_zero() {
        assert_eq!(round_up(dec!(1.001), 2), dec!(1.01));
        assert_eq!(round_up(dec!(1.000001), 5), dec!(1.00001));
        assert_eq!(round_up(dec!(1.10), 2), dec!(1.10));
    }

    #[tokio::test]
    async fn full_quantity_when_affordable() {
        let amount = affordable_amount(dec!(0.01), dec!(1000), dec!(20000), |_| async {
            Ok(Decimal::ZERO)
        })
        .await
        .unwrap();
        assert_eq!(amount, Some(dec!(0.01)));
    }

    #[tokio::test]
    async fn steps_down_by_powers_of_ten() {
        // 0.01 BTC costs 200, 0.001 costs 20 + 0.02 fee.
        let amount = affordable_amount(dec!(0.01), dec!(25), dec!(20000), |a| async move {
            Ok(a * dec!(20000) * dec!(0.001))
        })
        .await
        .unwrap();
        assert_eq!(amount, Some(dec!(0.001)));
    }

    #[tokio::test]
    async fn fee_tips_the_balance() {
        // 0.001 costs exactly 20 without fee; any fee makes it unaffordable.
        let amount = affordable_amount(dec!(0.001), dec!(20), dec!(20000), |_| async {
            Ok(dec!(0.01))
        })
        .await
        .unwrap();
        assert_eq!(amount, Some(dec!(0.0001)));
    }

    #[tokio::test]
    async fn unavailable_below_floor() {
        let amount = affordable_amount(dec!(0.01), dec!(1), dec!(20000), |_| async {
            Ok(Decimal::ZERO)
        })
        .await
        .unwrap();
        assert_eq!(amount, None);
    }

    #[tokio::test]
    async fn fee_lookup_error_propagates() {
        let result = affordable_amount(dec!(0.01), dec!(1000), dec!(100), |_| async {
            Err(Error::Exchange("fee endpoint down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Exchange(_))));
    }

    #[test]
    fn no_open_trades_means_no_spread_bound() {
        let spread = min_spread(dec!(100), Vec::new());
        assert_eq!(spread, None);
        assert!(is_far_enough(spread, dec!(0.5)));
    }

    #[test]
    fn spread_uses_closest_trade_and_rounds_up() {
        let spread = min_spread(dec!(300), vec![dec!(200), dec!(299), dec!(330)]);
        // |300 - 299| / 300 = 0.003333.. -> 0.00334
        assert_eq!(spread, Some(dec!(0.00334)));
        assert!(is_far_enough(spread, dec!(0.003)));
        assert!(!is_far_enough(spread, dec!(0.00334)));
    }

    #[test]
    fn sell_price_with_quote_commission() {
        // paid 200 + 0.2 fee, profit 1% of 200 = 2, fee 0.1%:
        // 202.2 / (0.01 * 0.999) = 20240.24..
        let t = trade(dec!(20000), dec!(0.01), Balance::new("USDT", dec!(0.2)));
        let price = target_sell_price(&t, &btc_usdt(), dec!(0.01), dec!(0.001)).unwrap();
        assert_eq!(price, dec!(20240.25));
    }

    #[test]
    fn sell_price_with_base_commission() {
        // commission 0.00001 BTC = 0.2 USDT at buy price: same as above.
        let t = trade(dec!(20000), dec!(0.01), Balance::new("BTC", dec!(0.00001)));
        let price = target_sell_price(&t, &btc_usdt(), dec!(0.01), dec!(0.001)).unwrap();
        assert_eq!(price, dec!(20240.25));
    }

    #[test]
    fn foreign_commission_asset_is_rejected() {
        let t = trade(dec!(20000), dec!(0.01), Balance::new("BNB", dec!(0.001)));
        let err = target_sell_price(&t, &btc_usdt(), dec!(0.01), dec!(0.001)).unwrap_err();
        assert!(matches!(err, Error::Commission { trade_id: 7, .. }));
    }

    #[test]
    fn full_fee_cannot_be_quoted() {
        let t = trade(dec!(20000), dec!(0.01), Balance::new("USDT", Decimal::ZERO));
        let err = target_sell_price(&t, &btc_usdt(), dec!(0.01), Decimal::ONE).unwrap_err();
        assert!(matches!(err, Error::Quote { .. }));
    }
}

use proptest::prelude::*;
use rust_decimal::Decimal;

use common::{Balance, Pair, SimpleTrade, TradeLeg, TradeStatus};
use strategy::simple::pricing::{self, MIN_BUY_AMOUNT};

fn decimal(units: u64, scale: u32) -> Decimal {
    Decimal::new(units as i64, scale)
}

fn held(price: Decimal, amount: Decimal, fee: Decimal) -> SimpleTrade {
    SimpleTrade {
        id: 1,
        status: TradeStatus::Sell,
        amount,
        buy: TradeLeg {
            order_id: "b".into(),
            timestamp: None,
            price,
            commission: Balance::new("USDT", fee),
        },
        sell: TradeLeg::default(),
    }
}

proptest! {
    /// The fund search never buys more than configured, and only gives up
    /// when even the smallest amount is unaffordable.
    #[test]
    fn affordable_amount_respects_funds(
        base in 1u64..1_000_000,
        funds in 0u64..100_000_000,
        price in 1u64..10_000_000,
        fee_bps in 0u64..100,
    ) {
        let base_quantity = decimal(base, 4);
        let quote_funds = decimal(funds, 2);
        let price = decimal(price, 2);
        let fee_rate = decimal(fee_bps, 4);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let amount = rt.block_on(pricing::affordable_amount(
            base_quantity,
            quote_funds,
            price,
            |amount| async move { Ok::<_, common::Error>(amount * price * fee_rate) },
        )).unwrap();

        let cost = |amount: Decimal| amount * price * (Decimal::ONE + fee_rate);
        match amount {
            Some(amount) => {
                prop_assert!(amount <= base_quantity);
                prop_assert!(amount >= MIN_BUY_AMOUNT);
                prop_assert!(cost(amount) <= quote_funds);
            }
            None => {
                let mut smallest = base_quantity;
                while smallest / pricing::AMOUNT_STEP >= MIN_BUY_AMOUNT {
                    smallest /= pricing::AMOUNT_STEP;
                }
                prop_assert!(smallest < MIN_BUY_AMOUNT || cost(smallest) > quote_funds);
            }
        }
    }

    /// A quoted sell always covers the buy price, and asking for more profit
    /// never lowers it.
    #[test]
    fn sell_price_is_monotone_in_profit(
        price in 1u64..10_000_000,
        amount in 1u64..1_000_000,
        fee_bps in 0u64..100,
        low_bps in 0u64..500,
        extra_bps in 0u64..500,
    ) {
        let pair = Pair::new("BTC", "USDT");
        let price = decimal(price, 2);
        let amount = decimal(amount, 4);
        let fee_rate = decimal(fee_bps, 4);
        let trade = held(price, amount, amount * price * fee_rate);

        let low = decimal(low_bps, 4);
        let high = low + decimal(extra_bps, 4);
        let low_price = pricing::target_sell_price(&trade, &pair, low, fee_rate).unwrap();
        let high_price = pricing::target_sell_price(&trade, &pair, high, fee_rate).unwrap();

        prop_assert!(low_price >= price);
        prop_assert!(high_price >= low_price);
        prop_assert_eq!(low_price, low_price.round_dp(pricing::PRICE_SCALE));
    }

    /// Any positive profit target quotes strictly above the buy price.
    #[test]
    fn positive_profit_sells_above_the_buy_price(
        price in 1u64..10_000_000,
        amount in 1u64..1_000_000,
        fee_bps in 0u64..100,
        profit_bps in 1u64..500,
    ) {
        let pair = Pair::new("BTC", "USDT");
        let price = decimal(price, 2);
        let amount = decimal(amount, 4);
        let fee_rate = decimal(fee_bps, 4);
        let trade = held(price, amount, amount * price * fee_rate);

        let sell = pricing::target_sell_price(&trade, &pair, decimal(profit_bps, 4), fee_rate).unwrap();

        prop_assert!(sell > price);
    }

    /// The spread comes from the closest buy price and is zero only on it.
    #[test]
    fn min_spread_picks_the_closest_trade(
        last in 1u64..10_000_000,
        offsets in proptest::collection::vec(0u64..1_000_000, 1..8),
    ) {
        let last = decimal(last, 2);
        let prices: Vec<Decimal> = offsets.iter().map(|o| last + decimal(*o, 2)).collect();

        let spread = pricing::min_spread(last, prices.iter().copied()).unwrap();
        let closest = prices.iter().min().copied().unwrap();

        prop_assert_eq!(spread, pricing::round_up(((last - closest) / last).abs(), pricing::SPREAD_SCALE));
        prop_assert_eq!(spread.is_zero(), closest == last);
    }
}

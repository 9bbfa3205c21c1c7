use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use common::{
    Exchange, ExchangeKind, ExchangeRecord, ExchangeRecordRepo, ExchangeRepo, Result, TradingMode,
};
use paper::PaperExchange;

use crate::BinanceClient;

/// Starting funds and fee of each simulated account in paper mode.
#[derive(Debug, Clone)]
pub struct PaperSettings {
    pub quote_asset: String,
    pub quote_balance: Decimal,
    pub fee_rate: Decimal,
}

/// Turns stored exchange accounts into exchange connections.
///
/// Live mode talks to the venue with the stored credentials. Paper mode
/// gives every account its own simulated venue, priced from the real one.
pub struct ExchangeResolver {
    records: Arc<dyn ExchangeRecordRepo>,
    mode: TradingMode,
    paper: PaperSettings,
}

impl ExchangeResolver {
    pub fn new(records: Arc<dyn ExchangeRecordRepo>, mode: TradingMode, paper: PaperSettings) -> Self {
        Self {
            records,
            mode,
            paper,
        }
    }

    async fn connect(&self, record: &ExchangeRecord) -> Result<Arc<dyn Exchange>> {
        match (record.kind, self.mode) {
            (ExchangeKind::Binance, TradingMode::Live) => {
                info!(exchange_id = record.id, "Using BinanceClient");
                Ok(Arc::new(BinanceClient::from_json(&record.data)?))
            }
            (ExchangeKind::Binance, TradingMode::Paper) => {
                info!(
                    exchange_id = record.id,
                    balance = %self.paper.quote_balance,
                    asset = %self.paper.quote_asset,
                    "Using PaperExchange priced from Binance"
                );
                // Ticker prices are public; no credentials needed.
                let feed = Arc::new(BinanceClient::new("", "")?);
                let exchange = PaperExchange::new(self.paper.fee_rate).with_price_feed(feed);
                exchange
                    .deposit(&self.paper.quote_asset, self.paper.quote_balance)
                    .await;
                Ok(Arc::new(exchange))
            }
        }
    }
}

#[async_trait]
impl ExchangeRepo for ExchangeResolver {
    async fn agent_exchanges(&self, agent_id: i64) -> Result<Vec<Arc<dyn Exchange>>> {
        let records = self.records.agent_exchange_records(agent_id).await?;
        let mut exchanges = Vec::with_capacity(records.len());
        for record in &records {
            exchanges.push(self.connect(record).await?);
        }
        Ok(exchanges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use rust_decimal_macros::dec;

    struct Records(Vec<ExchangeRecord>);

    #[async_trait]
    impl ExchangeRecordRepo for Records {
        async fn agent_exchange_records(&self, _agent_id: i64) -> Result<Vec<ExchangeRecord>> {
            Ok(self.0.clone())
        }
    }

    fn resolver(mode: TradingMode, data: &[u8]) -> ExchangeResolver {
        ExchangeResolver::new(
            Arc::new(Records(vec![ExchangeRecord {
                id: 1,
                kind: ExchangeKind::Binance,
                data: data.to_vec(),
            }])),
            mode,
            PaperSettings {
                quote_asset: "USDT".into(),
                quote_balance: dec!(500),
                fee_rate: dec!(0.001),
            },
        )
    }

    #[tokio::test]
    async fn live_mode_builds_binance_clients() {
        let exchanges = resolver(TradingMode::Live, br#"{"api_key":"k","secret":"s"}"#)
            .agent_exchanges(1)
            .await
            .unwrap();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].name(), "binance");
    }

    #[tokio::test]
    async fn live_mode_rejects_bad_credentials() {
        let err = resolver(TradingMode::Live, b"not json")
            .agent_exchanges(1)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn paper_mode_starts_funded() {
        let exchanges = resolver(TradingMode::Paper, b"")
            .agent_exchanges(1)
            .await
            .unwrap();
        assert_eq!(exchanges[0].name(), "paper");
        let balances = exchanges[0].balances(&["USDT".into()]).await.unwrap();
        assert_eq!(balances[0].amount, dec!(500));
    }
}

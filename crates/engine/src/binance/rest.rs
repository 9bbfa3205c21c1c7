use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::{Balance, Error, Exchange, Order, OrderFilter, OrderStatus, Pair, Result};

const BASE_URL: &str = "https://api.binance.com";

/// Quote assets tried, in order, when splitting a bare symbol like `ETHBTC`.
const KNOWN_QUOTES: [&str; 8] = ["USDT", "USDC", "BUSD", "FDUSD", "TUSD", "BTC", "ETH", "BNB"];

/// API credentials stored with an exchange account.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
}

/// REST API client for Binance spot trading.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: BASE_URL.to_string(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?,
        })
    }

    /// Client for the credentials JSON stored with an exchange account.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let creds: Credentials = serde_json::from_slice(data)?;
        Self::new(creds.api_key, creds.secret)
    }

    /// Point the client at another host, e.g. the spot testnet.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sign(&self, query: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Exchange(format!("invalid API secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Signed request. GET and DELETE carry the parameters in the URL, POST
    /// sends them form-encoded.
    async fn signed<T: DeserializeOwned>(&self, method: Method, path: &str, params: &str) -> Result<T> {
        let ts = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signed = format!("{query}&signature={}", self.sign(&query)?);

        let request = if method == Method::POST {
            self.http
                .post(format!("{}{path}", self.base_url))
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(signed)
        } else {
            self.http
                .request(method, format!("{}{path}?{signed}", self.base_url))
        };

        let resp = request
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, params: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{path}?{params}", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|e| Error::Exchange(format!("unexpected response: {e}")))
    }

    async fn trade_fee(&self, pair: &Pair) -> Result<TradeFee> {
        let fees: Vec<TradeFee> = self
            .signed(
                Method::GET,
                "/sapi/v1/asset/tradeFee",
                &format!("symbol={}", pair.symbol()),
            )
            .await?;
        fees.into_iter()
            .find(|f| f.symbol == pair.symbol())
            .ok_or_else(|| Error::Exchange(format!("no trade fee reported for {pair}")))
    }

    async fn list_orders(&self, path: &str, pair: Option<&Pair>) -> Result<Vec<Order>> {
        let params = pair.map(|p| format!("symbol={}", p.symbol())).unwrap_or_default();
        let orders: Vec<OrderResponse> = self.signed(Method::GET, path, &params).await?;
        orders
            .into_iter()
            .map(|o| {
                let pair = match pair {
                    Some(pair) => pair.clone(),
                    None => split_symbol(&o.symbol)?,
                };
                Ok(o.into_order(pair))
            })
            .collect()
    }
}

fn split_symbol(symbol: &str) -> Result<Pair> {
    KNOWN_QUOTES
        .iter()
        .find_map(|quote| {
            symbol
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| Pair::new(base, *quote))
        })
        .ok_or_else(|| Error::Exchange(format!("cannot split symbol '{symbol}' into assets")))
}

fn order_status(status: &str) -> OrderStatus {
    match status {
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "EXPIRED" | "EXPIRED_IN_MATCH" | "REJECTED" => OrderStatus::Canceled,
        _ => OrderStatus::Pending,
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn balances(&self, assets: &[String]) -> Result<Vec<Balance>> {
        let account: AccountResponse = self.signed(Method::GET, "/api/v3/account", "").await?;
        Ok(account
            .balances
            .into_iter()
            .filter(|b| assets.is_empty() || assets.contains(&b.asset))
            .map(|b| Balance::new(b.asset, b.free))
            .collect())
    }

    async fn open_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        if filter.pairs.is_empty() {
            orders = self.list_orders("/api/v3/openOrders", None).await?;
        } else {
            for pair in &filter.pairs {
                orders.extend(self.list_orders("/api/v3/openOrders", Some(pair)).await?);
            }
        }
        Ok(orders.into_iter().filter(|o| filter.matches(o)).collect())
    }

    async fn history_orders(&self, pairs: &[Pair]) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        for pair in pairs {
            orders.extend(self.list_orders("/api/v3/allOrders", Some(pair)).await?);
        }
        Ok(orders)
    }

    async fn last_price(&self, pair: &Pair) -> Result<Decimal> {
        let ticker: PriceTicker = self
            .public_get("/api/v3/ticker/price", &format!("symbol={}", pair.symbol()))
            .await?;
        Ok(ticker.price)
    }

    async fn buy(&self, pair: &Pair, amount: Decimal) -> Result<Order> {
        let params = format!(
            "symbol={}&side=BUY&type=MARKET&quantity={}&newOrderRespType=FULL",
            pair.symbol(),
            amount.normalize()
        );
        debug!(pair = %pair, %amount, "Submitting market buy to Binance");
        let resp: OrderResponse = self.signed(Method::POST, "/api/v3/order", &params).await?;
        Ok(resp.into_order(pair.clone()))
    }

    async fn sell(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<Order> {
        let params = format!(
            "symbol={}&side=SELL&type=LIMIT&timeInForce=GTC&quantity={}&price={}&newOrderRespType=FULL",
            pair.symbol(),
            amount.normalize(),
            price.normalize()
        );
        debug!(pair = %pair, %amount, %price, "Submitting limit sell to Binance");
        let resp: OrderResponse = self.signed(Method::POST, "/api/v3/order", &params).await?;
        Ok(resp.into_order(pair.clone()))
    }

    async fn cancel_order(&self, id: &str, pair: &Pair) -> Result<()> {
        let params = format!("symbol={}&orderId={id}", pair.symbol());
        debug!(pair = %pair, order_id = %id, "Cancelling Binance order");
        let _: OrderResponse = self.signed(Method::DELETE, "/api/v3/order", &params).await?;
        Ok(())
    }

    async fn order_fee(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<Balance> {
        let fee = self.trade_fee(pair).await?;
        Ok(Balance::new(
            pair.quote_asset.clone(),
            amount * price * fee.taker_commission,
        ))
    }

    async fn pair_fee(&self, pair: &Pair) -> Result<Balance> {
        let fee = self.trade_fee(pair).await?;
        Ok(Balance::new(pair.quote_asset.clone(), fee.maker_commission))
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    order_id: u64,
    #[serde(default)]
    price: Decimal,
    #[serde(default)]
    orig_qty: Decimal,
    #[serde(default)]
    executed_qty: Decimal,
    #[serde(default, rename = "cummulativeQuoteQty")]
    cumulative_quote_qty: Decimal,
    status: String,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

impl OrderResponse {
    /// Market orders report a zero price; their average fill price is
    /// derived from the executed quantities instead.
    fn into_order(self, pair: Pair) -> Order {
        let price = if self.price.is_zero() && !self.executed_qty.is_zero() {
            self.cumulative_quote_qty / self.executed_qty
        } else {
            self.price
        };
        let amount = if self.executed_qty.is_zero() {
            self.orig_qty
        } else {
            self.executed_qty
        };
        let commission = match self.fills.first() {
            Some(first) => Balance::new(
                first.commission_asset.clone(),
                self.fills.iter().map(|f| f.commission).sum(),
            ),
            None => Balance::zero(pair.quote_asset.clone()),
        };

        Order {
            id: self.order_id.to_string(),
            status: order_status(&self.status),
            price,
            amount,
            pair,
            commission,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillDetail {
    commission: Decimal,
    commission_asset: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<AccountBalance>,
}

#[derive(Deserialize)]
struct AccountBalance {
    asset: String,
    free: Decimal,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeFee {
    symbol: String,
    maker_commission: Decimal,
    taker_commission: Decimal,
}

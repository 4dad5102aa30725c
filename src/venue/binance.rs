use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{MarketData, Venue};
use crate::error::VenueError;
use crate::models::{Balance, Candle, Fill, OrderSide, Symbol, SymbolFilters};

// Binance spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
pub const BINANCE_TESTNET_URL: &str = "https://testnet.binance.vision";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const HTTP_TIMEOUT_SECS: u64 = 10;
/// Binance error code for an unknown trading pair
const INVALID_SYMBOL_CODE: i64 = -1121;
const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const RECV_WINDOW_MS: u64 = 5000;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API key pair for the signed account and order endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Rate-limited Binance client.
///
/// Market data needs no key. Balances and orders go through the signed
/// endpoints and fail with `MissingCredentials` until `with_credentials`.
/// Cloneable; all clones share the rate limiter and the exchange-info cache.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    filters_cache: Arc<RwLock<HashMap<Symbol, SymbolFilters>>>,
    initial_backoff: Duration,
    credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<FilterInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterInfo {
    filter_type: String,
    #[serde(default)]
    step_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    transact_time: i64,
    executed_qty: String,
    cummulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<OrderFill>,
}

#[derive(Debug, Deserialize)]
struct OrderFill {
    commission: String,
}

impl BinanceClient {
    /// Create a client against `base_url` allowing `requests_per_minute`
    pub fn new(base_url: impl Into<String>, requests_per_minute: u32) -> Result<Self, VenueError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            filters_cache: Arc::new(RwLock::new(HashMap::new())),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            credentials: None,
        })
    }

    /// Enable the signed account and order endpoints
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Override the first retry delay (doubles on every attempt)
    pub fn with_retry_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Rate-limited GET with retries on 429, 5xx and network errors
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, VenueError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = VenueError::Network("no attempt made".to_string());

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let error = Self::api_error(status, response, query).await;
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        // Other 4xx - don't retry
                        return Err(error);
                    }
                    last_error = error;
                }
                Err(e) => {
                    last_error = VenueError::from(e);
                }
            }

            if attempt < MAX_RETRIES {
                let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                tracing::warn!(
                    "Binance request {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    path,
                    attempt,
                    MAX_RETRIES,
                    last_error,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error)
    }

    /// Signed request (HMAC-SHA256 over the query string).
    ///
    /// Sent once: a retried order could execute twice. Parameter values must
    /// be URL-safe as given, since the signature covers the raw query.
    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, VenueError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(VenueError::MissingCredentials)?;

        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        query.push(format!("recvWindow={}", RECV_WINDOW_MS));
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        let query = query.join("&");
        let signature = sign(&credentials.api_secret, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Self::api_error(status, response, params).await)
        }
    }

    async fn market_order(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<Fill, VenueError> {
        let side_param = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order: OrderResponse = self
            .signed(
                Method::POST,
                "/api/v3/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side_param.to_string()),
                    ("type", "MARKET".to_string()),
                    ("quantity", quantity.normalize().to_string()),
                    ("newOrderRespType", "FULL".to_string()),
                ],
            )
            .await?
            .json()
            .await?;

        let fill = order_fill(symbol, side, order)?;
        tracing::info!(
            symbol = %symbol,
            order_id = %fill.order_id,
            quantity = %fill.quantity,
            price = %fill.price,
            "Binance {} filled",
            side_param
        );
        Ok(fill)
    }

    async fn api_error(
        status: StatusCode,
        response: reqwest::Response,
        query: &[(&str, String)],
    ) -> VenueError {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) if body.code == INVALID_SYMBOL_CODE => {
                let symbol = query
                    .iter()
                    .find(|(k, _)| *k == "symbol")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                VenueError::UnknownSymbol(symbol)
            }
            Ok(body) => VenueError::Api {
                status: status.as_u16(),
                message: format!("{} ({})", body.msg, body.code),
            },
            Err(_) => VenueError::Api {
                status: status.as_u16(),
                message: text,
            },
        }
    }

    async fn fetch_filters(&self, symbol: &Symbol) -> Result<SymbolFilters, VenueError> {
        let info: ExchangeInfo = self
            .get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await?
            .json()
            .await?;

        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol.as_str())
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))?;

        let step = entry
            .filters
            .into_iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .and_then(|f| f.step_size)
            .ok_or_else(|| VenueError::Parse(format!("no LOT_SIZE filter for {}", symbol)))?;

        Ok(SymbolFilters {
            step_size: parse_decimal(&step)?,
        })
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError> {
        let ticker: TickerPrice = self
            .get("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?
            .json()
            .await?;

        parse_decimal(&ticker.price)
    }

    async fn get_symbol_filters(&self, symbol: &Symbol) -> Result<SymbolFilters, VenueError> {
        if let Some(filters) = self.filters_cache.read().await.get(symbol) {
            return Ok(*filters);
        }

        let filters = self.fetch_filters(symbol).await?;
        tracing::debug!(symbol = %symbol, step_size = %filters.step_size, "Cached LOT_SIZE filter");
        self.filters_cache
            .write()
            .await
            .insert(symbol.clone(), filters);

        Ok(filters)
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?
            .json()
            .await?;

        rows.iter().map(|row| parse_kline(symbol, row)).collect()
    }
}

#[async_trait]
impl Venue for BinanceClient {
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError> {
        MarketData::get_price(self, symbol).await
    }

    async fn market_buy(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        self.market_order(symbol, OrderSide::Buy, quantity).await
    }

    async fn market_sell(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        self.market_order(symbol, OrderSide::Sell, quantity).await
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance, VenueError> {
        let account: AccountInfo = self
            .signed(Method::GET, "/api/v3/account", &[])
            .await?
            .json()
            .await?;

        // Assets never held are not listed
        match account.balances.into_iter().find(|b| b.asset == asset) {
            Some(balance) => Ok(Balance {
                free: parse_decimal(&balance.free)?,
                locked: parse_decimal(&balance.locked)?,
            }),
            None => Ok(Balance::default()),
        }
    }

    async fn get_symbol_filters(&self, symbol: &Symbol) -> Result<SymbolFilters, VenueError> {
        MarketData::get_symbol_filters(self, symbol).await
    }

    fn name(&self) -> &str {
        "binance"
    }
}

/// Hex HMAC-SHA256 of `payload` keyed by the API secret
fn sign(secret: &str, payload: &str) -> Result<String, VenueError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VenueError::Parse(format!("unusable API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Average fill price is quote spent over base executed
fn order_fill(symbol: &Symbol, side: OrderSide, order: OrderResponse) -> Result<Fill, VenueError> {
    let quantity = parse_decimal(&order.executed_qty)?;
    if quantity.is_zero() {
        return Err(VenueError::OrderRejected(format!(
            "order {} for {} executed nothing (status {})",
            order.order_id, symbol, order.status
        )));
    }
    let quote = parse_decimal(&order.cummulative_quote_qty)?;

    let mut fee = Decimal::ZERO;
    for fill in &order.fills {
        fee += parse_decimal(&fill.commission)?;
    }

    let timestamp = DateTime::<Utc>::from_timestamp_millis(order.transact_time)
        .ok_or_else(|| VenueError::Parse(format!("transactTime {}", order.transact_time)))?;

    Ok(Fill {
        order_id: order.order_id.to_string(),
        symbol: symbol.clone(),
        side,
        price: quote / quantity,
        quantity,
        fee,
        timestamp,
    })
}

fn parse_decimal(value: &str) -> Result<Decimal, VenueError> {
    value
        .parse::<Decimal>()
        .map_err(|e| VenueError::Parse(format!("{}: {}", value, e)))
}

/// `[open_time, open, high, low, close, volume, close_time, ...]`
fn parse_kline(symbol: &Symbol, row: &[serde_json::Value]) -> Result<Candle, VenueError> {
    let field = |i: usize| -> Result<f64, VenueError> {
        row.get(i)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| VenueError::Parse(format!("kline field {} of {}", i, symbol)))
    };

    let open_time = row
        .first()
        .and_then(|v| v.as_i64())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| VenueError::Parse(format!("kline open time of {}", symbol)))?;

    Ok(Candle {
        symbol: symbol.clone(),
        timestamp: open_time,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

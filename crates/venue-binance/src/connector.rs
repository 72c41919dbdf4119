use crate::sign::sign_query;
use crate::types::{AccountResponse, ApiError, OrderResponse, TickerPrice};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use sentinel_core::{BinanceConfig, OrderTicket, Side, VenueConnector, VenueError, VenueFill};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const API_KEY_ENV: &str = "BINANCE_API_KEY";
const API_SECRET_ENV: &str = "BINANCE_API_SECRET";

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API credentials, loaded from the environment and never from config
/// files.
pub struct BinanceCredentials {
    api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for BinanceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

impl BinanceCredentials {
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Reads `BINANCE_API_KEY` and `BINANCE_API_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Auth`] when either variable is unset.
    pub fn from_env() -> Result<Self, VenueError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| VenueError::auth(format!("{API_KEY_ENV} not set")))?;
        let api_secret = std::env::var(API_SECRET_ENV)
            .map_err(|_| VenueError::auth(format!("{API_SECRET_ENV} not set")))?;
        Ok(Self::new(api_key, api_secret))
    }
}

/// Binance spot venue. Market orders are placed by quote notional, so
/// sizing never needs the venue's lot-size table.
pub struct BinanceConnector {
    http: Client,
    base_url: String,
    recv_window_ms: u64,
    credentials: BinanceCredentials,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl std::fmt::Debug for BinanceConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConnector")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceConnector {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &BinanceConfig, credentials: BinanceCredentials) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VenueError::unavailable(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
            credentials,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(nonzero!(600u32)))),
        })
    }

    /// Builds a connector with credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Auth`] when credentials are missing.
    pub fn from_env(config: &BinanceConfig) -> Result<Self, VenueError> {
        Self::new(config, BinanceCredentials::from_env()?)
    }

    fn signed_query(&self, params: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let query = format!(
            "{params}&recvWindow={}&timestamp={timestamp}",
            self.recv_window_ms
        );
        let signature = sign_query(&self.credentials.api_secret, &query);
        format!("{query}&signature={signature}")
    }

    /// Submits a signed market order and normalizes the fill.
    async fn submit_order(
        &self,
        params: &str,
        notional_hint: Decimal,
    ) -> Result<VenueFill, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(params));
        tracing::debug!(params, "binance order");

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_order_error(status, &body, notional_hint, MIN_NOTIONAL_USDT.into()));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Serialization(e.to_string()))?;

        let price = order.avg_fill_price().ok_or_else(|| {
            VenueError::rejected(format!("order not filled: status {}", order.status))
        })?;

        Ok(VenueFill {
            order_id: order.order_id.to_string(),
            price,
            quantity: order.executed_qty,
        })
    }

    async fn get_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &str,
    ) -> Result<T, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params));
        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        parse_response(response).await
    }
}

/// Spot minimum notional for USDT pairs.
const MIN_NOTIONAL_USDT: u32 = 10;

#[async_trait]
impl VenueConnector for BinanceConnector {
    fn venue_id(&self) -> &str {
        "binance"
    }

    fn quote_asset(&self) -> &str {
        "USDT"
    }

    fn min_notional(&self) -> Decimal {
        Decimal::from(MIN_NOTIONAL_USDT)
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<VenueFill, VenueError> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quoteOrderQty={}",
            ticket.symbol,
            ticket.side.as_str(),
            ticket.notional.normalize()
        );
        self.submit_order(&params, ticket.notional).await
    }

    async fn close_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<VenueFill, VenueError> {
        let params = format!(
            "symbol={symbol}&side={}&type=MARKET&quantity={}",
            side.as_str(),
            quantity.round_dp(8).normalize()
        );
        self.submit_order(&params, Decimal::ZERO).await
    }

    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, VenueError> {
        let account: AccountResponse = self.get_signed("/api/v3/account", "").await?;
        Ok(account
            .balances
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or_default())
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/ticker/price?symbol={symbol}", self.base_url);
        let response = self.http.get(&url).send().await.map_err(map_transport_error)?;
        let ticker: TickerPrice = parse_response(response).await?;
        Ok(ticker.price)
    }
}

fn map_transport_error(e: reqwest::Error) -> VenueError {
    if e.is_timeout() || e.is_connect() {
        VenueError::unavailable(format!("binance unreachable: {e}"))
    } else {
        VenueError::unavailable(e.to_string())
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, VenueError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| VenueError::Serialization(e.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_api_error(status, &body))
}

fn map_api_error(status: StatusCode, body: &str) -> VenueError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return VenueError::auth(format!("binance {status}: {body}"));
    }
    // 429 = rate limited, 418 = temporary IP ban after repeated 429s.
    if status.as_u16() == 429 || status.as_u16() == 418 {
        return VenueError::unavailable(format!("binance rate limited ({status})"));
    }
    if status.is_server_error() {
        return VenueError::unavailable(format!("binance {status}"));
    }
    if let Ok(api) = serde_json::from_str::<ApiError>(body) {
        return match api.code {
            -1022 => VenueError::auth(api.msg),
            -1021 => VenueError::unavailable(api.msg),
            _ => VenueError::rejected(format!("code {}: {}", api.code, api.msg)),
        };
    }
    VenueError::rejected(format!("binance {status}: {body}"))
}

fn map_order_error(
    status: StatusCode,
    body: &str,
    notional: Decimal,
    minimum: Decimal,
) -> VenueError {
    if let Ok(api) = serde_json::from_str::<ApiError>(body) {
        // -1013 covers filter failures, notably MIN_NOTIONAL.
        if api.code == -1013 {
            return VenueError::below_minimum_notional(notional, minimum);
        }
    }
    map_api_error(status, body)
}

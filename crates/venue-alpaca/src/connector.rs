use crate::types::{AccountResponse, ApiError, LatestTradeResponse, OrderRequest, OrderResponse};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use sentinel_core::{AlpacaConfig, OrderTicket, Side, VenueConnector, VenueError, VenueFill};
use std::sync::Arc;
use std::time::Duration;

const KEY_ID_ENV: &str = "ALPACA_API_KEY_ID";
const SECRET_KEY_ENV: &str = "ALPACA_API_SECRET_KEY";

/// How many times to poll for a fill after the order is acknowledged.
const FILL_POLL_ATTEMPTS: u32 = 5;
const FILL_POLL_DELAY_MS: u64 = 200;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API credentials, loaded from the environment and never from config
/// files.
pub struct AlpacaCredentials {
    key_id: String,
    secret_key: String,
}

impl std::fmt::Debug for AlpacaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaCredentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl AlpacaCredentials {
    #[must_use]
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Reads `ALPACA_API_KEY_ID` and `ALPACA_API_SECRET_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Auth`] when either variable is unset.
    pub fn from_env() -> Result<Self, VenueError> {
        let key_id = std::env::var(KEY_ID_ENV)
            .map_err(|_| VenueError::auth(format!("{KEY_ID_ENV} not set")))?;
        let secret_key = std::env::var(SECRET_KEY_ENV)
            .map_err(|_| VenueError::auth(format!("{SECRET_KEY_ENV} not set")))?;
        Ok(Self::new(key_id, secret_key))
    }
}

/// Alpaca equities venue.
pub struct AlpacaConnector {
    http: Client,
    api_url: String,
    data_url: String,
    credentials: AlpacaCredentials,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl std::fmt::Debug for AlpacaConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaConnector")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl AlpacaConnector {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &AlpacaConfig, credentials: AlpacaCredentials) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VenueError::unavailable(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(nonzero!(200u32)))),
        })
    }

    /// Builds a connector with credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Auth`] when credentials are missing.
    pub fn from_env(config: &AlpacaConfig) -> Result<Self, VenueError> {
        Self::new(config, AlpacaCredentials::from_env()?)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("APCA-API-KEY-ID", &self.credentials.key_id)
            .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
    }

    async fn submit_order(&self, request: &OrderRequest<'_>) -> Result<VenueFill, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v2/orders", self.api_url);
        tracing::debug!(symbol = request.symbol, side = request.side, "alpaca order");

        let response = self
            .authed(self.http.post(&url))
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let order: OrderResponse = parse_response(response).await?;
        self.await_fill(order).await
    }

    /// Polls the order until it fills. Alpaca acknowledges market orders
    /// as `accepted` and fills them moments later; an order still
    /// unfilled after the polling window is cancelled best-effort and
    /// reported as rejected.
    async fn await_fill(&self, mut order: OrderResponse) -> Result<VenueFill, VenueError> {
        for _ in 0..FILL_POLL_ATTEMPTS {
            if order.is_filled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(FILL_POLL_DELAY_MS)).await;

            self.rate_limiter.until_ready().await;
            let url = format!("{}/v2/orders/{}", self.api_url, order.id);
            let response = self
                .authed(self.http.get(&url))
                .send()
                .await
                .map_err(map_transport_error)?;
            order = parse_response(response).await?;
        }

        if !order.is_filled() {
            self.cancel_order(&order.id).await;
            return Err(VenueError::rejected(format!(
                "order {} not filled (status {})",
                order.id, order.status
            )));
        }

        match (order.filled_avg_price, order.filled_qty) {
            (Some(price), Some(quantity)) if !quantity.is_zero() => Ok(VenueFill {
                order_id: order.id,
                price,
                quantity,
            }),
            _ => Err(VenueError::Serialization(format!(
                "filled order {} missing fill fields",
                order.id
            ))),
        }
    }

    async fn cancel_order(&self, order_id: &str) {
        let url = format!("{}/v2/orders/{order_id}", self.api_url);
        match self.authed(self.http.delete(&url)).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(order_id, status = %response.status(), "failed to cancel stale order");
            }
            Err(e) => tracing::warn!(order_id, error = %e, "failed to cancel stale order"),
        }
    }
}

/// Alpaca accepts fractional notional orders from one dollar.
const MIN_NOTIONAL_USD: u32 = 1;

#[async_trait]
impl VenueConnector for AlpacaConnector {
    fn venue_id(&self) -> &str {
        "alpaca"
    }

    fn quote_asset(&self) -> &str {
        "USD"
    }

    fn min_notional(&self) -> Decimal {
        Decimal::from(MIN_NOTIONAL_USD)
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<VenueFill, VenueError> {
        let symbol = validate_symbol(&ticket.symbol)?;
        let request = OrderRequest {
            symbol,
            notional: Some(ticket.notional.round_dp(2).normalize().to_string()),
            qty: None,
            side: order_side(ticket.side),
            order_type: "market",
            time_in_force: "day",
        };
        self.submit_order(&request).await
    }

    async fn close_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<VenueFill, VenueError> {
        let symbol = validate_symbol(symbol)?;
        let request = OrderRequest {
            symbol,
            notional: None,
            qty: Some(quantity.round_dp(9).normalize().to_string()),
            side: order_side(side),
            order_type: "market",
            time_in_force: "day",
        };
        self.submit_order(&request).await
    }

    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, VenueError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v2/account", self.api_url);
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(map_transport_error)?;
        let account: AccountResponse = parse_response(response).await?;

        if account.currency != asset {
            return Ok(Decimal::ZERO);
        }
        Ok(account.cash)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        let symbol = validate_symbol(symbol)?;
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v2/stocks/{symbol}/trades/latest", self.data_url);
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(map_transport_error)?;
        let latest: LatestTradeResponse = parse_response(response).await?;
        Ok(latest.trade.price)
    }
}

const fn order_side(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

/// Symbols land in URL paths, so reject anything that could escape the
/// path segment.
fn validate_symbol(symbol: &str) -> Result<&str, VenueError> {
    if symbol.is_empty() || symbol.len() > 16 {
        return Err(VenueError::rejected(format!("invalid symbol: {symbol}")));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(VenueError::rejected(format!("invalid symbol: {symbol}")));
    }
    Ok(symbol)
}

fn map_transport_error(e: reqwest::Error) -> VenueError {
    VenueError::unavailable(format!("alpaca unreachable: {e}"))
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
        return VenueError::auth(format!("alpaca {status}: {body}"));
    }
    if status.as_u16() == 429 {
        return VenueError::unavailable("alpaca rate limited");
    }
    if status.is_server_error() {
        return VenueError::unavailable(format!("alpaca {status}"));
    }
    if let Ok(api) = serde_json::from_str::<ApiError>(body) {
        return VenueError::rejected(api.message);
    }
    VenueError::rejected(format!("alpaca {status}: {body}"))
}

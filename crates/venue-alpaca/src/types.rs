use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request body for `POST /v2/orders`. Exactly one of `notional` and
/// `qty` is set; Alpaca rejects orders carrying both.
#[derive(Debug, Serialize)]
pub struct OrderRequest<'a> {
    pub symbol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<String>,
    pub side: &'a str,
    #[serde(rename = "type")]
    pub order_type: &'a str,
    pub time_in_force: &'a str,
}

/// Subset of the order object we read back.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub symbol: String,
    pub status: String,
    pub filled_qty: Option<Decimal>,
    pub filled_avg_price: Option<Decimal>,
}

impl OrderResponse {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == "filled"
    }
}

/// Subset of `GET /v2/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub currency: String,
    pub cash: Decimal,
    pub buying_power: Decimal,
}

/// Response to `GET /v2/stocks/{symbol}/trades/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestTradeResponse {
    pub symbol: String,
    pub trade: LatestTrade,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestTrade {
    #[serde(rename = "p")]
    pub price: Decimal,
}

/// Error body Alpaca attaches to non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: Option<i64>,
    pub message: String,
}

use rust_decimal::Decimal;
use serde::Deserialize;

/// Response to `POST /api/v3/order` for a filled market order.
/// Quantities arrive as JSON strings; `Decimal` parses both forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub status: String,
    pub executed_qty: Decimal,
    /// Binance's own (misspelled) field name for filled quote volume.
    pub cummulative_quote_qty: Decimal,
    #[serde(default)]
    pub fills: Vec<OrderFill>,
}

impl OrderResponse {
    /// Average fill price: filled quote volume over filled base volume.
    #[must_use]
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        if self.executed_qty.is_zero() {
            return None;
        }
        Some(self.cummulative_quote_qty / self.executed_qty)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderFill {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Subset of `GET /api/v3/account` we read.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Response to `GET /api/v3/ticker/price`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// Error body Binance attaches to non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

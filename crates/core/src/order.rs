use crate::position::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A desired market order handed to a venue connector. Sizing is by
/// notional; the venue reports back the quantity it actually filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    pub symbol: String,
    pub side: Side,
    pub notional: Decimal,
}

impl OrderTicket {
    #[must_use]
    pub fn new(symbol: &str, side: Side, notional: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            notional,
        }
    }
}

/// A fill reported by a venue connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueFill {
    pub order_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// The router's normalized view of a successful execution, whichever
/// venue produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub venue: String,
    pub order_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl ExecutionResult {
    #[must_use]
    pub fn from_fill(venue: &str, fill: VenueFill) -> Self {
        Self {
            venue: venue.to_string(),
            order_id: fill.order_id,
            price: fill.price,
            quantity: fill.quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionAction {
    Open,
    Close,
}

impl ExecutionAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
        }
    }
}

impl std::str::FromStr for ExecutionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSE" => Ok(Self::Close),
            other => Err(format!("unknown execution action: {other}")),
        }
    }
}

/// One append-only audit row: every position open and close lands here
/// exactly once and is never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Assigned by the store on insert; 0 until persisted.
    pub id: i64,
    pub session_id: String,
    pub position_id: String,
    pub action: ExecutionAction,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Realized P&L contribution; None for opens.
    pub pnl: Option<Decimal>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn open(session_id: &str, position_id: &str, symbol: &str, price: Decimal, quantity: Decimal, reason: &str) -> Self {
        Self {
            id: 0,
            session_id: session_id.to_string(),
            position_id: position_id.to_string(),
            action: ExecutionAction::Open,
            symbol: symbol.to_string(),
            price,
            quantity,
            reason: reason.to_string(),
            timestamp: Utc::now(),
            pnl: None,
        }
    }

    #[must_use]
    pub fn close(
        session_id: &str,
        position_id: &str,
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
        reason: &str,
        pnl: Decimal,
    ) -> Self {
        Self {
            id: 0,
            session_id: session_id.to_string(),
            position_id: position_id.to_string(),
            action: ExecutionAction::Close,
            symbol: symbol.to_string(),
            price,
            quantity,
            reason: reason.to_string(),
            timestamp: Utc::now(),
            pnl: Some(pnl),
        }
    }
}

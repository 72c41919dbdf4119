use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Directional decision from a signal provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// The signal-provider output contract: a direction, a confidence in
/// 0..=1, and optional stop-loss/take-profit offsets that override the
/// session's risk defaults when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: SignalAction,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<f64>,
}

impl TradeSignal {
    /// A neutral signal; the engine opens nothing on it.
    #[must_use]
    pub const fn hold() -> Self {
        Self {
            action: SignalAction::Hold,
            confidence: 0.0,
            stop_loss_pct: None,
            take_profit_pct: None,
        }
    }

    #[must_use]
    pub fn is_hold(&self) -> bool {
        self.action == SignalAction::Hold
    }
}

/// Feature vector handed to a signal provider: the last seen price and
/// a short rolling history of closes, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentFeatures {
    pub last_price: Decimal,
    pub history: Vec<Decimal>,
}

impl InstrumentFeatures {
    #[must_use]
    pub fn new(last_price: Decimal, history: Vec<Decimal>) -> Self {
        Self {
            last_price,
            history,
        }
    }
}

use sentinel_core::VenueError;
use thiserror::Error;

/// One failed attempt from the routing fold, kept for the exhaustion
/// report and the debug log.
#[derive(Debug, Clone)]
pub struct RouteAttempt {
    pub venue: String,
    pub error: VenueError,
}

/// Routing failure. Exhaustion is not a session-level error: the caller
/// skips the candidate instrument and moves on.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("all venues exhausted for {symbol} after {} attempts", .attempts.len())]
    Exhausted {
        symbol: String,
        attempts: Vec<RouteAttempt>,
    },
}

impl RouteError {
    #[must_use]
    pub fn attempts(&self) -> &[RouteAttempt] {
        match self {
            Self::Exhausted { attempts, .. } => attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn display_counts_the_attempts() {
        let err = RouteError::Exhausted {
            symbol: "BTCUSDT".to_string(),
            attempts: vec![
                RouteAttempt {
                    venue: "binance".to_string(),
                    error: VenueError::insufficient_balance(Decimal::from(500), Decimal::ZERO),
                },
                RouteAttempt {
                    venue: "alpaca".to_string(),
                    error: VenueError::unavailable("timeout"),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "all venues exhausted for BTCUSDT after 2 attempts"
        );
        assert_eq!(err.attempts().len(), 2);
    }
}

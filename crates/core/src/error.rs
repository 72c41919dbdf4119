//! Venue-level error taxonomy shared by every connector.
//!
//! All variants are recoverable from the router's point of view: a
//! failed connector is skipped and the next one in the priority list is
//! consulted.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors a venue connector can surface on any call.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    /// Connectivity failure, timeout, or a 5xx from the venue.
    #[error("venue unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected or missing.
    #[error("venue authentication failed: {0}")]
    Auth(String),

    /// Quote-asset balance too small for the requested notional.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Requested notional is under the venue's minimum order size.
    #[error("notional {notional} below venue minimum {minimum}")]
    BelowMinimumNotional { notional: Decimal, minimum: Decimal },

    /// Venue accepted the request but refused the order.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The venue answered with something we could not parse.
    #[error("malformed venue response: {0}")]
    Serialization(String),
}

impl VenueError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth(reason.into())
    }

    #[must_use]
    pub const fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    #[must_use]
    pub const fn below_minimum_notional(notional: Decimal, minimum: Decimal) -> Self {
        Self::BelowMinimumNotional { notional, minimum }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// True when retrying the same venue later could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

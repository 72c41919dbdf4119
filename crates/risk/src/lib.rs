//! Pure risk evaluation.
//!
//! Every function here is a side-effect-free predicate or calculation
//! over a session snapshot. Callers (the round opener and the monitor
//! loop) act on the answers; nothing in this crate touches the store or
//! a venue.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sentinel_core::Session;

/// Whether the session may open another trading round.
///
/// Rounds are counted when at least one position opens, so a session
/// that only ever saw HOLD signals keeps its budget.
#[must_use]
pub fn may_open_new_round(session: &Session) -> bool {
    session.trades_count < session.risk.max_rounds_per_day
}

/// Whether realized losses have breached the daily loss limit.
///
/// The floor is a fraction of the *initial* portfolio, so the limit
/// does not creep down as losses shrink the current portfolio.
#[must_use]
pub fn must_stop(session: &Session) -> bool {
    session.total_pnl <= -daily_loss_floor(session)
}

/// Absolute loss floor for the session, as a positive amount.
#[must_use]
pub fn daily_loss_floor(session: &Session) -> Decimal {
    let pct = Decimal::from_f64(session.risk.max_daily_loss_pct).unwrap_or(Decimal::ZERO);
    session.initial_portfolio * pct
}

/// Notional to commit to one new position, sized off the current
/// portfolio value.
#[must_use]
pub fn position_notional(session: &Session) -> Decimal {
    let pct = Decimal::from_f64(session.risk.max_position_size_pct).unwrap_or(Decimal::ZERO);
    (session.current_portfolio * pct).round_dp(2)
}

/// Whether the session has room for another concurrent position.
#[must_use]
pub fn has_capacity(session: &Session, active_positions: usize) -> bool {
    active_positions < session.risk.max_concurrent_positions as usize
}

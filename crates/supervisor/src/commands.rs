use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentinel_core::{ExitReason, Position, Session, SessionMode, SessionStatus};
use serde::Serialize;
use tokio::sync::oneshot;

/// Commands a monitor actor accepts between ticks. A command never
/// interrupts an in-flight tick; it is picked up once the tick ends.
#[derive(Debug)]
pub enum SessionCommand {
    /// Close every ACTIVE position, complete the session, and exit.
    Stop {
        /// Exit reason recorded on each closed position.
        trigger: ExitReason,
        /// Free-text stop reason recorded on the session row.
        reason: String,
        reply: oneshot::Sender<StopReport>,
    },
    /// Exit after the in-flight tick without completing the session.
    /// The session stays ACTIVE in the store and is re-attached by
    /// recovery on the next boot.
    Shutdown,
}

/// Outcome of `start_session`.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub session_id: String,
    pub user_id: String,
    pub mode: SessionMode,
    /// Positions filled during the opening round. Zero is a valid
    /// start: the monitor keeps trying on later ticks.
    pub positions_opened: usize,
    pub initial_portfolio: Decimal,
}

/// Outcome of `stop_session`.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub session_id: String,
    pub positions_closed: usize,
    pub total_pnl: Decimal,
    pub stop_reason: String,
}

/// One session re-attached by `recover_on_startup`.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveredSession {
    pub session_id: String,
    pub user_id: String,
    pub active_positions: usize,
}

/// Point-in-time view of one session, published on the status channel
/// after every tick and projected from the store for sessions without
/// a live monitor.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub active_positions: usize,
    pub closed_positions: usize,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub current_portfolio: Decimal,
    /// Trading rounds opened so far, not individual positions.
    pub rounds: u32,
    pub stop_reason: Option<String>,
    pub as_of: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Builds a snapshot from a session and its position set. `active`
    /// must hold only ACTIVE positions; rows already closed are counted
    /// through `closed_positions`.
    #[must_use]
    pub fn capture(session: &Session, active: &[Position], closed_positions: usize) -> Self {
        let unrealized = active.iter().map(|p| p.pnl).sum();
        Self {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            status: session.status,
            mode: session.mode,
            active_positions: active.len(),
            closed_positions,
            realized_pnl: session.total_pnl,
            unrealized_pnl: unrealized,
            current_portfolio: session.current_portfolio,
            rounds: session.trades_count,
            stop_reason: session.stop_reason.clone(),
            as_of: Utc::now(),
        }
    }
}

/// Status answer for a user. Never an error: a user without a session
/// gets an explicit [`SessionStatusReport::Inactive`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionStatusReport {
    Active(SessionSnapshot),
    Inactive,
}

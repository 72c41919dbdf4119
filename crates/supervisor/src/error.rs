use sentinel_core::VenueError;
use sentinel_store::StoreError;
use thiserror::Error;

/// Failures of the supervisor's public operations.
///
/// Routing exhaustion and signal errors never surface here: inside a
/// round they downgrade to skipped candidates, and a risk-limit breach
/// is a normal session completion, not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user {user_id} already has an active session")]
    SessionAlreadyActive { user_id: String },

    #[error("no active session for user {user_id}")]
    NoActiveSession { user_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Venue(#[from] VenueError),
}

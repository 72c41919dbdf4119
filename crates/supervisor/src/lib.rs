//! Session supervision.
//!
//! One [`SessionSupervisor`] owns the registry of running sessions.
//! Each ACTIVE session is driven by a [`MonitorActor`] task that wakes
//! on a fixed interval, refreshes prices, evaluates exits, enforces the
//! session's risk limits, and persists every state change before the
//! next tick. The store is the source of truth: a crash loses at most
//! one tick of mark-to-market, and `recover_on_startup` re-attaches a
//! monitor to whatever the store says is still ACTIVE.

pub mod closer;
pub mod commands;
pub mod context;
pub mod error;
pub mod handle;
pub mod monitor;
pub mod price;
pub mod rounds;
pub mod supervisor;

pub use closer::PositionCloser;
pub use commands::{
    RecoveredSession, SessionCommand, SessionSnapshot, SessionStatusReport, StartReport,
    StopReport,
};
pub use context::EngineContext;
pub use error::EngineError;
pub use handle::SessionHandle;
pub use monitor::MonitorActor;
pub use price::{PriceHistory, PriceSource};
pub use rounds::RoundOpener;
pub use supervisor::SessionSupervisor;

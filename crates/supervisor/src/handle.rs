use crate::commands::{SessionCommand, SessionSnapshot, StopReport};
use sentinel_core::ExitReason;
use tokio::sync::{mpsc, oneshot, watch};

/// Cheap, cloneable handle to one monitor actor: a command sender plus
/// the receiving end of its status channel.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    tx: mpsc::Sender<SessionCommand>,
    status_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(
        session_id: String,
        tx: mpsc::Sender<SessionCommand>,
        status_rx: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            session_id,
            tx,
            status_rx,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the actor behind this handle is still running. A monitor
    /// that completed its session (risk stop, user stop) drops its
    /// receiver, and the handle goes dead.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Last snapshot the actor published.
    #[must_use]
    pub fn latest_snapshot(&self) -> SessionSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Asks the actor to close everything and complete the session.
    ///
    /// Returns `None` when the actor is already gone; the caller falls
    /// back to closing the session's rows directly.
    pub async fn stop(&self, trigger: ExitReason, reason: &str) -> Option<StopReport> {
        let (reply, response) = oneshot::channel();
        let command = SessionCommand::Stop {
            trigger,
            reason: reason.to_string(),
            reply,
        };
        if self.tx.send(command).await.is_err() {
            return None;
        }
        response.await.ok()
    }

    /// Asks the actor to exit after its current tick without completing
    /// the session. Best effort: a dead actor is already shut down.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }
}

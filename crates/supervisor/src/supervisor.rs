use crate::closer::PositionCloser;
use crate::commands::{
    RecoveredSession, SessionSnapshot, SessionStatusReport, StartReport, StopReport,
};
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::handle::SessionHandle;
use crate::monitor::MonitorActor;
use crate::price::PriceHistory;
use crate::rounds::RoundOpener;
use chrono::Utc;
use sentinel_core::{ExitReason, Position, Session, SessionMode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const COMMAND_BUFFER: usize = 16;

struct SessionEntry {
    handle: SessionHandle,
    join: JoinHandle<()>,
}

/// Owns the live monitor actors, one per user with an ACTIVE session.
///
/// The registry maps `user_id` to a handle; the store remains the
/// source of truth, so every operation falls back to the session rows
/// when no live monitor exists (after a crash, or when an actor has
/// already finished on its own).
pub struct SessionSupervisor {
    ctx: EngineContext,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionSupervisor {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Starts a session for `user_id` and spawns its monitor.
    ///
    /// The opening round runs before the monitor task starts, so the
    /// report reflects what the session actually holds. A stale ACTIVE
    /// session left by an earlier run is force-closed first; a fresh
    /// one is an error.
    pub async fn start_session(
        &self,
        user_id: &str,
        mode: SessionMode,
    ) -> Result<StartReport, EngineError> {
        if self.live_handle(user_id).await.is_some() {
            return Err(EngineError::SessionAlreadyActive {
                user_id: user_id.to_string(),
            });
        }

        if let Some(existing) = self.ctx.store.find_active_session(user_id).await? {
            if existing.is_stale(Utc::now(), self.ctx.engine.staleness_window_secs) {
                warn!(
                    session_id = %existing.id,
                    user_id,
                    "stale session found at start, force-closing"
                );
                self.close_directly(existing, ExitReason::SessionStale, "SESSION_STALE")
                    .await?;
            } else {
                return Err(EngineError::SessionAlreadyActive {
                    user_id: user_id.to_string(),
                });
            }
        }

        let initial_portfolio = self.ctx.resolve_initial_portfolio(user_id, mode).await;
        let mut session = Session::new(
            user_id,
            mode,
            initial_portfolio,
            self.ctx.risk_template.clone(),
        );
        self.ctx.store.save_session(&session).await?;
        info!(
            session_id = %session.id,
            user_id,
            mode = mode.as_str(),
            %initial_portfolio,
            "session started"
        );

        let mut positions = Vec::new();
        let opener = RoundOpener::new(&self.ctx, mode);
        let opened = opener
            .open_round(&mut session, &mut positions, &PriceHistory::new())
            .await?;

        let report = StartReport {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            mode,
            positions_opened: opened,
            initial_portfolio,
        };
        self.spawn_monitor(session, positions, 0).await;
        Ok(report)
    }

    /// Stops `user_id`'s session, closing every open position. `reason`
    /// is recorded on the session row and the execution log.
    ///
    /// Prefers the live monitor so the close runs between ticks; a
    /// session without one (crashed monitor, earlier process) has its
    /// rows closed directly at the last persisted marks.
    pub async fn stop_session(
        &self,
        user_id: &str,
        reason: &str,
    ) -> Result<StopReport, EngineError> {
        let entry = self.sessions.write().await.remove(user_id);
        if let Some(entry) = entry {
            if let Some(report) = entry.handle.stop(ExitReason::UserRequest, reason).await {
                if let Err(err) = entry.join.await {
                    error!(user_id, error = %err, "monitor task panicked while stopping");
                }
                info!(
                    session_id = %report.session_id,
                    user_id,
                    positions_closed = report.positions_closed,
                    total_pnl = %report.total_pnl,
                    "session stopped"
                );
                return Ok(report);
            }
            // The actor finished on its own; the store has the truth.
        }

        let Some(session) = self.ctx.store.find_active_session(user_id).await? else {
            return Err(EngineError::NoActiveSession {
                user_id: user_id.to_string(),
            });
        };
        warn!(
            session_id = %session.id,
            user_id,
            "no live monitor, closing session rows directly"
        );
        self.close_directly(session, ExitReason::UserRequest, reason)
            .await
    }

    /// Current view of `user_id`'s session: the monitor's latest
    /// snapshot when one runs, a store projection otherwise. Never
    /// fails; a store outage is logged and reported as inactive.
    pub async fn get_status(&self, user_id: &str) -> SessionStatusReport {
        if let Some(handle) = self.live_handle(user_id).await {
            return SessionStatusReport::Active(handle.latest_snapshot());
        }

        match self.project_from_store(user_id).await {
            Ok(report) => report,
            Err(err) => {
                warn!(user_id, error = %err, "status projection failed, reporting inactive");
                SessionStatusReport::Inactive
            }
        }
    }

    async fn project_from_store(
        &self,
        user_id: &str,
    ) -> Result<SessionStatusReport, EngineError> {
        let Some(session) = self.ctx.store.find_active_session(user_id).await? else {
            return Ok(SessionStatusReport::Inactive);
        };
        let all = self.ctx.store.list_positions(&session.id).await?;
        let active: Vec<Position> = all.iter().filter(|p| p.is_active()).cloned().collect();
        let closed = all.len() - active.len();
        Ok(SessionStatusReport::Active(SessionSnapshot::capture(
            &session, &active, closed,
        )))
    }

    /// Re-attaches a monitor to every session the store reports ACTIVE.
    ///
    /// Runs once at boot. Stale sessions are closed instead of resumed;
    /// the rest get a monitor with their persisted positions and no
    /// opening round, so recovery never duplicates anything. A session
    /// that fails to re-attach is logged and skipped rather than
    /// blocking the others.
    pub async fn recover_on_startup(&self) -> Result<Vec<RecoveredSession>, EngineError> {
        let sessions = self.ctx.store.list_active_sessions().await?;
        if sessions.is_empty() {
            info!("no active sessions to recover");
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut recovered = Vec::new();
        for session in sessions {
            if self.live_handle(&session.user_id).await.is_some() {
                continue;
            }
            let session_id = session.id.clone();
            let user_id = session.user_id.clone();

            if session.is_stale(now, self.ctx.engine.staleness_window_secs) {
                match self
                    .close_directly(session, ExitReason::SessionStale, "SESSION_STALE")
                    .await
                {
                    Ok(report) => info!(
                        session_id = %report.session_id,
                        user_id = %user_id,
                        positions_closed = report.positions_closed,
                        "stale session force-closed at recovery"
                    ),
                    Err(err) => error!(
                        session_id = %session_id,
                        error = %err,
                        "failed to close stale session"
                    ),
                }
                continue;
            }

            match self.attach(session).await {
                Ok(active_positions) => {
                    info!(
                        session_id = %session_id,
                        user_id = %user_id,
                        active_positions,
                        "session re-attached"
                    );
                    recovered.push(RecoveredSession {
                        session_id,
                        user_id,
                        active_positions,
                    });
                }
                Err(err) => {
                    error!(session_id = %session_id, error = %err, "failed to re-attach session");
                }
            }
        }
        info!(count = recovered.len(), "recovery finished");
        Ok(recovered)
    }

    /// Detaches every monitor without completing its session; the
    /// sessions stay ACTIVE for the next boot's recovery.
    pub async fn shutdown_all(&self) {
        let entries: Vec<(String, SessionEntry)> =
            self.sessions.write().await.drain().collect();
        for (user_id, entry) in entries {
            entry.handle.shutdown().await;
            if let Err(err) = entry.join.await {
                error!(user_id, error = %err, "monitor task panicked during shutdown");
            }
        }
        info!("all monitors detached");
    }

    /// Users with a live monitor right now.
    #[must_use]
    pub async fn active_users(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Live handle for `user_id`, pruning the entry if its actor has
    /// already finished.
    async fn live_handle(&self, user_id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(user_id) {
            Some(entry) if entry.handle.is_alive() => Some(entry.handle.clone()),
            Some(_) => {
                sessions.remove(user_id);
                None
            }
            None => None,
        }
    }

    async fn attach(&self, session: Session) -> Result<usize, EngineError> {
        let all = self.ctx.store.list_positions(&session.id).await?;
        let positions: Vec<Position> = all.iter().filter(|p| p.is_active()).cloned().collect();
        let closed_count = all.len() - positions.len();
        let count = positions.len();
        self.spawn_monitor(session, positions, closed_count).await;
        Ok(count)
    }

    async fn spawn_monitor(
        &self,
        session: Session,
        positions: Vec<Position>,
        closed_count: usize,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let initial = SessionSnapshot::capture(&session, &positions, closed_count);
        let (status_tx, status_rx) = watch::channel(initial);
        let handle = SessionHandle::new(session.id.clone(), tx, status_rx);
        let user_id = session.user_id.clone();

        let actor = MonitorActor::new(&self.ctx, session, positions, closed_count, rx, status_tx);
        let join = tokio::spawn(actor.run());

        self.sessions.write().await.insert(
            user_id,
            SessionEntry {
                handle: handle.clone(),
                join,
            },
        );
        handle
    }

    /// Closes an ACTIVE session that has no live monitor: every ACTIVE
    /// position settles through the shared close path at its last
    /// persisted mark, then the session row is completed.
    async fn close_directly(
        &self,
        mut session: Session,
        trigger: ExitReason,
        reason: &str,
    ) -> Result<StopReport, EngineError> {
        let mut positions = self.ctx.store.list_active_positions(&session.id).await?;
        let closer = PositionCloser::new(&self.ctx, session.mode);
        let mut closed = 0usize;
        for position in &mut positions {
            let mark = position.current_price;
            closer.close(&mut session, position, mark, trigger).await?;
            closed += 1;
        }
        session.complete(reason, Utc::now());
        self.ctx.store.save_session(&session).await?;
        info!(
            session_id = %session.id,
            reason,
            positions_closed = closed,
            "session closed without a monitor"
        );
        Ok(StopReport {
            session_id: session.id.clone(),
            positions_closed: closed,
            total_pnl: session.total_pnl,
            stop_reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use sentinel_core::{
        EngineConfig, InstrumentFeatures, RiskSettings, Side, TradeSignal,
    };
    use sentinel_router::OrderRouter;
    use sentinel_store::Store;

    struct HoldSignals;

    #[async_trait]
    impl sentinel_core::SignalProvider for HoldSignals {
        fn name(&self) -> &str {
            "hold"
        }

        async fn get_signal(
            &self,
            _instrument: &str,
            _features: &InstrumentFeatures,
        ) -> anyhow::Result<TradeSignal> {
            Ok(TradeSignal::hold())
        }
    }

    async fn test_supervisor() -> SessionSupervisor {
        let store = Store::new_in_memory().await.unwrap();
        let router = Arc::new(OrderRouter::new(Vec::new()));
        let engine = EngineConfig {
            tick_interval_secs: 1,
            staleness_window_secs: 86_400,
            round_position_cap: 3,
            universe: vec!["BTCUSDT".to_string()],
        };
        let ctx = EngineContext::new(
            store,
            Arc::clone(&router),
            router,
            Arc::new(HoldSignals),
            engine,
            RiskSettings::default(),
            dec!(10000),
        );
        SessionSupervisor::new(ctx)
    }

    #[tokio::test]
    async fn second_start_for_the_same_user_is_rejected() {
        let supervisor = test_supervisor().await;
        let report = supervisor
            .start_session("u1", SessionMode::Paper)
            .await
            .unwrap();
        assert_eq!(report.positions_opened, 0);

        let err = supervisor
            .start_session("u1", SessionMode::Paper)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionAlreadyActive { .. }));
        supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn stop_without_a_session_is_an_error() {
        let supervisor = test_supervisor().await;
        let err = supervisor
            .stop_session("ghost", "USER_REQUEST")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoActiveSession { .. }));
    }

    #[tokio::test]
    async fn stop_completes_the_live_session() {
        let supervisor = test_supervisor().await;
        let report = supervisor
            .start_session("u1", SessionMode::Paper)
            .await
            .unwrap();

        let stopped = supervisor.stop_session("u1", "USER_REQUEST").await.unwrap();
        assert_eq!(stopped.session_id, report.session_id);
        assert_eq!(stopped.stop_reason, "USER_REQUEST");
        assert_eq!(stopped.positions_closed, 0);

        let status = supervisor.get_status("u1").await;
        assert!(matches!(status, SessionStatusReport::Inactive));

        let stored = supervisor
            .ctx
            .store
            .find_session(&report.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_active());
        assert_eq!(stored.stop_reason.as_deref(), Some("USER_REQUEST"));
    }

    #[tokio::test]
    async fn status_projects_from_the_store_when_no_monitor_runs() {
        let supervisor = test_supervisor().await;

        // Rows written by an earlier process; no live monitor here.
        let session = Session::new("u2", SessionMode::Paper, dec!(5000), RiskSettings::default());
        supervisor.ctx.store.save_session(&session).await.unwrap();
        let position = Position::open(
            &session.id,
            "BTCUSDT",
            Side::Buy,
            dec!(0.1),
            dec!(65000),
            dec!(63700),
            dec!(66950),
            0.8,
            "binance",
            "ord-1",
        );
        supervisor.ctx.store.save_position(&position).await.unwrap();

        let status = supervisor.get_status("u2").await;
        match status {
            SessionStatusReport::Active(snapshot) => {
                assert_eq!(snapshot.session_id, session.id);
                assert_eq!(snapshot.active_positions, 1);
                assert_eq!(snapshot.closed_positions, 0);
            }
            SessionStatusReport::Inactive => panic!("expected the stored session"),
        }
    }

    #[tokio::test]
    async fn orphaned_stop_closes_rows_directly() {
        let supervisor = test_supervisor().await;

        let mut session =
            Session::new("u3", SessionMode::Paper, dec!(5000), RiskSettings::default());
        supervisor.ctx.store.save_session(&session).await.unwrap();
        let mut position = Position::open(
            &session.id,
            "ETHUSDT",
            Side::Buy,
            dec!(2),
            dec!(3500),
            dec!(3430),
            dec!(3605),
            0.7,
            "binance",
            "ord-2",
        );
        // Last persisted mark is above entry.
        position.update_market(dec!(3550), Utc::now());
        supervisor.ctx.store.save_position(&position).await.unwrap();
        session.trades_count = 1;
        supervisor.ctx.store.save_session(&session).await.unwrap();

        let report = supervisor
            .stop_session("u3", "flatten before maintenance")
            .await
            .unwrap();
        assert_eq!(report.positions_closed, 1);
        assert_eq!(report.stop_reason, "flatten before maintenance");
        // 2 * (3550 - 3500), settled at the last mark.
        assert_eq!(report.total_pnl, dec!(100));

        let stored = supervisor
            .ctx
            .store
            .find_position(&position.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_active());
        assert_eq!(stored.exit_reason, Some(ExitReason::UserRequest));

        let completed = supervisor
            .ctx
            .store
            .find_session(&session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            completed.stop_reason.as_deref(),
            Some("flatten before maintenance")
        );
    }

    #[tokio::test]
    async fn recovery_reattaches_active_and_closes_stale() {
        let supervisor = test_supervisor().await;

        // A fresh ACTIVE session with one open position.
        let fresh = Session::new("u4", SessionMode::Paper, dec!(5000), RiskSettings::default());
        supervisor.ctx.store.save_session(&fresh).await.unwrap();
        let open = Position::open(
            &fresh.id,
            "BTCUSDT",
            Side::Buy,
            dec!(0.2),
            dec!(65000),
            dec!(63700),
            dec!(66950),
            0.9,
            "binance",
            "ord-3",
        );
        supervisor.ctx.store.save_position(&open).await.unwrap();

        // A stale one from two days ago.
        let mut stale =
            Session::new("u5", SessionMode::Paper, dec!(5000), RiskSettings::default());
        stale.start_time = Utc::now() - Duration::days(2);
        supervisor.ctx.store.save_session(&stale).await.unwrap();

        let recovered = supervisor.recover_on_startup().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].session_id, fresh.id);
        assert_eq!(recovered[0].active_positions, 1);

        let closed = supervisor
            .ctx
            .store
            .find_session(&stale.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!closed.is_active());
        assert_eq!(closed.stop_reason.as_deref(), Some("SESSION_STALE"));

        // No duplicate positions were opened for the recovered session.
        let positions = supervisor.ctx.store.list_positions(&fresh.id).await.unwrap();
        assert_eq!(positions.len(), 1);

        supervisor.shutdown_all().await;
    }
}

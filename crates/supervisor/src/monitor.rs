use crate::closer::PositionCloser;
use crate::commands::{SessionCommand, SessionSnapshot, StopReport};
use crate::context::EngineContext;
use crate::price::{PriceHistory, PriceSource};
use crate::rounds::RoundOpener;
use chrono::Utc;
use rust_decimal::Decimal;
use sentinel_core::{ExitReason, Position, Session};
use sentinel_store::{Store, StoreError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// The per-session monitoring task.
///
/// Owns the session, its ACTIVE positions, and the rolling price
/// history. Every tick it refreshes marks, closes whatever an exit
/// trigger or the risk limits demand, persists, and publishes a
/// snapshot on the status channel. Commands are served strictly
/// between ticks, never during one.
pub struct MonitorActor {
    session: Session,
    /// ACTIVE positions only; closed ones are counted and dropped.
    positions: Vec<Position>,
    closed_count: usize,
    history: PriceHistory,
    universe: Vec<String>,
    tick_interval: Duration,
    store: Store,
    prices: PriceSource,
    opener: RoundOpener,
    closer: PositionCloser,
    rx: mpsc::Receiver<SessionCommand>,
    status_tx: watch::Sender<SessionSnapshot>,
}

impl MonitorActor {
    #[must_use]
    pub fn new(
        ctx: &EngineContext,
        session: Session,
        positions: Vec<Position>,
        closed_count: usize,
        rx: mpsc::Receiver<SessionCommand>,
        status_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let mode = session.mode;
        Self {
            history: PriceHistory::new(),
            universe: ctx.engine.universe.clone(),
            tick_interval: Duration::from_secs(ctx.engine.tick_interval_secs.max(1)),
            store: ctx.store.clone(),
            prices: PriceSource::new(ctx.router_for(mode), ctx.engine.tick_interval_secs),
            opener: RoundOpener::new(ctx, mode),
            closer: PositionCloser::new(ctx, mode),
            session,
            positions,
            closed_count,
            rx,
            status_tx,
        }
    }

    pub async fn run(mut self) {
        info!(
            session_id = %self.session.id,
            user_id = %self.session.user_id,
            interval_secs = self.tick_interval.as_secs(),
            positions = self.positions.len(),
            "monitor started"
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(
                            session_id = %self.session.id,
                            error = %err,
                            "tick failed, retrying next interval"
                        );
                    }
                    self.publish();
                    if !self.session.is_active() {
                        info!(
                            session_id = %self.session.id,
                            reason = self.session.stop_reason.as_deref().unwrap_or("unknown"),
                            "session completed, monitor exiting"
                        );
                        break;
                    }
                }
                Some(command) = self.rx.recv() => {
                    match command {
                        SessionCommand::Stop { trigger, reason, reply } => {
                            let report = self.stop(trigger, &reason).await;
                            self.publish();
                            let _ = reply.send(report);
                            break;
                        }
                        SessionCommand::Shutdown => {
                            info!(
                                session_id = %self.session.id,
                                "monitor detached, session stays active for recovery"
                            );
                            break;
                        }
                    }
                }
                else => {
                    info!(session_id = %self.session.id, "command channel closed, monitor exiting");
                    break;
                }
            }
        }
    }

    /// One monitoring pass. A persistence failure aborts the remainder
    /// of the pass; in-memory state is kept consistent so the next tick
    /// can retry the writes.
    async fn tick(&mut self) -> Result<(), StoreError> {
        let now = Utc::now();

        // Resolve one price per symbol. Held symbols are marked by the
        // venue holding them and never fall back to another venue's
        // quote; unresolved symbols keep their last mark this tick.
        let mut quotes: HashMap<String, Decimal> = HashMap::new();
        for position in &self.positions {
            if quotes.contains_key(&position.symbol) {
                continue;
            }
            if let Some(price) = self.prices.position_price(position).await {
                quotes.insert(position.symbol.clone(), price);
            }
        }
        for symbol in &self.universe {
            if quotes.contains_key(symbol) || self.positions.iter().any(|p| p.symbol == *symbol) {
                continue;
            }
            if let Some(price) = self.prices.candidate_price(symbol).await {
                quotes.insert(symbol.clone(), price);
            }
        }
        for (symbol, price) in &quotes {
            self.history.push(symbol, *price);
        }

        // Mark to market and plan exits.
        let mut exits: Vec<(usize, Decimal, ExitReason)> = Vec::new();
        for (index, position) in self.positions.iter_mut().enumerate() {
            let Some(price) = quotes.get(&position.symbol).copied() else {
                continue;
            };
            position.update_market(price, now);
            if let Some(reason) = position.exit_trigger(price) {
                exits.push((index, price, reason));
            }
        }

        // Close sequentially through the shared path.
        let mut failure = None;
        for (index, price, reason) in exits {
            let result = self
                .closer
                .close(&mut self.session, &mut self.positions[index], price, reason)
                .await;
            if let Err(err) = result {
                failure = Some(err);
                break;
            }
        }
        self.sweep_closed();
        if let Some(err) = failure {
            return Err(err);
        }

        // Persist the session totals and the surviving marks.
        self.store.save_session(&self.session).await?;
        for position in &self.positions {
            self.store.save_position(position).await?;
        }

        // Session-level risk: a breached daily loss floor halts the
        // whole session, whatever the individual positions look like.
        if sentinel_risk::must_stop(&self.session) {
            warn!(
                session_id = %self.session.id,
                total_pnl = %self.session.total_pnl,
                floor = %sentinel_risk::daily_loss_floor(&self.session),
                "daily loss limit breached, halting session"
            );
            self.halt(ExitReason::DailyLossLimit, "DAILY_LOSS_LIMIT")
                .await?;
            return Ok(());
        }

        // Everything flat and rounds remaining: open the next round.
        if self.positions.is_empty() && sentinel_risk::may_open_new_round(&self.session) {
            self.opener
                .open_round(&mut self.session, &mut self.positions, &self.history)
                .await?;
        }

        Ok(())
    }

    /// Closes every remaining position at its current mark, then
    /// completes and persists the session.
    async fn halt(&mut self, trigger: ExitReason, reason: &str) -> Result<(), StoreError> {
        let mut failure = None;
        for index in 0..self.positions.len() {
            let mark = self.positions[index].current_price;
            let result = self
                .closer
                .close(&mut self.session, &mut self.positions[index], mark, trigger)
                .await;
            if let Err(err) = result {
                failure = Some(err);
                break;
            }
        }
        self.sweep_closed();
        if let Some(err) = failure {
            return Err(err);
        }

        self.session.complete(reason, Utc::now());
        self.store.save_session(&self.session).await?;
        info!(session_id = %self.session.id, reason, "session completed");
        Ok(())
    }

    async fn stop(&mut self, trigger: ExitReason, reason: &str) -> StopReport {
        let before = self.positions.len();
        if let Err(err) = self.halt(trigger, reason).await {
            error!(
                session_id = %self.session.id,
                error = %err,
                "stop persisted partially; recovery will reconcile"
            );
        }
        StopReport {
            session_id: self.session.id.clone(),
            positions_closed: before - self.positions.len(),
            total_pnl: self.session.total_pnl,
            stop_reason: reason.to_string(),
        }
    }

    /// Moves positions that left the ACTIVE state out of the working
    /// set and into the closed tally.
    fn sweep_closed(&mut self) {
        let before = self.positions.len();
        self.positions.retain(Position::is_active);
        self.closed_count += before - self.positions.len();
    }

    fn publish(&self) {
        let snapshot =
            SessionSnapshot::capture(&self.session, &self.positions, self.closed_count);
        let _ = self.status_tx.send(snapshot);
    }
}

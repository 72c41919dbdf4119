//! End-to-end engine scenarios: scripted venues, a directional signal
//! stub, an in-memory store, and real monitor tasks ticking at one
//! second.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sentinel_core::{
    EngineConfig, ExecutionAction, ExitReason, InstrumentFeatures, OrderTicket, Position,
    RiskSettings, Session, SessionMode, Side, SignalAction, TradeSignal, VenueConnector,
    VenueError, VenueFill,
};
use sentinel_router::OrderRouter;
use sentinel_store::Store;
use sentinel_supervisor::{EngineContext, SessionStatusReport, SessionSupervisor};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(100);
const DEADLINE: Duration = Duration::from_secs(10);

/// Venue serving a scripted price sequence (the last price repeats) and
/// filling orders at the most recently served price.
struct ScriptedVenue {
    id: &'static str,
    balance: Decimal,
    fail_orders: bool,
    script: Mutex<Script>,
    placed: AtomicU32,
    closed: AtomicU32,
}

struct Script {
    prices: Vec<Decimal>,
    cursor: usize,
    last: Decimal,
}

impl ScriptedVenue {
    fn serving(id: &'static str, balance: Decimal, prices: &[Decimal]) -> Arc<Self> {
        Arc::new(Self {
            id,
            balance,
            fail_orders: false,
            script: Mutex::new(Script {
                prices: prices.to_vec(),
                cursor: 0,
                last: prices[0],
            }),
            placed: AtomicU32::new(0),
            closed: AtomicU32::new(0),
        })
    }

    fn refusing_orders(id: &'static str, balance: Decimal, prices: &[Decimal]) -> Arc<Self> {
        Arc::new(Self {
            id,
            balance,
            fail_orders: true,
            script: Mutex::new(Script {
                prices: prices.to_vec(),
                cursor: 0,
                last: prices[0],
            }),
            placed: AtomicU32::new(0),
            closed: AtomicU32::new(0),
        })
    }

    fn next_price(&self) -> Decimal {
        let mut script = self.script.lock().unwrap();
        let index = script.cursor.min(script.prices.len() - 1);
        let price = script.prices[index];
        script.cursor += 1;
        script.last = price;
        price
    }

    fn last_price(&self) -> Decimal {
        self.script.lock().unwrap().last
    }

    fn placed(&self) -> u32 {
        self.placed.load(Ordering::SeqCst)
    }

    fn closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueConnector for ScriptedVenue {
    fn venue_id(&self) -> &str {
        self.id
    }

    fn quote_asset(&self) -> &str {
        "USDT"
    }

    fn min_notional(&self) -> Decimal {
        Decimal::ONE
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<VenueFill, VenueError> {
        if self.fail_orders {
            return Err(VenueError::unavailable("scripted outage"));
        }
        let price = self.last_price();
        let n = self.placed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(VenueFill {
            order_id: format!("{}-open-{n}", self.id),
            price,
            quantity: (ticket.notional / price).round_dp(8),
        })
    }

    async fn close_order(
        &self,
        _symbol: &str,
        _side: Side,
        quantity: Decimal,
    ) -> Result<VenueFill, VenueError> {
        if self.fail_orders {
            return Err(VenueError::unavailable("scripted outage"));
        }
        let price = self.last_price();
        let n = self.closed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(VenueFill {
            order_id: format!("{}-close-{n}", self.id),
            price,
            quantity,
        })
    }

    async fn fetch_balance(&self, _asset: &str) -> Result<Decimal, VenueError> {
        Ok(self.balance)
    }

    async fn fetch_price(&self, _symbol: &str) -> Result<Decimal, VenueError> {
        Ok(self.next_price())
    }
}

/// Always answers with the configured direction.
struct DirectionalSignals(SignalAction);

#[async_trait]
impl sentinel_core::SignalProvider for DirectionalSignals {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_signal(
        &self,
        _instrument: &str,
        _features: &InstrumentFeatures,
    ) -> anyhow::Result<TradeSignal> {
        Ok(TradeSignal {
            action: self.0,
            confidence: 0.9,
            stop_loss_pct: None,
            take_profit_pct: None,
        })
    }
}

fn engine_config(universe: &[&str]) -> EngineConfig {
    EngineConfig {
        tick_interval_secs: 1,
        staleness_window_secs: 86_400,
        round_position_cap: 3,
        universe: universe.iter().map(ToString::to_string).collect(),
    }
}

/// One round per day keeps scenarios deterministic after the round closes.
fn risk_one_round() -> RiskSettings {
    RiskSettings {
        max_rounds_per_day: 1,
        ..RiskSettings::default()
    }
}

async fn context_with(
    venues: Vec<Arc<dyn VenueConnector>>,
    direction: SignalAction,
    universe: &[&str],
    risk: RiskSettings,
) -> EngineContext {
    let store = Store::new_in_memory().await.unwrap();
    let router = Arc::new(OrderRouter::new(venues));
    EngineContext::new(
        store,
        Arc::clone(&router),
        router,
        Arc::new(DirectionalSignals(direction)),
        engine_config(universe),
        risk,
        dec!(10000),
    )
}

async fn wait_until_closed(store: &Store, session_id: &str) -> Position {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    loop {
        let positions = store.list_positions(session_id).await.unwrap();
        if let Some(position) = positions.iter().find(|p| !p.is_active()) {
            return position.clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no position closed within {DEADLINE:?}"
        );
        tokio::time::sleep(POLL).await;
    }
}

async fn wait_until_completed(store: &Store, session_id: &str) -> Session {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    loop {
        let session = store.find_session(session_id).await.unwrap().unwrap();
        if !session.is_active() {
            return session;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never completed within {DEADLINE:?}"
        );
        tokio::time::sleep(POLL).await;
    }
}

async fn wait_for_realized(store: &Store, session_id: &str, pnl: Decimal) -> Session {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    loop {
        let session = store.find_session(session_id).await.unwrap().unwrap();
        if session.total_pnl == pnl {
            return session;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never realized {pnl} within {DEADLINE:?}"
        );
        tokio::time::sleep(POLL).await;
    }
}

#[tokio::test]
async fn stop_loss_exit_fires_and_closes_on_the_venue() {
    // Entry quote at 100, then a 97 print that gaps through the 98 stop.
    let venue = ScriptedVenue::serving("scripted", dec!(10000), &[dec!(100), dec!(97)]);
    let ctx = context_with(
        vec![venue.clone()],
        SignalAction::Buy,
        &["BTCUSDT"],
        risk_one_round(),
    )
    .await;
    let store = ctx.store.clone();
    let supervisor = SessionSupervisor::new(ctx);

    let report = supervisor
        .start_session("u1", SessionMode::Live)
        .await
        .unwrap();
    assert_eq!(report.positions_opened, 1);
    assert_eq!(report.initial_portfolio, dec!(10000));

    let closed = wait_until_closed(&store, &report.session_id).await;
    assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(closed.exit_price, Some(dec!(97)));
    // 20 units (2000 notional at 100), 3 under entry.
    assert_eq!(closed.quantity, dec!(20));
    assert_eq!(closed.pnl, dec!(-60));
    assert_eq!(venue.closed(), 1);

    let session = wait_for_realized(&store, &report.session_id, dec!(-60)).await;
    assert!(session.is_active());
    assert_eq!(session.trades_count, 1);
    assert_eq!(session.current_portfolio, dec!(9940));

    let log = store.list_executions(&report.session_id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].action, ExecutionAction::Open);
    assert_eq!(log[1].action, ExecutionAction::Close);
    assert_eq!(log[1].reason, "STOP_LOSS");
    assert_eq!(log[1].pnl, Some(dec!(-60)));

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn take_profit_exit_realizes_and_the_round_budget_holds() {
    let venue = ScriptedVenue::serving("scripted", dec!(10000), &[dec!(100), dec!(105)]);
    let ctx = context_with(
        vec![venue.clone()],
        SignalAction::Buy,
        &["BTCUSDT"],
        risk_one_round(),
    )
    .await;
    let store = ctx.store.clone();
    let supervisor = SessionSupervisor::new(ctx);

    let report = supervisor
        .start_session("u1", SessionMode::Live)
        .await
        .unwrap();
    assert_eq!(report.positions_opened, 1);

    // Take-profit sits at 104 (4 % over 100); the 105 print crosses it.
    let closed = wait_until_closed(&store, &report.session_id).await;
    assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
    assert_eq!(closed.exit_price, Some(dec!(105)));
    assert_eq!(closed.pnl, dec!(100));

    // Flat with the round budget spent: a few more ticks must not reopen.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.list_positions(&report.session_id).await.unwrap().len(), 1);
    assert_eq!(venue.placed(), 1);

    let session = store
        .find_session(&report.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(session.is_active());
    assert_eq!(session.trades_count, 1);
    assert_eq!(session.total_pnl, dec!(100));
    assert_eq!(session.current_portfolio, dec!(10100));

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn daily_loss_limit_halts_the_whole_session() {
    // Two entries at 100, then both symbols print 87: each stop-loss
    // realizes -260 and the -520 total breaches the -500 floor.
    let venue = ScriptedVenue::serving(
        "scripted",
        dec!(10000),
        &[dec!(100), dec!(100), dec!(87), dec!(87)],
    );
    let ctx = context_with(
        vec![venue.clone()],
        SignalAction::Buy,
        &["AAAUSDT", "BBBUSDT"],
        risk_one_round(),
    )
    .await;
    let store = ctx.store.clone();
    let supervisor = SessionSupervisor::new(ctx);

    let report = supervisor
        .start_session("u1", SessionMode::Live)
        .await
        .unwrap();
    assert_eq!(report.positions_opened, 2);

    let session = wait_until_completed(&store, &report.session_id).await;
    assert_eq!(session.stop_reason.as_deref(), Some("DAILY_LOSS_LIMIT"));
    assert_eq!(session.total_pnl, dec!(-520));
    assert_eq!(session.current_portfolio, dec!(9480));

    let positions = store.list_positions(&report.session_id).await.unwrap();
    assert_eq!(positions.len(), 2);
    for position in &positions {
        assert!(!position.is_active());
        assert_eq!(position.exit_reason, Some(ExitReason::StopLoss));
    }
    assert_eq!(venue.closed(), 2);

    // The monitor exits on its own once its session completes.
    let deadline = tokio::time::Instant::now() + DEADLINE;
    loop {
        match supervisor.get_status("u1").await {
            SessionStatusReport::Inactive => break,
            SessionStatusReport::Active(_) => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "monitor still registered after completion"
                );
                tokio::time::sleep(POLL).await;
            }
        }
    }
}

#[tokio::test]
async fn open_falls_through_to_the_second_venue() {
    let broken = ScriptedVenue::refusing_orders("primary", dec!(10000), &[dec!(100)]);
    let backup = ScriptedVenue::serving("backup", dec!(10000), &[dec!(100)]);
    let ctx = context_with(
        vec![broken.clone(), backup.clone()],
        SignalAction::Buy,
        &["BTCUSDT"],
        risk_one_round(),
    )
    .await;
    let store = ctx.store.clone();
    let supervisor = SessionSupervisor::new(ctx);

    let report = supervisor
        .start_session("u1", SessionMode::Live)
        .await
        .unwrap();
    assert_eq!(report.positions_opened, 1);

    let positions = store.list_positions(&report.session_id).await.unwrap();
    assert_eq!(positions[0].venue.as_deref(), Some("backup"));
    assert_eq!(backup.placed(), 1);
    // The primary refused; no fill was invented for it.
    assert_eq!(broken.placed(), 0);

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn recovery_reattaches_and_the_stop_still_fires() {
    // Rows left behind by a crashed process: an ACTIVE session holding
    // an ACTIVE position entered at 100 with a 98 stop.
    let store = Store::new_in_memory().await.unwrap();
    let mut session = Session::new("u1", SessionMode::Live, dec!(10000), risk_one_round());
    session.trades_count = 1;
    store.save_session(&session).await.unwrap();
    let position = Position::open(
        &session.id,
        "BTCUSDT",
        Side::Buy,
        dec!(20),
        dec!(100),
        dec!(98),
        dec!(104),
        0.9,
        "scripted",
        "scripted-open-1",
    );
    store.save_position(&position).await.unwrap();

    // A fresh engine boots against the same store; the venue now
    // prints 97.
    let venue = ScriptedVenue::serving("scripted", dec!(10000), &[dec!(97)]);
    let router = Arc::new(OrderRouter::new(vec![venue.clone()]));
    let ctx = EngineContext::new(
        store.clone(),
        Arc::clone(&router),
        router,
        Arc::new(DirectionalSignals(SignalAction::Buy)),
        engine_config(&["BTCUSDT"]),
        risk_one_round(),
        dec!(10000),
    );
    let supervisor = SessionSupervisor::new(ctx);

    let recovered = supervisor.recover_on_startup().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].session_id, session.id);
    assert_eq!(recovered[0].active_positions, 1);

    let closed = wait_until_closed(&store, &session.id).await;
    assert_eq!(closed.id, position.id);
    assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(closed.exit_price, Some(dec!(97)));
    assert_eq!(venue.closed(), 1);
    // Same single row throughout; recovery opened nothing new.
    assert_eq!(store.list_positions(&session.id).await.unwrap().len(), 1);

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn shutdown_leaves_the_session_active_for_the_next_boot() {
    // Price pinned at 100: the position neither stops out nor takes profit.
    let venue = ScriptedVenue::serving("scripted", dec!(10000), &[dec!(100)]);
    let ctx = context_with(
        vec![venue.clone()],
        SignalAction::Buy,
        &["BTCUSDT"],
        risk_one_round(),
    )
    .await;
    let store = ctx.store.clone();
    let next_boot = ctx.clone();
    let supervisor = SessionSupervisor::new(ctx);

    let report = supervisor
        .start_session("u1", SessionMode::Live)
        .await
        .unwrap();
    assert_eq!(report.positions_opened, 1);

    supervisor.shutdown_all().await;
    let session = store
        .find_session(&report.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(session.is_active(), "detach must not complete the session");

    // Next boot: recovery re-attaches, then a user stop closes it for real.
    let supervisor = SessionSupervisor::new(next_boot);
    let recovered = supervisor.recover_on_startup().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].active_positions, 1);

    let stopped = supervisor.stop_session("u1", "USER_REQUEST").await.unwrap();
    assert_eq!(stopped.session_id, report.session_id);
    assert_eq!(stopped.positions_closed, 1);
    assert_eq!(stopped.stop_reason, "USER_REQUEST");
    assert_eq!(venue.closed(), 1);

    let session = store
        .find_session(&report.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!session.is_active());
    assert_eq!(session.stop_reason.as_deref(), Some("USER_REQUEST"));
}

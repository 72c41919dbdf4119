use rust_decimal::Decimal;
use sentinel_core::{EngineConfig, RiskSettings, SessionMode, SignalProvider};
use sentinel_router::OrderRouter;
use sentinel_store::Store;
use std::sync::Arc;
use tracing::debug;

/// Shared services every session task needs: the store, one router per
/// execution mode, the signal provider, and the engine settings.
///
/// Live and paper sessions never share a router. Paper sessions route
/// through the paper venue alone; a failing live venue therefore cannot
/// degrade into a paper fill.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Store,
    live_router: Arc<OrderRouter>,
    paper_router: Arc<OrderRouter>,
    pub signals: Arc<dyn SignalProvider>,
    pub engine: EngineConfig,
    /// Risk limits snapshotted into each session at start.
    pub risk_template: RiskSettings,
    /// Portfolio value assumed when no venue can report a balance.
    pub fallback_portfolio: Decimal,
}

impl EngineContext {
    #[must_use]
    pub fn new(
        store: Store,
        live_router: Arc<OrderRouter>,
        paper_router: Arc<OrderRouter>,
        signals: Arc<dyn SignalProvider>,
        engine: EngineConfig,
        risk_template: RiskSettings,
        fallback_portfolio: Decimal,
    ) -> Self {
        Self {
            store,
            live_router,
            paper_router,
            signals,
            engine,
            risk_template,
            fallback_portfolio,
        }
    }

    #[must_use]
    pub fn router_for(&self, mode: SessionMode) -> Arc<OrderRouter> {
        match mode {
            SessionMode::Live => Arc::clone(&self.live_router),
            SessionMode::Paper => Arc::clone(&self.paper_router),
        }
    }

    /// Starting portfolio for a new session: the first positive balance
    /// any of the user's venues reports, or the configured fallback.
    pub async fn resolve_initial_portfolio(&self, user_id: &str, mode: SessionMode) -> Decimal {
        let router = self.router_for(mode);
        for connector in router.connectors_for(user_id) {
            match connector.fetch_balance(connector.quote_asset()).await {
                Ok(balance) if balance > Decimal::ZERO => return balance,
                Ok(_) => {}
                Err(error) => {
                    debug!(venue = connector.venue_id(), %error, "balance probe failed");
                }
            }
        }
        self.fallback_portfolio
    }
}

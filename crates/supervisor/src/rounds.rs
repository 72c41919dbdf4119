use crate::context::EngineContext;
use crate::price::{PriceHistory, PriceSource};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sentinel_core::{
    ExecutionRecord, OrderTicket, Position, RiskSettings, Session, SessionMode, Side, SignalAction,
    SignalProvider, TradeSignal,
};
use sentinel_router::OrderRouter;
use sentinel_store::{Store, StoreError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Opens one trading round: scans the configured universe, asks the
/// signal provider about each candidate, sizes the order from the
/// session's risk settings, and routes it.
///
/// Candidates degrade individually. An unquotable symbol, a failing
/// signal provider, or an exhausted router all skip that candidate and
/// move on; only a store failure aborts the round.
pub struct RoundOpener {
    store: Store,
    router: Arc<OrderRouter>,
    signals: Arc<dyn SignalProvider>,
    prices: PriceSource,
    universe: Vec<String>,
    round_cap: usize,
}

impl RoundOpener {
    #[must_use]
    pub fn new(ctx: &EngineContext, mode: SessionMode) -> Self {
        let router = ctx.router_for(mode);
        Self {
            store: ctx.store.clone(),
            prices: PriceSource::new(Arc::clone(&router), ctx.engine.tick_interval_secs),
            router,
            signals: Arc::clone(&ctx.signals),
            universe: ctx.engine.universe.clone(),
            round_cap: ctx.engine.round_position_cap,
        }
    }

    /// Opens one round for `session`, appending new positions to
    /// `active`. Returns how many positions were opened; zero is a
    /// normal outcome. The session's round counter advances only when
    /// at least one position opened.
    ///
    /// # Errors
    ///
    /// Only persistence failures propagate; they abort the remainder of
    /// the round.
    pub async fn open_round(
        &self,
        session: &mut Session,
        active: &mut Vec<Position>,
        history: &PriceHistory,
    ) -> Result<usize, StoreError> {
        let mut opened = 0;

        for symbol in &self.universe {
            if opened >= self.round_cap {
                break;
            }
            if !sentinel_risk::has_capacity(session, active.len()) {
                debug!(session_id = %session.id, "concurrent position cap reached");
                break;
            }
            if active.iter().any(|p| p.symbol == *symbol) {
                continue;
            }

            let Some(reference) = self.prices.candidate_price(symbol).await else {
                debug!(symbol, "no venue can quote, skipping candidate");
                continue;
            };

            let features = history.features(symbol, reference);
            let signal = match self.signals.get_signal(symbol, &features).await {
                Ok(signal) => signal,
                Err(error) => {
                    warn!(symbol, %error, "signal provider failed, skipping candidate");
                    continue;
                }
            };
            let side = match signal.action {
                SignalAction::Buy => Side::Buy,
                SignalAction::Sell => Side::Sell,
                SignalAction::Hold => continue,
            };

            let (stop_loss, take_profit) = exit_levels(reference, side, &signal, &session.risk);
            let notional = sentinel_risk::position_notional(session);
            let ticket = OrderTicket::new(symbol, side, notional);

            let result = match self.router.execute_open(&session.user_id, &ticket).await {
                Ok(result) => result,
                Err(error) => {
                    warn!(symbol, %error, "no venue filled the order, skipping candidate");
                    continue;
                }
            };

            let position = Position::open(
                &session.id,
                symbol,
                side,
                result.quantity,
                result.price,
                stop_loss,
                take_profit,
                signal.confidence,
                &result.venue,
                &result.order_id,
            );
            if let Err(err) = self.store.save_position(&position).await {
                // The venue order exists but the row does not; name the
                // order so the books can be reconciled.
                error!(
                    symbol,
                    venue = %result.venue,
                    order_id = %result.order_id,
                    "order filled but position not persisted"
                );
                return Err(err);
            }
            self.store
                .append_execution(&ExecutionRecord::open(
                    &session.id,
                    &position.id,
                    symbol,
                    result.price,
                    result.quantity,
                    &format!("{} signal", side.as_str()),
                ))
                .await?;

            info!(
                session_id = %session.id,
                symbol,
                side = side.as_str(),
                venue = %result.venue,
                price = %result.price,
                notional = %notional,
                confidence = signal.confidence,
                "position opened"
            );
            active.push(position);
            opened += 1;
        }

        if opened > 0 {
            session.trades_count += 1;
            self.store.save_session(session).await?;
            info!(
                session_id = %session.id,
                round = session.trades_count,
                opened,
                "round opened"
            );
        }

        Ok(opened)
    }
}

/// Stop-loss and take-profit levels bracketing `reference`. The
/// signal's own offsets win over the session's risk defaults; a buy is
/// stopped below and takes profit above, a sell the other way around.
fn exit_levels(
    reference: Decimal,
    side: Side,
    signal: &TradeSignal,
    risk: &RiskSettings,
) -> (Decimal, Decimal) {
    let sl = Decimal::from_f64(signal.stop_loss_pct.unwrap_or(risk.stop_loss_pct))
        .unwrap_or_default();
    let tp = Decimal::from_f64(signal.take_profit_pct.unwrap_or(risk.take_profit_pct))
        .unwrap_or_default();
    let (stop_loss, take_profit) = match side {
        Side::Buy => (
            reference * (Decimal::ONE - sl),
            reference * (Decimal::ONE + tp),
        ),
        Side::Sell => (
            reference * (Decimal::ONE + sl),
            reference * (Decimal::ONE - tp),
        ),
    };
    (stop_loss.round_dp(8), take_profit.round_dp(8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(sl: Option<f64>, tp: Option<f64>) -> TradeSignal {
        TradeSignal {
            action: SignalAction::Buy,
            confidence: 0.8,
            stop_loss_pct: sl,
            take_profit_pct: tp,
        }
    }

    #[test]
    fn buy_levels_bracket_the_reference() {
        let (sl, tp) = exit_levels(
            dec!(100),
            Side::Buy,
            &signal(None, None),
            &RiskSettings::default(),
        );
        assert_eq!(sl, dec!(98));
        assert_eq!(tp, dec!(104));
    }

    #[test]
    fn sell_levels_are_mirrored() {
        let (sl, tp) = exit_levels(
            dec!(100),
            Side::Sell,
            &signal(None, None),
            &RiskSettings::default(),
        );
        assert_eq!(sl, dec!(102));
        assert_eq!(tp, dec!(96));
    }

    #[test]
    fn signal_offsets_override_the_risk_defaults() {
        let (sl, tp) = exit_levels(
            dec!(200),
            Side::Buy,
            &signal(Some(0.01), Some(0.05)),
            &RiskSettings::default(),
        );
        assert_eq!(sl, dec!(198));
        assert_eq!(tp, dec!(210));
    }
}

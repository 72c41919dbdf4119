use crate::context::EngineContext;
use chrono::Utc;
use rust_decimal::Decimal;
use sentinel_core::{ExecutionRecord, ExitReason, Position, Session, SessionMode};
use sentinel_router::OrderRouter;
use sentinel_store::{Store, StoreError};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared close path for every exit: price triggers, user stops, risk
/// stops, and stale-session cleanup all come through here.
pub struct PositionCloser {
    store: Store,
    router: Arc<OrderRouter>,
}

impl PositionCloser {
    #[must_use]
    pub fn new(ctx: &EngineContext, mode: SessionMode) -> Self {
        Self {
            store: ctx.store.clone(),
            router: ctx.router_for(mode),
        }
    }

    /// Closes `position` and folds the realized P&L into `session`.
    ///
    /// The venue-side mirror order goes out first; if it fails, the
    /// failure is logged and the local close settles at `mark_price`,
    /// so an exited position is never left dangling. Closing an
    /// already-closed position is a no-op returning zero. The caller
    /// persists the session row afterwards.
    ///
    /// # Errors
    ///
    /// Only persistence failures propagate.
    pub async fn close(
        &self,
        session: &mut Session,
        position: &mut Position,
        mark_price: Decimal,
        reason: ExitReason,
    ) -> Result<Decimal, StoreError> {
        if !position.is_active() {
            return Ok(Decimal::ZERO);
        }

        let mut exit_price = mark_price;
        if let Some(venue_id) = position.venue.clone() {
            match self
                .router
                .execute_close(
                    &venue_id,
                    &position.symbol,
                    position.side.opposite(),
                    position.quantity,
                )
                .await
            {
                Ok(fill) => exit_price = fill.price,
                Err(error) => {
                    warn!(
                        position_id = %position.id,
                        venue = %venue_id,
                        %error,
                        "venue close failed, settling at last mark"
                    );
                }
            }
        }

        let realized = position
            .mark_closed(exit_price, Utc::now(), reason)
            .unwrap_or(Decimal::ZERO);
        session.apply_realized(realized);

        self.store.save_position(position).await?;
        self.store
            .append_execution(&ExecutionRecord::close(
                &session.id,
                &position.id,
                &position.symbol,
                exit_price,
                position.quantity,
                reason.as_str(),
                realized,
            ))
            .await?;

        info!(
            session_id = %session.id,
            position_id = %position.id,
            symbol = %position.symbol,
            exit_price = %exit_price,
            pnl = %realized,
            reason = reason.as_str(),
            "position closed"
        );
        Ok(realized)
    }
}

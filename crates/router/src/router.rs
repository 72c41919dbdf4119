use crate::error::{RouteAttempt, RouteError};
use rust_decimal::Decimal;
use sentinel_core::{ExecutionResult, OrderTicket, Side, VenueConnector, VenueError, VenueFill};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Folds a desired trade over a priority-ordered connector list.
///
/// Every attempt produces a typed result; on failure the router simply
/// advances to the next authorized venue. It never fabricates a fill,
/// so a position either maps to a real order or is not created at all.
pub struct OrderRouter {
    connectors: Vec<Arc<dyn VenueConnector>>,
    /// Venue ids each user may trade on. Users absent from the map are
    /// authorized for every configured venue.
    authorizations: HashMap<String, Vec<String>>,
}

impl OrderRouter {
    #[must_use]
    pub fn new(connectors: Vec<Arc<dyn VenueConnector>>) -> Self {
        Self {
            connectors,
            authorizations: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_authorizations(mut self, authorizations: HashMap<String, Vec<String>>) -> Self {
        self.authorizations = authorizations;
        self
    }

    fn is_authorized(&self, user_id: &str, venue_id: &str) -> bool {
        self.authorizations
            .get(user_id)
            .map_or(true, |allowed| allowed.iter().any(|v| v == venue_id))
    }

    /// Connector registered under `venue_id`, if configured.
    #[must_use]
    pub fn venue(&self, venue_id: &str) -> Option<Arc<dyn VenueConnector>> {
        self.connectors
            .iter()
            .find(|c| c.venue_id() == venue_id)
            .cloned()
    }

    /// Connectors `user_id` may trade on, in priority order.
    #[must_use]
    pub fn connectors_for(&self, user_id: &str) -> Vec<Arc<dyn VenueConnector>> {
        self.connectors
            .iter()
            .filter(|c| self.is_authorized(user_id, c.venue_id()))
            .cloned()
            .collect()
    }

    /// Price from the first venue able to quote `symbol`.
    ///
    /// Quotes are public data, so no authorization filter applies.
    pub async fn fetch_quote(&self, symbol: &str) -> Option<Decimal> {
        for connector in &self.connectors {
            match connector.fetch_price(symbol).await {
                Ok(price) => return Some(price),
                Err(error) => {
                    debug!(venue = connector.venue_id(), symbol, %error, "quote failed, trying next");
                }
            }
        }
        None
    }

    /// Attempts to fill `ticket` on the first venue that takes it.
    ///
    /// The balance probe before placement is advisory: a venue can
    /// still reject the order, and that rejection is just another
    /// attempt in the fold.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Exhausted`] when every authorized venue
    /// failed; the error carries one entry per attempt.
    pub async fn execute_open(
        &self,
        user_id: &str,
        ticket: &OrderTicket,
    ) -> Result<ExecutionResult, RouteError> {
        let mut attempts = Vec::new();

        for connector in &self.connectors {
            let venue_id = connector.venue_id();
            if !self.is_authorized(user_id, venue_id) {
                debug!(venue = venue_id, user_id, "venue not authorized, skipping");
                continue;
            }

            let minimum = connector.min_notional();
            if ticket.notional < minimum {
                attempts.push(RouteAttempt {
                    venue: venue_id.to_string(),
                    error: VenueError::below_minimum_notional(ticket.notional, minimum),
                });
                continue;
            }

            match connector.fetch_balance(connector.quote_asset()).await {
                Ok(available) if available < ticket.notional => {
                    attempts.push(RouteAttempt {
                        venue: venue_id.to_string(),
                        error: VenueError::insufficient_balance(ticket.notional, available),
                    });
                    continue;
                }
                Err(error) => {
                    warn!(venue = venue_id, %error, "balance probe failed, skipping venue");
                    attempts.push(RouteAttempt {
                        venue: venue_id.to_string(),
                        error,
                    });
                    continue;
                }
                Ok(_) => {}
            }

            match connector.place_order(ticket).await {
                Ok(fill) => {
                    info!(
                        venue = venue_id,
                        symbol = %ticket.symbol,
                        side = ticket.side.as_str(),
                        price = %fill.price,
                        quantity = %fill.quantity,
                        "order filled"
                    );
                    return Ok(ExecutionResult::from_fill(venue_id, fill));
                }
                Err(error) => {
                    warn!(venue = venue_id, symbol = %ticket.symbol, %error, "venue failed, trying next");
                    attempts.push(RouteAttempt {
                        venue: venue_id.to_string(),
                        error,
                    });
                }
            }
        }

        Err(RouteError::Exhausted {
            symbol: ticket.symbol.clone(),
            attempts,
        })
    }

    /// Issues the mirror order that flattens a position, on the venue
    /// that holds it. `side` is the closing side, already inverted.
    ///
    /// # Errors
    ///
    /// Returns the venue's error, or [`VenueError::Unavailable`] when
    /// the venue is no longer configured.
    pub async fn execute_close(
        &self,
        venue_id: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<VenueFill, VenueError> {
        let Some(connector) = self.venue(venue_id) else {
            return Err(VenueError::unavailable(format!(
                "venue {venue_id} not configured"
            )));
        };
        connector.close_order(symbol, side, quantity).await
    }
}

use crate::error::VenueError;
use crate::order::{OrderTicket, VenueFill};
use crate::position::Side;
use crate::signal::{InstrumentFeatures, TradeSignal};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// One external execution venue: an exchange or broker that can fill
/// market orders, report balances, and quote prices.
///
/// Connectors are shared across sessions and stateless per call; the
/// router treats every [`VenueError`] as a reason to try the next
/// connector, never as a reason to fabricate a fill.
#[async_trait]
pub trait VenueConnector: Send + Sync {
    /// Stable identifier recorded on positions filled here.
    fn venue_id(&self) -> &str;

    /// Asset orders are paid for in (e.g. "USDT", "USD").
    fn quote_asset(&self) -> &str;

    /// Smallest notional this venue accepts.
    fn min_notional(&self) -> Decimal;

    /// Places a market order sized by notional.
    async fn place_order(&self, ticket: &OrderTicket) -> Result<VenueFill, VenueError>;

    /// Places the mirror order that flattens an earlier fill: `side` is
    /// the closing side, already inverted by the caller.
    async fn close_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<VenueFill, VenueError>;

    /// Free balance of `asset`. Advisory only: a balance observed here
    /// can be gone by the time the order lands.
    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, VenueError>;

    /// Last traded price for `symbol`.
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, VenueError>;
}

/// Produces a directional decision for one instrument from its feature
/// vector. Pure from the engine's point of view; implementations may
/// cache models or call remote services internally.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_signal(
        &self,
        instrument: &str,
        features: &InstrumentFeatures,
    ) -> Result<TradeSignal>;
}

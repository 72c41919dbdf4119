use chrono::Utc;
use rust_decimal::Decimal;
use sentinel_core::{InstrumentFeatures, Position, SyntheticTicker};
use sentinel_router::OrderRouter;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Closes retained per symbol; enough for the slow momentum window.
const HISTORY_LEN: usize = 64;

/// Rolling close history per symbol, feeding signal features.
#[derive(Debug, Default)]
pub struct PriceHistory {
    closes: HashMap<String, VecDeque<Decimal>>,
}

impl PriceHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, symbol: &str, price: Decimal) {
        let closes = self.closes.entry(symbol.to_string()).or_default();
        if closes.len() == HISTORY_LEN {
            closes.pop_front();
        }
        closes.push_back(price);
    }

    /// Feature vector for `symbol` with `last_price` as the freshest
    /// quote. History may be empty for a symbol never ticked.
    #[must_use]
    pub fn features(&self, symbol: &str, last_price: Decimal) -> InstrumentFeatures {
        let history = self
            .closes
            .get(symbol)
            .map(|closes| closes.iter().copied().collect())
            .unwrap_or_default();
        InstrumentFeatures::new(last_price, history)
    }
}

/// Resolves one price per symbol per tick.
///
/// Positions are marked from the venue that holds them; candidates are
/// quoted by the first router venue able to answer. A position whose
/// venue disappeared from the configuration walks the synthetic ticker
/// anchored at its entry price, so it is still monitored and can still
/// exit. A configured venue that merely fails this tick yields no
/// price: the position keeps its last mark and skips trigger
/// evaluation until the venue answers again.
#[derive(Clone)]
pub struct PriceSource {
    router: Arc<OrderRouter>,
    synth: SyntheticTicker,
}

impl PriceSource {
    #[must_use]
    pub fn new(router: Arc<OrderRouter>, bucket_secs: u64) -> Self {
        Self {
            router,
            synth: SyntheticTicker::new(bucket_secs),
        }
    }

    /// Mark price for an open position, or `None` when it cannot be
    /// resolved this tick.
    pub async fn position_price(&self, position: &Position) -> Option<Decimal> {
        let Some(venue_id) = position.venue.as_deref() else {
            return Some(self.synthetic_price(position));
        };
        let Some(connector) = self.router.venue(venue_id) else {
            return Some(self.synthetic_price(position));
        };
        match connector.fetch_price(&position.symbol).await {
            Ok(price) => Some(price),
            Err(error) => {
                debug!(
                    venue = venue_id,
                    symbol = %position.symbol,
                    %error,
                    "mark price unavailable this tick"
                );
                None
            }
        }
    }

    /// Reference price for a candidate instrument.
    pub async fn candidate_price(&self, symbol: &str) -> Option<Decimal> {
        self.router.fetch_quote(symbol).await
    }

    fn synthetic_price(&self, position: &Position) -> Decimal {
        self.synth
            .price_at(&position.symbol, position.entry_price, Utc::now())
    }
}

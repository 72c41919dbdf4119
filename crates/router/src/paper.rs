//! Built-in paper venue.
//!
//! Paper-mode sessions route through this connector exactly like live
//! sessions route through an exchange: orders settle against the
//! deterministic synthetic ticker, debit and credit a real cash
//! balance, and come back with generated order ids. It is a venue in
//! its own right, never a fallback for a live venue that failed.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sentinel_core::{
    OrderTicket, PaperConfig, Side, SyntheticTicker, VenueConnector, VenueError, VenueFill,
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const MIN_NOTIONAL_USDT: u32 = 10;

/// Connector that fills orders against the synthetic ticker.
///
/// Cash accounting is symmetric: buy fills debit `price x quantity`,
/// sell fills credit it, so a round trip leaves exactly the realized
/// P&L in the balance. The venue keeps no inventory; position
/// bookkeeping stays with the engine.
#[derive(Debug)]
pub struct PaperVenue {
    ticker: SyntheticTicker,
    base_prices: HashMap<String, Decimal>,
    cash: Mutex<Decimal>,
}

impl PaperVenue {
    #[must_use]
    pub fn new(config: &PaperConfig, bucket_secs: u64) -> Self {
        Self {
            ticker: SyntheticTicker::new(bucket_secs),
            base_prices: config.base_prices.clone(),
            cash: Mutex::new(config.starting_balance),
        }
    }

    fn quote(&self, symbol: &str) -> Result<Decimal, VenueError> {
        let anchor = self
            .base_prices
            .get(symbol)
            .ok_or_else(|| VenueError::rejected(format!("no paper market for {symbol}")))?;
        Ok(self.ticker.price_at(symbol, *anchor, Utc::now()))
    }

    fn order_id() -> String {
        format!("paper-{}", Uuid::new_v4())
    }
}

#[async_trait]
impl VenueConnector for PaperVenue {
    fn venue_id(&self) -> &str {
        "paper"
    }

    fn quote_asset(&self) -> &str {
        "USDT"
    }

    fn min_notional(&self) -> Decimal {
        Decimal::from(MIN_NOTIONAL_USDT)
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<VenueFill, VenueError> {
        if ticket.notional < self.min_notional() {
            return Err(VenueError::below_minimum_notional(
                ticket.notional,
                self.min_notional(),
            ));
        }

        let price = self.quote(&ticket.symbol)?;
        let quantity = (ticket.notional / price).round_dp(8);
        let cost = (price * quantity).round_dp(8);

        let mut cash = self.cash.lock().await;
        match ticket.side {
            Side::Buy => {
                if *cash < cost {
                    return Err(VenueError::insufficient_balance(cost, *cash));
                }
                *cash -= cost;
            }
            Side::Sell => *cash += cost,
        }

        let fill = VenueFill {
            order_id: Self::order_id(),
            price,
            quantity,
        };
        info!(
            symbol = %ticket.symbol,
            side = ticket.side.as_str(),
            price = %price,
            quantity = %quantity,
            cash = %*cash,
            "paper order filled"
        );
        Ok(fill)
    }

    async fn close_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<VenueFill, VenueError> {
        let price = self.quote(symbol)?;
        let notional = (price * quantity).round_dp(8);

        // Flattening is never refused; covering a deep-underwater short
        // can drive the balance negative, which is worth a warning.
        let mut cash = self.cash.lock().await;
        match side {
            Side::Buy => *cash -= notional,
            Side::Sell => *cash += notional,
        }
        if cash.is_sign_negative() {
            warn!(symbol, cash = %*cash, "paper balance went negative on close");
        }

        Ok(VenueFill {
            order_id: Self::order_id(),
            price,
            quantity,
        })
    }

    async fn fetch_balance(&self, _asset: &str) -> Result<Decimal, VenueError> {
        Ok(*self.cash.lock().await)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        self.quote(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Hour-wide buckets keep every call of one test in the same price
    // bucket, so entries and exits settle at the same quote.
    fn venue() -> PaperVenue {
        let config = PaperConfig {
            starting_balance: dec!(10000),
            base_prices: HashMap::from([("BTCUSDT".to_string(), dec!(100))]),
        };
        PaperVenue::new(&config, 3600)
    }

    #[tokio::test]
    async fn buy_fill_debits_exactly_the_cost() {
        let venue = venue();
        let fill = venue
            .place_order(&OrderTicket::new("BTCUSDT", Side::Buy, dec!(500)))
            .await
            .unwrap();

        assert!(fill.order_id.starts_with("paper-"));
        // Quote stays inside the ticker's drift clamp around the anchor.
        assert!(fill.price >= dec!(90) && fill.price <= dec!(110));

        let balance = venue.fetch_balance("USDT").await.unwrap();
        assert_eq!(balance, dec!(10000) - (fill.price * fill.quantity).round_dp(8));
    }

    #[tokio::test]
    async fn long_round_trip_restores_the_balance() {
        let venue = venue();
        let fill = venue
            .place_order(&OrderTicket::new("BTCUSDT", Side::Buy, dec!(500)))
            .await
            .unwrap();
        venue
            .close_order("BTCUSDT", Side::Sell, fill.quantity)
            .await
            .unwrap();

        // Same bucket, same price: flat round trip, flat balance.
        assert_eq!(venue.fetch_balance("USDT").await.unwrap(), dec!(10000));
    }

    #[tokio::test]
    async fn short_entry_credits_the_proceeds() {
        let venue = venue();
        let fill = venue
            .place_order(&OrderTicket::new("BTCUSDT", Side::Sell, dec!(500)))
            .await
            .unwrap();

        let balance = venue.fetch_balance("USDT").await.unwrap();
        assert_eq!(balance, dec!(10000) + (fill.price * fill.quantity).round_dp(8));

        venue
            .close_order("BTCUSDT", Side::Buy, fill.quantity)
            .await
            .unwrap();
        assert_eq!(venue.fetch_balance("USDT").await.unwrap(), dec!(10000));
    }

    #[tokio::test]
    async fn insufficient_cash_refuses_the_buy() {
        let config = PaperConfig {
            starting_balance: dec!(100),
            base_prices: HashMap::from([("BTCUSDT".to_string(), dec!(100))]),
        };
        let venue = PaperVenue::new(&config, 3600);

        let err = venue
            .place_order(&OrderTicket::new("BTCUSDT", Side::Buy, dec!(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::InsufficientBalance { .. }));
        assert_eq!(venue.fetch_balance("USDT").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn tiny_notional_is_below_minimum() {
        let err = venue()
            .place_order(&OrderTicket::new("BTCUSDT", Side::Buy, dec!(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::BelowMinimumNotional { .. }));
    }

    #[tokio::test]
    async fn unlisted_symbol_has_no_market() {
        let venue = venue();
        assert!(matches!(
            venue.fetch_price("DOGEUSDT").await.unwrap_err(),
            VenueError::Rejected(_)
        ));
        assert!(matches!(
            venue
                .place_order(&OrderTicket::new("DOGEUSDT", Side::Buy, dec!(500)))
                .await
                .unwrap_err(),
            VenueError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn quotes_are_deterministic_within_a_bucket() {
        let venue = venue();
        let a = venue.fetch_price("BTCUSDT").await.unwrap();
        let b = venue.fetch_price("BTCUSDT").await.unwrap();
        assert_eq!(a, b);
    }
}

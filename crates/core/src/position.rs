use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// The side of the order that flattens a position opened on this side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown position status: {other}")),
        }
    }
}

/// Why a position left the ACTIVE state.
///
/// Variants are ordered by evaluation precedence: stop-loss wins over
/// take-profit on the same tick, and session-level reasons
/// (user stop, risk breach, staleness) close positions regardless of
/// their individual P&L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    UserRequest,
    DailyLossLimit,
    SessionStale,
}

impl ExitReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StopLoss => "STOP_LOSS",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::UserRequest => "USER_REQUEST",
            Self::DailyLossLimit => "DAILY_LOSS_LIMIT",
            Self::SessionStale => "SESSION_STALE",
        }
    }
}

impl std::str::FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOP_LOSS" => Ok(Self::StopLoss),
            "TAKE_PROFIT" => Ok(Self::TakeProfit),
            "USER_REQUEST" => Ok(Self::UserRequest),
            "DAILY_LOSS_LIMIT" => Ok(Self::DailyLossLimit),
            "SESSION_STALE" => Ok(Self::SessionStale),
            other => Err(format!("unknown exit reason: {other}")),
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One open or closed trade within a session.
///
/// Stop-loss and take-profit are fixed at entry. CLOSED positions are
/// never mutated again; `mark_closed` on an already-closed position is
/// a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub session_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub entry_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub status: PositionStatus,
    pub pnl: Decimal,
    pub pnl_pct: f64,
    /// Signal confidence at entry, 0..=1.
    pub confidence: f64,
    /// Venue the entry order filled on; None only for recovered positions
    /// whose venue is no longer configured.
    pub venue: Option<String>,
    pub venue_order_id: Option<String>,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Creates a new ACTIVE position from a filled entry order.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        session_id: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        confidence: f64,
        venue: &str,
        venue_order_id: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price,
            current_price: entry_price,
            stop_loss,
            take_profit,
            entry_time: now,
            last_update: now,
            status: PositionStatus::Active,
            pnl: Decimal::ZERO,
            pnl_pct: 0.0,
            confidence,
            venue: Some(venue.to_string()),
            venue_order_id: Some(venue_order_id.to_string()),
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Unrealized P&L at `price`: quantity x (price - entry) for buys,
    /// quantity x (entry - price) for sells.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Buy => self.quantity * (price - self.entry_price),
            Side::Sell => self.quantity * (self.entry_price - price),
        }
    }

    /// Refreshes the mark-to-market fields from a fresh tick price.
    pub fn update_market(&mut self, price: Decimal, at: DateTime<Utc>) {
        if self.status == PositionStatus::Closed {
            return;
        }
        self.current_price = price;
        self.pnl = self.unrealized_pnl(price);
        self.pnl_pct = pnl_pct(self.pnl, self.entry_price, self.quantity);
        self.last_update = at;
    }

    /// Evaluates the price-driven exit triggers at `price`, stop-loss
    /// before take-profit.
    #[must_use]
    pub fn exit_trigger(&self, price: Decimal) -> Option<ExitReason> {
        match self.side {
            Side::Buy => {
                if price <= self.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if price >= self.take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
            Side::Sell => {
                if price >= self.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if price <= self.take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }

    /// Transitions the position to CLOSED, settling P&L at `exit_price`.
    ///
    /// Returns the realized P&L, or None when the position was already
    /// closed (the transition is idempotent).
    pub fn mark_closed(
        &mut self,
        exit_price: Decimal,
        at: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<Decimal> {
        if self.status == PositionStatus::Closed {
            return None;
        }
        let realized = self.unrealized_pnl(exit_price);
        self.status = PositionStatus::Closed;
        self.current_price = exit_price;
        self.pnl = realized;
        self.pnl_pct = pnl_pct(realized, self.entry_price, self.quantity);
        self.exit_price = Some(exit_price);
        self.exit_time = Some(at);
        self.exit_reason = Some(reason);
        self.last_update = at;
        Some(realized)
    }
}

/// P&L as a percentage of entry notional.
fn pnl_pct(pnl: Decimal, entry_price: Decimal, quantity: Decimal) -> f64 {
    let basis = entry_price * quantity;
    if basis.is_zero() {
        return 0.0;
    }
    (pnl / basis * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_position() -> Position {
        Position::open(
            "sess-1",
            "BTCUSDT",
            Side::Buy,
            dec!(0.5),
            dec!(100),
            dec!(98),
            dec!(104),
            0.8,
            "binance",
            "ord-1",
        )
    }

    #[test]
    fn buy_stop_loss_fires_at_or_below_threshold() {
        let pos = buy_position();
        assert_eq!(pos.exit_trigger(dec!(98)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(97.5)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(98.01)), None);
    }

    #[test]
    fn buy_take_profit_fires_at_or_above_threshold() {
        let pos = buy_position();
        assert_eq!(pos.exit_trigger(dec!(104)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_trigger(dec!(110)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_trigger(dec!(103.99)), None);
    }

    #[test]
    fn sell_triggers_are_mirrored() {
        let mut pos = buy_position();
        pos.side = Side::Sell;
        pos.stop_loss = dec!(102);
        pos.take_profit = dec!(96);
        assert_eq!(pos.exit_trigger(dec!(102.5)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(95.5)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_trigger(dec!(100)), None);
    }

    #[test]
    fn stop_loss_takes_precedence_when_both_would_fire() {
        // Inverted thresholds make both conditions true at once; the
        // stop-loss must win.
        let mut pos = buy_position();
        pos.stop_loss = dec!(105);
        pos.take_profit = dec!(95);
        assert_eq!(pos.exit_trigger(dec!(100)), Some(ExitReason::StopLoss));
    }

    #[test]
    fn unrealized_pnl_by_side() {
        let mut pos = buy_position();
        assert_eq!(pos.unrealized_pnl(dec!(102)), dec!(1.0));
        pos.side = Side::Sell;
        assert_eq!(pos.unrealized_pnl(dec!(102)), dec!(-1.0));
    }

    #[test]
    fn mark_closed_settles_and_is_idempotent() {
        let mut pos = buy_position();
        let realized = pos.mark_closed(dec!(97.5), Utc::now(), ExitReason::StopLoss);
        assert_eq!(realized, Some(dec!(-1.25)));
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.exit_price, Some(dec!(97.5)));
        assert_eq!(pos.exit_reason, Some(ExitReason::StopLoss));
        assert!(pos.exit_time.is_some());

        // Second close must not touch anything.
        let again = pos.mark_closed(dec!(90), Utc::now(), ExitReason::TakeProfit);
        assert_eq!(again, None);
        assert_eq!(pos.exit_price, Some(dec!(97.5)));
        assert_eq!(pos.exit_reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn update_market_refreshes_mark_fields() {
        let mut pos = buy_position();
        pos.update_market(dec!(101), Utc::now());
        assert_eq!(pos.current_price, dec!(101));
        assert_eq!(pos.pnl, dec!(0.5));
        assert!((pos.pnl_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn update_market_ignores_closed_positions() {
        let mut pos = buy_position();
        pos.mark_closed(dec!(97.5), Utc::now(), ExitReason::StopLoss);
        pos.update_market(dec!(120), Utc::now());
        assert_eq!(pos.current_price, dec!(97.5));
    }

    #[test]
    fn side_round_trips_and_mirrors() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert_eq!(Side::Buy.opposite().as_str(), "SELL");
    }

    #[test]
    fn exit_reason_round_trips() {
        for reason in [
            ExitReason::StopLoss,
            ExitReason::TakeProfit,
            ExitReason::UserRequest,
            ExitReason::DailyLossLimit,
            ExitReason::SessionStale,
        ] {
            assert_eq!(reason.as_str().parse::<ExitReason>().unwrap(), reason);
        }
    }
}

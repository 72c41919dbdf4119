use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Execution mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionMode {
    /// Real orders routed across the configured live venues.
    Live,
    /// Orders filled by the deterministic paper venue, no real money.
    #[default]
    Paper,
}

impl SessionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Paper => "PAPER",
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LIVE" => Ok(Self::Live),
            "PAPER" => Ok(Self::Paper),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// Per-user risk limits, snapshotted into the session at start and
/// immutable for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Daily loss limit as a fraction of the initial portfolio value.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,
    /// Per-position notional as a fraction of current portfolio value.
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,
    #[serde(default = "default_max_rounds_per_day")]
    pub max_rounds_per_day: u32,
    /// Default stop-loss offset applied when the signal carries none.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Default take-profit offset applied when the signal carries none.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
}

const fn default_max_daily_loss_pct() -> f64 {
    0.05
}

const fn default_max_concurrent_positions() -> u32 {
    5
}

const fn default_max_position_size_pct() -> f64 {
    0.20
}

const fn default_max_rounds_per_day() -> u32 {
    3
}

const fn default_stop_loss_pct() -> f64 {
    0.02
}

const fn default_take_profit_pct() -> f64 {
    0.04
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_concurrent_positions: default_max_concurrent_positions(),
            max_position_size_pct: default_max_position_size_pct(),
            max_rounds_per_day: default_max_rounds_per_day(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
        }
    }
}

/// One user's trading run: zero or more rounds of positions monitored by
/// a single supervisory loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub stop_reason: Option<String>,
    pub mode: SessionMode,
    pub initial_portfolio: Decimal,
    pub current_portfolio: Decimal,
    /// Cumulative realized P&L. Unrealized P&L lives on the positions.
    pub total_pnl: Decimal,
    /// Number of trading rounds opened, not individual positions.
    pub trades_count: u32,
    pub risk: RiskSettings,
}

impl Session {
    #[must_use]
    pub fn new(
        user_id: &str,
        mode: SessionMode,
        initial_portfolio: Decimal,
        risk: RiskSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
            stop_reason: None,
            mode,
            initial_portfolio,
            current_portfolio: initial_portfolio,
            total_pnl: Decimal::ZERO,
            trades_count: 0,
            risk,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Folds one position's realized P&L into the session totals.
    pub fn apply_realized(&mut self, pnl: Decimal) {
        self.total_pnl += pnl;
        self.current_portfolio += pnl;
    }

    /// Transitions the session to COMPLETED. A no-op when already
    /// completed, so double stops are harmless.
    pub fn complete(&mut self, reason: &str, at: DateTime<Utc>) {
        if self.status == SessionStatus::Completed {
            return;
        }
        self.status = SessionStatus::Completed;
        self.stop_reason = Some(reason.to_string());
        self.end_time = Some(at);
    }

    /// True when the session started more than `window_secs` ago.
    /// Stale ACTIVE sessions are force-closed before a new one starts.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, window_secs: i64) -> bool {
        now.signed_duration_since(self.start_time).num_seconds() > window_secs
    }
}

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sentinel_core::{InstrumentFeatures, SignalAction, SignalProvider, TradeSignal};
use std::cmp::Ordering;

/// Built-in heuristic: fast/slow moving-average crossover over the
/// rolling close history the monitor accumulates per symbol.
///
/// Returns HOLD until the slow window is full, so a freshly started
/// session never trades on thin history.
pub struct MomentumSignalProvider {
    fast_window: usize,
    slow_window: usize,
}

impl MomentumSignalProvider {
    #[must_use]
    pub const fn new(fast_window: usize, slow_window: usize) -> Self {
        Self {
            fast_window,
            slow_window,
        }
    }

    fn mean(prices: &[Decimal]) -> Decimal {
        if prices.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = prices.iter().sum();
        sum / Decimal::from(prices.len())
    }

    /// Confidence grows with the separation between the averages,
    /// floored at 0.5 (a crossover just happened) and capped at 0.95.
    fn confidence(fast: Decimal, slow: Decimal) -> f64 {
        if slow.is_zero() {
            return 0.5;
        }
        let separation = ((fast - slow) / slow).abs().to_f64().unwrap_or(0.0);
        (0.5 + separation * 50.0).min(0.95)
    }
}

impl Default for MomentumSignalProvider {
    fn default() -> Self {
        Self::new(5, 20)
    }
}

#[async_trait]
impl SignalProvider for MomentumSignalProvider {
    fn name(&self) -> &str {
        "momentum"
    }

    async fn get_signal(
        &self,
        _instrument: &str,
        features: &InstrumentFeatures,
    ) -> Result<TradeSignal> {
        let history = &features.history;
        if history.len() < self.slow_window {
            return Ok(TradeSignal::hold());
        }

        let fast = Self::mean(&history[history.len() - self.fast_window..]);
        let slow = Self::mean(&history[history.len() - self.slow_window..]);

        let action = match fast.cmp(&slow) {
            Ordering::Greater => SignalAction::Buy,
            Ordering::Less => SignalAction::Sell,
            Ordering::Equal => return Ok(TradeSignal::hold()),
        };

        Ok(TradeSignal {
            action,
            confidence: Self::confidence(fast, slow),
            stop_loss_pct: None,
            take_profit_pct: None,
        })
    }
}

//! Deterministic synthetic price source.
//!
//! Positions without a live venue ticker (paper fills, or recovered
//! positions whose venue is no longer configured) are still monitored
//! every tick. Their prices come from a synthetic walk that is a pure
//! function of (symbol, time bucket), so a given instant yields the
//! same price in every process. Monitoring stays reproducible in tests
//! and across restarts.

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hard bound on synthetic drift from the anchor price.
const MAX_DRIFT: f64 = 0.10;
/// Peak-to-trough amplitude of the slow trend component.
const TREND_AMPLITUDE: f64 = 0.04;
/// Trend period in buckets; one full cycle per hour at 10 s buckets.
const TREND_PERIOD_BUCKETS: f64 = 360.0;
/// Half-width of the per-bucket noise component.
const NOISE_MAX: f64 = 0.005;

/// Synthetic ticker quoting `anchor x (1 + trend(t) + noise(t))`,
/// clamped to +/-10 % of the anchor.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticTicker {
    bucket_secs: u64,
}

impl SyntheticTicker {
    #[must_use]
    pub const fn new(bucket_secs: u64) -> Self {
        Self { bucket_secs }
    }

    /// Price for `symbol` anchored at `anchor`, at instant `at`.
    /// Identical arguments always produce identical prices.
    #[must_use]
    pub fn price_at(&self, symbol: &str, anchor: Decimal, at: DateTime<Utc>) -> Decimal {
        let bucket = at.timestamp().div_euclid(self.bucket_secs.max(1) as i64);
        let offset = drift(symbol, bucket);
        let factor = Decimal::from_f64(1.0 + offset).unwrap_or(Decimal::ONE);
        (anchor * factor).round_dp(8)
    }
}

impl Default for SyntheticTicker {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Combined trend + noise offset for one (symbol, bucket), clamped to
/// the drift bound.
fn drift(symbol: &str, bucket: i64) -> f64 {
    let phase = (seed_for(symbol, 0) % 628) as f64 / 100.0;
    let trend = TREND_AMPLITUDE
        * ((bucket as f64) * std::f64::consts::TAU / TREND_PERIOD_BUCKETS + phase).sin();

    let mut rng = ChaCha8Rng::seed_from_u64(seed_for(symbol, bucket));
    let noise = rng.gen_range(-NOISE_MAX..NOISE_MAX);

    (trend + noise).clamp(-MAX_DRIFT, MAX_DRIFT)
}

fn seed_for(symbol: &str, bucket: i64) -> u64 {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    bucket.hash(&mut hasher);
    hasher.finish()
}

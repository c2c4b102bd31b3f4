//! Activity normalization
//!
//! This module collapses the six aggregated channel sums of one bucket into
//! a single bounded percent score. The scale is anchored to the highest
//! count the hardware can register, so the score is comparable across
//! interval widths.

use crate::config::BinInterval;
use crate::types::CHANNEL_COUNT;

/// Per-channel weights combining the six channels into one scalar. The
/// sensors weigh equally in the shipped configuration; the table exists so
/// a channel can be re-weighted without touching the formula.
pub const CHANNEL_WEIGHTS: [f64; CHANNEL_COUNT] = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

/// Highest count one channel can register in one minute (the sensors tick
/// at 1 Hz).
pub const MAX_COUNT_PER_MINUTE_PER_CHANNEL: f64 = 60.0;

/// Activity normalizer for the percent score
pub struct ActivityNormalizer;

impl ActivityNormalizer {
    /// Percent score for one bucket's summed channels:
    ///
    /// `100 · Σ(wᵢ · sumᵢ) / (max_per_minute · interval_minutes · Σwᵢ)`
    ///
    /// clamped to [0, 100]. The clamp absorbs rounding and partial edge
    /// buckets that would otherwise nudge past the bound.
    pub fn activity_percent(act_sums: &[f64; CHANNEL_COUNT], interval: BinInterval) -> f64 {
        let weight_total: f64 = CHANNEL_WEIGHTS.iter().sum();
        let weighted: f64 = act_sums
            .iter()
            .zip(CHANNEL_WEIGHTS.iter())
            .map(|(sum, weight)| sum * weight)
            .sum();
        let ceiling = MAX_COUNT_PER_MINUTE_PER_CHANNEL * interval.minutes() as f64 * weight_total;

        (100.0 * weighted / ceiling).clamp(0.0, 100.0)
    }
}

//! Bucket aggregation
//!
//! This module reduces the per-minute rows of one bucket to a single row.
//! The column-to-rule mapping is fixed product behavior, kept as named
//! constants so each rule stays auditable and testable on its own.

use serde::{Deserialize, Serialize};

use crate::types::{BucketKey, ExpandedRecord, CHANNEL_COUNT};

/// Rule applied to the activity channels Act[0]..Act[5]
pub const ACTIVITY_RULE: AggregationRule = AggregationRule::Sum;

/// Rule applied to the environmental columns T, Light, Vbat
pub const ENVIRONMENT_RULE: AggregationRule = AggregationRule::Mean;

/// A reduction over the values present in one bucket column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    Sum,
    /// Note: a mean of already-binned means is only exact when every bucket
    /// has one member; re-aggregation at equal granularity is approximate
    /// for this rule.
    Mean,
    Min,
    Max,
    Last,
}

impl AggregationRule {
    /// Reduce the values that are present. `None` when nothing is present —
    /// a bucket whose members are all missing a column aggregates to a null
    /// cell, never an error.
    pub fn apply(&self, values: impl IntoIterator<Item = f64>) -> Option<f64> {
        let mut count: usize = 0;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut last = 0.0;

        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
            last = value;
        }

        if count == 0 {
            return None;
        }

        Some(match self {
            AggregationRule::Sum => sum,
            AggregationRule::Mean => sum / count as f64,
            AggregationRule::Min => min,
            AggregationRule::Max => max,
            AggregationRule::Last => last,
        })
    }
}

/// One bucket reduced to a single row, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedBucket {
    pub key: BucketKey,
    /// Per-channel result of `ACTIVITY_RULE`
    pub act: [f64; CHANNEL_COUNT],
    pub temperature: Option<f64>,
    pub light: Option<f64>,
    pub battery_voltage: Option<f64>,
    /// Member rows the bucket held
    pub members: usize,
}

/// Aggregator for reducing bucket members to one row
pub struct Aggregator;

impl Aggregator {
    /// Apply the fixed column rules to one bucket's members.
    pub fn aggregate(key: BucketKey, members: &[ExpandedRecord]) -> AggregatedBucket {
        let mut act = [0.0f64; CHANNEL_COUNT];
        for (channel, slot) in act.iter_mut().enumerate() {
            *slot = ACTIVITY_RULE
                .apply(members.iter().map(|m| m.act[channel]))
                .unwrap_or(0.0);
        }

        AggregatedBucket {
            key,
            act,
            temperature: ENVIRONMENT_RULE.apply(members.iter().filter_map(|m| m.temperature)),
            light: ENVIRONMENT_RULE.apply(members.iter().filter_map(|m| m.light)),
            battery_voltage: ENVIRONMENT_RULE
                .apply(members.iter().filter_map(|m| m.battery_voltage)),
            members: members.len(),
        }
    }
}

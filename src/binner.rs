//! Interval binning
//!
//! This module floors expanded minutes onto bucket boundaries and groups
//! them by (dataset, bucket start). Boundaries are aligned to the Unix
//! epoch, so every bucket start is an exact interval multiple regardless of
//! whether the interval divides an hour or a day evenly. Buckets are
//! half-open: a minute landing exactly on a boundary opens the next bucket.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::BinInterval;
use crate::types::{BucketKey, ExpandedRecord};

/// Interval binner for grouping per-minute rows into buckets
pub struct IntervalBinner;

impl IntervalBinner {
    /// Largest interval multiple (counted from the Unix epoch) not after
    /// `t`. Uses the euclidean remainder, so pre-epoch instants floor
    /// toward minus infinity rather than toward zero.
    pub fn floor_to_interval(t: DateTime<Utc>, interval: BinInterval) -> DateTime<Utc> {
        let step_seconds = interval.minutes() * 60;
        let offset = t.timestamp().rem_euclid(step_seconds);
        t - Duration::seconds(offset) - Duration::nanoseconds(t.timestamp_subsec_nanos() as i64)
    }

    /// Group minute rows under their bucket keys. The ordered map's key
    /// order (dataset, then start) is the output order of the whole run.
    pub fn group(
        records: impl IntoIterator<Item = ExpandedRecord>,
        interval: BinInterval,
    ) -> BTreeMap<BucketKey, Vec<ExpandedRecord>> {
        let mut buckets: BTreeMap<BucketKey, Vec<ExpandedRecord>> = BTreeMap::new();
        for record in records {
            let key = BucketKey {
                dataset: record.dataset.clone(),
                start: Self::floor_to_interval(record.minute, interval),
            };
            buckets.entry(key).or_default().push(record);
        }
        buckets
    }
}

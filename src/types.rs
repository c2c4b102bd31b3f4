//! Core types for the binning pipeline
//!
//! This module defines the data structures that flow through each stage of
//! the pipeline: raw records, expanded per-minute records, buckets, and the
//! binned output table with its run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MalformedRecord;

/// Number of activity channels per record (Act[0]..Act[5])
pub const CHANNEL_COUNT: usize = 6;

/// One row of the merged long-format input, activity cells still encoded.
///
/// An activity cell holds either a plain numeric count for the record's whole
/// activity window or a `;`-packed per-minute sequence (`"3;0;2"`). Decoding
/// happens in the channel expander so that a bad cell skips one record
/// instead of failing the read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source subfolder/device identifier
    pub dataset: String,
    /// Record start instant; floored to the whole minute before expansion
    pub timestamp: DateTime<Utc>,
    /// Raw activity cells, one per channel
    pub act: [String; CHANNEL_COUNT],
    /// Temperature reading, copied to every expanded minute
    pub temperature: Option<f64>,
    /// Light reading, copied to every expanded minute
    pub light: Option<f64>,
    /// Battery voltage, copied to every expanded minute
    pub battery_voltage: Option<f64>,
    /// 1-based input line, carried for diagnostics
    pub row: usize,
}

/// One logical minute of one raw record's activity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedRecord {
    pub dataset: String,
    /// Minute-aligned instant
    pub minute: DateTime<Utc>,
    /// Per-channel count for this minute
    pub act: [f64; CHANNEL_COUNT],
    pub temperature: Option<f64>,
    pub light: Option<f64>,
    pub battery_voltage: Option<f64>,
}

/// Aggregation key: buckets never cross dataset boundaries.
///
/// The derived ordering (dataset first, then start) is what the output table
/// is sorted by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub dataset: String,
    /// Interval multiple counted from the Unix epoch, half-open
    /// `[start, start + interval)`
    pub start: DateTime<Utc>,
}

/// One output row per non-empty bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedRecord {
    pub dataset: String,
    pub bucket_start: DateTime<Utc>,
    /// Per-channel aggregate (sum rule)
    pub act: [f64; CHANNEL_COUNT],
    /// Mean temperature over members carrying a value
    pub temperature: Option<f64>,
    /// Mean light over members carrying a value
    pub light: Option<f64>,
    /// Mean battery voltage over members carrying a value
    pub battery_voltage: Option<f64>,
    /// Weighted percent score over all channels, always in [0, 100]
    pub activity_percent: f64,
}

/// The binned output table, sorted by dataset then bucket start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinnedTable {
    pub records: Vec<BinnedRecord>,
}

/// Names of the non-key output columns, in output order. Drives the Graph
/// collaborator's column selection.
pub const VALUE_COLUMNS: [&str; 10] = [
    "Act[0]",
    "Act[1]",
    "Act[2]",
    "Act[3]",
    "Act[4]",
    "Act[5]",
    "T",
    "Light",
    "Vbat",
    "ActivityPercent",
];

impl BinnedTable {
    /// Distinct dataset values, sorted. Drives the Graph collaborator's
    /// dataset selection.
    pub fn datasets(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for record in &self.records {
            if out.last().map(String::as_str) != Some(record.dataset.as_str()) {
                out.push(record.dataset.clone());
            }
        }
        out
    }

    /// Names of the non-key output columns, in output order.
    pub fn value_columns() -> &'static [&'static str] {
        &VALUE_COLUMNS
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One skipped input record, surfaced in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipDiagnostic {
    pub row: usize,
    pub dataset: String,
    pub reason: String,
}

impl From<MalformedRecord> for SkipDiagnostic {
    fn from(err: MalformedRecord) -> Self {
        Self {
            row: err.row,
            dataset: err.dataset,
            reason: err.reason,
        }
    }
}

/// Provenance and counters for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id for this run
    pub run_id: Uuid,
    pub producer: String,
    pub version: String,
    /// Input rows seen (including skipped ones)
    pub records_in: usize,
    /// Input rows skipped as malformed
    pub records_skipped: usize,
    /// Per-minute rows produced by expansion
    pub minutes_expanded: usize,
    /// Non-empty buckets in the output
    pub buckets: usize,
    pub interval_minutes: i64,
    pub computed_at: DateTime<Utc>,
}

/// Result of one binning run: the table plus everything that was skipped.
///
/// Skips ride alongside the table instead of unwinding, so callers can
/// inspect failures without losing an otherwise successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinReport {
    pub table: BinnedTable,
    pub skipped: Vec<SkipDiagnostic>,
    pub summary: RunSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dataset: &str, minute_offset: i64) -> BinnedRecord {
        BinnedRecord {
            dataset: dataset.to_string(),
            bucket_start: DateTime::from_timestamp(minute_offset * 60, 0).unwrap(),
            act: [0.0; CHANNEL_COUNT],
            temperature: None,
            light: None,
            battery_voltage: None,
            activity_percent: 0.0,
        }
    }

    #[test]
    fn test_datasets_are_distinct_and_ordered() {
        let table = BinnedTable {
            records: vec![record("A", 0), record("A", 5), record("B", 0)],
        };
        assert_eq!(table.datasets(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_value_columns_match_output_order() {
        let cols = BinnedTable::value_columns();
        assert_eq!(cols.len(), CHANNEL_COUNT + 4);
        assert_eq!(cols[0], "Act[0]");
        assert_eq!(cols[cols.len() - 1], "ActivityPercent");
    }

    #[test]
    fn test_skip_diagnostic_from_malformed() {
        let err = MalformedRecord {
            row: 7,
            dataset: "A".to_string(),
            reason: "Act[2]: non-numeric value 'x'".to_string(),
        };
        let diag = SkipDiagnostic::from(err);
        assert_eq!(diag.row, 7);
        assert_eq!(diag.dataset, "A");
        assert!(diag.reason.contains("Act[2]"));
    }
}

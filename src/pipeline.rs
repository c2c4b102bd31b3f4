//! Pipeline orchestration
//!
//! This module provides the public API for the binning engine.
//! It runs the full pipeline over one input batch:
//! 1. ChannelExpander - decode activity cells, unroll windows per minute
//! 2. IntervalBinner - floor minutes onto epoch-aligned buckets
//! 3. Aggregator - reduce bucket members with the fixed column rules
//! 4. ActivityNormalizer - weighted percent score per bucket

use std::io::{Read, Write};

use chrono::Utc;
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::binner::IntervalBinner;
use crate::config::BinConfig;
use crate::error::BinError;
use crate::expander::ChannelExpander;
use crate::normalizer::ActivityNormalizer;
use crate::table;
use crate::types::{BinReport, BinnedRecord, BinnedTable, RawRecord, RunSummary, SkipDiagnostic};
use crate::{ACTIBIN_VERSION, PRODUCER_NAME};

/// Bin one batch of raw records.
///
/// Pure over its inputs: undecodable records become skip diagnostics in the
/// report rather than failures, and an empty batch yields an empty, still
/// valid table. Fatal conditions (missing columns, bad intervals) are ruled
/// out earlier, by the reader and the config constructors.
pub fn bin_records(records: &[RawRecord], config: &BinConfig) -> BinReport {
    bin_records_with_status(records, config, |_| {})
}

/// Like [`bin_records`], emitting coarse progress messages for a host UI.
pub fn bin_records_with_status(
    records: &[RawRecord],
    config: &BinConfig,
    mut on_status: impl FnMut(&str),
) -> BinReport {
    // Stage 1: decode and expand each record's activity window
    on_status("Expanding activity channels…");
    let mut skipped: Vec<SkipDiagnostic> = Vec::new();
    let mut minutes = Vec::new();
    for record in records {
        if let Some(trim) = &config.trim {
            if !trim.contains(record.timestamp) {
                continue;
            }
        }
        match ChannelExpander::expand(record, config.allocation) {
            Ok(expansion) => minutes.extend(expansion),
            Err(err) => skipped.push(err.into()),
        }
    }
    let minutes_expanded = minutes.len();

    // Stage 2: group the minutes into buckets
    on_status("Binning…");
    let buckets = IntervalBinner::group(minutes, config.interval);

    // Stages 3 and 4: reduce each bucket and attach its percent score
    on_status("Aggregating…");
    let mut out = Vec::with_capacity(buckets.len());
    for (key, members) in buckets {
        let bucket = Aggregator::aggregate(key, &members);
        let activity_percent = ActivityNormalizer::activity_percent(&bucket.act, config.interval);
        out.push(BinnedRecord {
            dataset: bucket.key.dataset,
            bucket_start: bucket.key.start,
            act: bucket.act,
            temperature: bucket.temperature,
            light: bucket.light,
            battery_voltage: bucket.battery_voltage,
            activity_percent,
        });
    }

    let table = BinnedTable { records: out };
    let summary = RunSummary {
        run_id: Uuid::new_v4(),
        producer: PRODUCER_NAME.to_string(),
        version: ACTIBIN_VERSION.to_string(),
        records_in: records.len(),
        records_skipped: skipped.len(),
        minutes_expanded,
        buckets: table.len(),
        interval_minutes: config.interval.minutes(),
        computed_at: Utc::now(),
    };

    BinReport {
        table,
        skipped,
        summary,
    }
}

/// Stateless processor binding a validated configuration.
///
/// The engine holds no state across invocations; this type only spares
/// callers from re-threading the same parameter object.
pub struct BinProcessor {
    config: BinConfig,
}

impl BinProcessor {
    pub fn new(config: BinConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BinConfig {
        &self.config
    }

    /// Bin an in-memory batch.
    pub fn process(&self, records: &[RawRecord]) -> BinReport {
        bin_records(records, &self.config)
    }

    /// Bin an in-memory batch with progress messages.
    pub fn process_with_status(
        &self,
        records: &[RawRecord],
        on_status: impl FnMut(&str),
    ) -> BinReport {
        bin_records_with_status(records, &self.config, on_status)
    }

    /// End to end: read the merged CSV, bin, write the binned CSV.
    ///
    /// Reader-side skips merge into the report alongside expansion-side
    /// skips, ordered by input row. On a fatal error nothing is written.
    pub fn process_csv<R: Read, W: Write>(&self, input: R, output: W) -> Result<BinReport, BinError> {
        self.process_csv_with_status(input, output, |_| {})
    }

    /// End to end with progress messages.
    pub fn process_csv_with_status<R: Read, W: Write>(
        &self,
        input: R,
        output: W,
        mut on_status: impl FnMut(&str),
    ) -> Result<BinReport, BinError> {
        on_status("Reading data…");
        let raw = table::read_records(input)?;

        let read_skips = raw.skipped.len();
        let mut report = bin_records_with_status(&raw.records, &self.config, &mut on_status);
        if read_skips > 0 {
            report.skipped.extend(raw.skipped);
            report.skipped.sort_by_key(|diag| diag.row);
            report.summary.records_in += read_skips;
            report.summary.records_skipped = report.skipped.len();
        }

        on_status("Writing output…");
        table::write_table(output, &report.table)?;
        Ok(report)
    }
}

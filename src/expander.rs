//! Channel expansion
//!
//! This module decodes the six activity cells of a raw record and unrolls
//! the record's activity window into dense per-minute rows:
//! - scalar cells hold one count for the whole window and are distributed
//!   per the configured allocation policy
//! - `;`-packed cells already carry per-minute counts and stretch the window
//! - environmental fields are copied verbatim onto every expanded minute

use chrono::{DateTime, Duration, Utc};

use crate::config::AllocationPolicy;
use crate::error::MalformedRecord;
use crate::types::{ExpandedRecord, RawRecord, CHANNEL_COUNT};

/// Decoded content of one activity cell.
#[derive(Debug, Clone, PartialEq)]
enum CellValue {
    /// One aggregate count for the record's whole window
    Count(f64),
    /// Packed per-minute counts
    PerMinute(Vec<f64>),
}

/// Channel expander for unrolling raw records into per-minute rows
pub struct ChannelExpander;

impl ChannelExpander {
    /// Decode one record and expand its activity window.
    ///
    /// Returns a finite, restartable iterator with exactly one element per
    /// minute of the window. A cell that decodes to neither a number nor a
    /// packed sequence fails the whole record with `MalformedRecord`.
    pub fn expand(
        record: &RawRecord,
        allocation: AllocationPolicy,
    ) -> Result<MinuteExpansion, MalformedRecord> {
        let mut cells: Vec<CellValue> = Vec::with_capacity(CHANNEL_COUNT);
        for (channel, raw) in record.act.iter().enumerate() {
            let cell = decode_cell(raw).map_err(|reason| MalformedRecord {
                row: record.row,
                dataset: record.dataset.clone(),
                reason: format!("Act[{channel}]: {reason}"),
            })?;
            cells.push(cell);
        }

        let window = window_minutes(&cells);
        let mut per_minute = vec![[0.0f64; CHANNEL_COUNT]; window];
        for (channel, cell) in cells.iter().enumerate() {
            match cell {
                CellValue::PerMinute(seq) => {
                    // shorter sequences are zero-padded to the window
                    for (minute, value) in seq.iter().enumerate() {
                        per_minute[minute][channel] = *value;
                    }
                }
                CellValue::Count(count) => match allocation {
                    AllocationPolicy::UniformSpread => {
                        let share = count / window as f64;
                        for minute in per_minute.iter_mut() {
                            minute[channel] = share;
                        }
                    }
                    AllocationPolicy::FrontLoaded => {
                        per_minute[0][channel] = *count;
                    }
                },
            }
        }

        Ok(MinuteExpansion {
            dataset: record.dataset.clone(),
            start_minute: floor_to_minute(record.timestamp),
            per_minute,
            temperature: record.temperature,
            light: record.light,
            battery_voltage: record.battery_voltage,
            cursor: 0,
        })
    }
}

/// Finite, restartable (cloneable) sequence of one record's expanded minutes.
#[derive(Debug, Clone)]
pub struct MinuteExpansion {
    dataset: String,
    start_minute: DateTime<Utc>,
    per_minute: Vec<[f64; CHANNEL_COUNT]>,
    temperature: Option<f64>,
    light: Option<f64>,
    battery_voltage: Option<f64>,
    cursor: usize,
}

impl MinuteExpansion {
    /// Width of the record's activity window, in minutes
    pub fn window_minutes(&self) -> usize {
        self.per_minute.len()
    }
}

impl Iterator for MinuteExpansion {
    type Item = ExpandedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let act = *self.per_minute.get(self.cursor)?;
        let minute = self.start_minute + Duration::minutes(self.cursor as i64);
        self.cursor += 1;
        Some(ExpandedRecord {
            dataset: self.dataset.clone(),
            minute,
            act,
            temperature: self.temperature,
            light: self.light,
            battery_voltage: self.battery_voltage,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.per_minute.len() - self.cursor;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MinuteExpansion {}

/// Decode a single activity cell. Empty cells are a zero count.
fn decode_cell(raw: &str) -> Result<CellValue, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(CellValue::Count(0.0));
    }

    if trimmed.contains(';') {
        let seq = trimmed
            .split(';')
            .map(|part| parse_count(part.trim()))
            .collect::<Result<Vec<f64>, String>>()?;
        return Ok(CellValue::PerMinute(seq));
    }

    parse_count(trimmed).map(CellValue::Count)
}

fn parse_count(part: &str) -> Result<f64, String> {
    if part.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = part
        .parse()
        .map_err(|_| format!("non-numeric value '{part}'"))?;
    if !value.is_finite() {
        return Err(format!("non-finite value '{part}'"));
    }
    Ok(value)
}

/// Window width: longest packed sequence across the channels, at least one
/// minute.
fn window_minutes(cells: &[CellValue]) -> usize {
    cells
        .iter()
        .map(|cell| match cell {
            CellValue::PerMinute(seq) => seq.len(),
            CellValue::Count(_) => 1,
        })
        .max()
        .unwrap_or(1)
        .max(1)
}

fn floor_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    t - Duration::seconds(secs.rem_euclid(60)) - Duration::nanoseconds(t.timestamp_subsec_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_record(act: [&str; CHANNEL_COUNT]) -> RawRecord {
        RawRecord {
            dataset: "barn-a".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
            act: act.map(str::to_string),
            temperature: Some(21.5),
            light: Some(310.0),
            battery_voltage: Some(3.7),
            row: 2,
        }
    }

    #[test]
    fn test_scalar_record_expands_to_one_minute() {
        let record = make_record(["6", "0", "0", "0", "0", "0"]);
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread)
            .unwrap()
            .collect();

        assert_eq!(minutes.len(), 1);
        assert_eq!(minutes[0].act[0], 6.0);
        assert_eq!(minutes[0].minute, record.timestamp);
    }

    #[test]
    fn test_packed_cell_stretches_window() {
        let record = make_record(["3;0;2", "0", "0", "0", "0", "0"]);
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread)
            .unwrap()
            .collect();

        assert_eq!(minutes.len(), 3);
        assert_eq!(minutes[0].act[0], 3.0);
        assert_eq!(minutes[1].act[0], 0.0);
        assert_eq!(minutes[2].act[0], 2.0);
        assert_eq!(
            minutes[2].minute,
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 2, 0).unwrap()
        );
    }

    #[test]
    fn test_uniform_spread_divides_scalar_across_window() {
        // channel 1's packed length sets a 2-minute window; channel 0's
        // scalar 6 is split 3 + 3
        let record = make_record(["6", "0;0", "0", "0", "0", "0"]);
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread)
            .unwrap()
            .collect();

        assert_eq!(minutes.len(), 2);
        assert_eq!(minutes[0].act[0], 3.0);
        assert_eq!(minutes[1].act[0], 3.0);
    }

    #[test]
    fn test_front_loaded_puts_scalar_on_first_minute() {
        let record = make_record(["6", "0;0", "0", "0", "0", "0"]);
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::FrontLoaded)
            .unwrap()
            .collect();

        assert_eq!(minutes.len(), 2);
        assert_eq!(minutes[0].act[0], 6.0);
        assert_eq!(minutes[1].act[0], 0.0);
    }

    #[test]
    fn test_both_policies_conserve_totals() {
        let record = make_record(["7", "1;2;4", "5", "0", "0", "0"]);
        for policy in [AllocationPolicy::UniformSpread, AllocationPolicy::FrontLoaded] {
            let minutes: Vec<_> = ChannelExpander::expand(&record, policy).unwrap().collect();
            let total: f64 = minutes.iter().map(|m| m.act.iter().sum::<f64>()).sum();
            assert!((total - 19.0).abs() < 1e-9, "policy {policy:?}: {total}");
        }
    }

    #[test]
    fn test_environmental_fields_copied_to_every_minute() {
        let record = make_record(["0;0;0;0", "0", "0", "0", "0", "0"]);
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread)
            .unwrap()
            .collect();

        assert_eq!(minutes.len(), 4);
        for minute in &minutes {
            assert_eq!(minute.temperature, Some(21.5));
            assert_eq!(minute.light, Some(310.0));
            assert_eq!(minute.battery_voltage, Some(3.7));
        }
    }

    #[test]
    fn test_empty_cell_is_zero_count() {
        let record = make_record(["", "2", "", "", "", ""]);
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::FrontLoaded)
            .unwrap()
            .collect();
        assert_eq!(minutes[0].act[0], 0.0);
        assert_eq!(minutes[0].act[1], 2.0);
    }

    #[test]
    fn test_non_numeric_cell_is_malformed() {
        let record = make_record(["1", "0", "x9", "0", "0", "0"]);
        let err = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread).unwrap_err();
        assert_eq!(err.row, 2);
        assert_eq!(err.dataset, "barn-a");
        assert!(err.reason.contains("Act[2]"));
    }

    #[test]
    fn test_seconds_floor_to_the_minute() {
        let mut record = make_record(["1", "0", "0", "0", "0", "0"]);
        record.timestamp = Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 45).unwrap();
        let minutes: Vec<_> = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread)
            .unwrap()
            .collect();
        assert_eq!(
            minutes[0].minute,
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_expansion_is_restartable() {
        let record = make_record(["1;2", "0", "0", "0", "0", "0"]);
        let expansion = ChannelExpander::expand(&record, AllocationPolicy::UniformSpread).unwrap();
        assert_eq!(expansion.len(), 2);

        let first: Vec<_> = expansion.clone().collect();
        let second: Vec<_> = expansion.collect();
        assert_eq!(first, second);
    }
}

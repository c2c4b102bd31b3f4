//! Long-format CSV input and binned CSV output
//!
//! The reader maps required columns by header name (order irrelevant, extra
//! columns ignored) and turns undecodable rows into skip diagnostics instead
//! of failures. The writer renders the whole table into memory first, so a
//! failed run never leaves a partial output file behind.

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use std::io::{Read, Write};

use crate::error::BinError;
use crate::types::{BinnedTable, RawRecord, SkipDiagnostic, CHANNEL_COUNT};

/// Header of the binned output file, in column order.
pub const OUTPUT_HEADER: [&str; 12] = [
    "Dataset",
    "BucketStart",
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

/// Accepted names for the time column, in preference order. `Time` is the
/// header the desktop tool's merge step writes; `BucketStart` lets the
/// engine re-read its own output.
const TIME_COLUMNS: [&str; 3] = ["Timestamp", "Time", "BucketStart"];

/// Raw records plus the rows the reader had to skip.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkipDiagnostic>,
}

/// Resolved indices of the required input columns.
struct ColumnMap {
    dataset: usize,
    time: usize,
    act: [usize; CHANNEL_COUNT],
    temperature: usize,
    light: usize,
    vbat: usize,
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, BinError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require =
            |name: &str| find(name).ok_or_else(|| BinError::MissingColumn(name.to_string()));

        let time = TIME_COLUMNS
            .iter()
            .find_map(|name| find(name))
            .ok_or_else(|| BinError::MissingColumn(TIME_COLUMNS[0].to_string()))?;

        let mut act = [0usize; CHANNEL_COUNT];
        for (channel, slot) in act.iter_mut().enumerate() {
            *slot = require(&format!("Act[{channel}]"))?;
        }

        Ok(Self {
            dataset: require("Dataset")?,
            time,
            act,
            temperature: require("T")?,
            light: require("Light")?,
            vbat: require("Vbat")?,
        })
    }

    /// Highest index a row must reach to contain every required cell
    fn max_index(&self) -> usize {
        let mut max = self.dataset.max(self.time);
        max = max.max(self.temperature).max(self.light).max(self.vbat);
        for idx in self.act {
            max = max.max(idx);
        }
        max
    }
}

/// Read the merged long-format table. A missing required column is fatal
/// before any row is processed; an undecodable row is skipped and reported.
pub fn read_records<R: Read>(reader: R) -> Result<RawTable, BinError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnMap::resolve(csv_reader.headers()?)?;
    let max_index = columns.max_index();

    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2);
        let dataset = row.get(columns.dataset).unwrap_or("").trim().to_string();

        if row.len() <= max_index {
            skipped.push(SkipDiagnostic {
                row: line,
                dataset,
                reason: format!(
                    "truncated row: {} fields, expected at least {}",
                    row.len(),
                    max_index + 1
                ),
            });
            continue;
        }

        let raw_time = row.get(columns.time).unwrap_or("");
        let Some(timestamp) = parse_timestamp(raw_time) else {
            skipped.push(SkipDiagnostic {
                row: line,
                dataset,
                reason: format!("Timestamp: unparsable value '{}'", raw_time.trim()),
            });
            continue;
        };

        let environment = [
            (columns.temperature, "T"),
            (columns.light, "Light"),
            (columns.vbat, "Vbat"),
        ]
        .map(|(idx, name)| parse_environment(row.get(idx).unwrap_or(""), name));

        if let Some(reason) = environment.iter().find_map(|r| r.as_ref().err()) {
            skipped.push(SkipDiagnostic {
                row: line,
                dataset,
                reason: reason.clone(),
            });
            continue;
        }
        let [temperature, light, battery_voltage] =
            environment.map(|r| r.unwrap_or_default());

        records.push(RawRecord {
            dataset,
            timestamp,
            act: columns
                .act
                .map(|idx| row.get(idx).unwrap_or("").to_string()),
            temperature,
            light,
            battery_voltage,
            row: line,
        });
    }

    Ok(RawTable { records, skipped })
}

/// Render the binned table to CSV bytes, header included.
pub fn render_csv(table: &BinnedTable) -> Result<Vec<u8>, BinError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(OUTPUT_HEADER)?;

    for record in &table.records {
        let mut row: Vec<String> = Vec::with_capacity(OUTPUT_HEADER.len());
        row.push(record.dataset.clone());
        row.push(format_timestamp(record.bucket_start));
        for value in &record.act {
            row.push(value.to_string());
        }
        row.push(optional_cell(record.temperature));
        row.push(optional_cell(record.light));
        row.push(optional_cell(record.battery_voltage));
        row.push(record.activity_percent.to_string());
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| BinError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

/// Write the binned table in one shot: fully rendered, then one write.
pub fn write_table<W: Write>(mut writer: W, table: &BinnedTable) -> Result<(), BinError> {
    let bytes = render_csv(table)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Parse an input timestamp: RFC 3339, or bare ISO-8601 taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(t.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(t.and_utc());
        }
    }
    None
}

/// Canonical output timestamp form; round-trips through `parse_timestamp`.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_environment(cell: &str, name: &str) -> Result<Option<f64>, String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| format!("{name}: non-numeric value '{trimmed}'"))
}

fn optional_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BinnedRecord;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const WELL_FORMED: &str = "\
Dataset,Timestamp,Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light,Vbat
barn-a,2024-03-10T00:00:00Z,6,0,0,0,0,0,21.5,310,3.7
barn-a,2024-03-10T00:02:00Z,3;3,0,0,0,0,0,21.6,305,3.7
";

    #[test]
    fn test_read_well_formed_input() {
        let table = read_records(WELL_FORMED.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.skipped.len(), 0);

        let first = &table.records[0];
        assert_eq!(first.dataset, "barn-a");
        assert_eq!(
            first.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(first.act[0], "6");
        assert_eq!(first.temperature, Some(21.5));
        assert_eq!(first.row, 2);
        assert_eq!(table.records[1].act[0], "3;3");
    }

    #[test]
    fn test_column_order_is_irrelevant_and_extras_ignored() {
        let input = "\
Vbat,Act[5],Act[4],Act[3],Act[2],Act[1],Act[0],Light,T,Notes,Timestamp,Dataset
3.7,5,4,3,2,1,0,310,21.5,checked,2024-03-10T00:00:00Z,barn-a
";
        let table = read_records(input.as_bytes()).unwrap();
        let record = &table.records[0];
        assert_eq!(record.dataset, "barn-a");
        assert_eq!(record.act, ["0", "1", "2", "3", "4", "5"].map(str::to_string));
        assert_eq!(record.battery_voltage, Some(3.7));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let input = "Dataset,Timestamp,Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light\na,2024-01-01T00:00:00Z,0,0,0,0,0,0,1,2\n";
        let err = read_records(input.as_bytes()).unwrap_err();
        match err {
            BinError::MissingColumn(name) => assert_eq!(name, "Vbat"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_time_column_aliases() {
        for alias in ["Timestamp", "Time", "BucketStart"] {
            let input = format!(
                "Dataset,{alias},Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light,Vbat\na,2024-01-01T00:00:00Z,0,0,0,0,0,0,,,\n"
            );
            let table = read_records(input.as_bytes()).unwrap();
            assert_eq!(table.records.len(), 1, "alias {alias}");
        }
    }

    #[test]
    fn test_timestamp_formats() {
        let cases = [
            "2024-03-10T06:30:00Z",
            "2024-03-10T06:30:00+00:00",
            "2024-03-10T06:30:00",
            "2024-03-10 06:30:00",
            "2024-03-10T06:30:00.250",
            "2024-03-10 06:30",
        ];
        for case in cases {
            let parsed = parse_timestamp(case).unwrap_or_else(|| panic!("failed on '{case}'"));
            assert_eq!(
                parsed.date_naive(),
                chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
            );
        }
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_unparsable_timestamp_skips_row() {
        let input = "\
Dataset,Timestamp,Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light,Vbat
a,2024-03-10T00:00:00Z,1,0,0,0,0,0,,,
a,not-a-time,1,0,0,0,0,0,,,
";
        let table = read_records(input.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.skipped.len(), 1);
        assert_eq!(table.skipped[0].row, 3);
        assert!(table.skipped[0].reason.contains("not-a-time"));
    }

    #[test]
    fn test_empty_environment_cell_is_null_but_garbage_skips() {
        let input = "\
Dataset,Timestamp,Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light,Vbat
a,2024-03-10T00:00:00Z,1,0,0,0,0,0,,310,3.7
a,2024-03-10T00:01:00Z,1,0,0,0,0,0,warm,310,3.7
";
        let table = read_records(input.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].temperature, None);
        assert_eq!(table.skipped.len(), 1);
        assert!(table.skipped[0].reason.contains("T:"));
    }

    #[test]
    fn test_truncated_row_skips() {
        let input = "\
Dataset,Timestamp,Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light,Vbat
a,2024-03-10T00:00:00Z,1,0,0
";
        let table = read_records(input.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 0);
        assert_eq!(table.skipped.len(), 1);
        assert!(table.skipped[0].reason.contains("truncated"));
    }

    #[test]
    fn test_render_exact_output() {
        let table = BinnedTable {
            records: vec![BinnedRecord {
                dataset: "barn-a".to_string(),
                bucket_start: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
                act: [6.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                temperature: Some(21.5),
                light: None,
                battery_voltage: Some(3.7),
                activity_percent: 0.5,
            }],
        };
        let rendered = String::from_utf8(render_csv(&table).unwrap()).unwrap();
        assert_eq!(
            rendered,
            "Dataset,BucketStart,Act[0],Act[1],Act[2],Act[3],Act[4],Act[5],T,Light,Vbat,ActivityPercent\n\
             barn-a,2024-03-10T00:00:00Z,6,0,0,0,0,0,21.5,,3.7,0.5\n"
        );
    }

    #[test]
    fn test_empty_table_renders_header_only() {
        let rendered = String::from_utf8(render_csv(&BinnedTable::default()).unwrap()).unwrap();
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.starts_with("Dataset,BucketStart,"));
    }

    #[test]
    fn test_output_round_trips_through_reader() {
        let table = BinnedTable {
            records: vec![BinnedRecord {
                dataset: "barn-a".to_string(),
                bucket_start: Utc.with_ymd_and_hms(2024, 3, 10, 0, 5, 0).unwrap(),
                act: [1.5, 0.0, 2.0, 0.0, 0.0, 0.0],
                temperature: Some(20.0),
                light: Some(300.0),
                battery_voltage: None,
                activity_percent: 1.0,
            }],
        };
        let rendered = render_csv(&table).unwrap();
        let reread = read_records(rendered.as_slice()).unwrap();

        assert_eq!(reread.skipped.len(), 0);
        assert_eq!(reread.records.len(), 1);
        let record = &reread.records[0];
        assert_eq!(record.dataset, "barn-a");
        assert_eq!(record.timestamp, table.records[0].bucket_start);
        assert_eq!(record.act[0], "1.5");
        assert_eq!(record.battery_voltage, None);
    }
}

//! Actibin - compute engine for binning animal-activity sensor telemetry
//!
//! Actibin transforms the merged long-format table produced by the desktop
//! tool's merge step into a fixed-interval binned table through a
//! deterministic pipeline: channel expansion → interval binning →
//! aggregation → activity normalization.
//!
//! ## Modules
//!
//! - **expander**: decode activity cells, unroll records into per-minute rows
//! - **binner**: epoch-aligned bucket flooring and grouping
//! - **aggregator**: fixed per-column aggregation rules
//! - **normalizer**: bounded percent activity score
//! - **pipeline**: orchestration and the skip-and-report run result
//! - **table**: long-format CSV input, binned CSV output

pub mod aggregator;
pub mod binner;
pub mod config;
pub mod error;
pub mod expander;
pub mod normalizer;
pub mod pipeline;
pub mod table;
pub mod types;

pub use config::{AllocationPolicy, BinConfig, BinInterval, TimeRange};
pub use error::{BinError, MalformedRecord};
pub use pipeline::{bin_records, bin_records_with_status, BinProcessor};
pub use types::{BinReport, BinnedRecord, BinnedTable, RawRecord, RunSummary, SkipDiagnostic};

/// Engine version embedded in all run summaries
pub const ACTIBIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run summaries
pub const PRODUCER_NAME: &str = "actibin";

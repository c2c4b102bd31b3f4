//! Binning parameters
//!
//! The core consumes an explicit parameter object: the bucket interval, the
//! scalar-count allocation policy, and an optional time-range trim. The
//! aggregation rules and normalization weights are fixed constants and live
//! with their components (`aggregator`, `normalizer`).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BinError;

/// How a scalar whole-window activity count is distributed across the
/// minutes of a record's window.
///
/// Both policies conserve the total count; they differ in which bucket the
/// count lands in when a window straddles a bucket boundary. There is no
/// default — callers must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum AllocationPolicy {
    /// Divide the count evenly across the window
    UniformSpread,
    /// Assign the full count to the first minute, zero to the rest
    FrontLoaded,
}

/// Validated bucket width, stored in whole minutes. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct BinInterval {
    minutes: i64,
}

impl BinInterval {
    /// Build an interval from a minute count. Zero or negative is
    /// `InvalidInterval`.
    pub fn from_minutes(minutes: i64) -> Result<Self, BinError> {
        if minutes <= 0 {
            return Err(BinError::InvalidInterval(format!(
                "interval must be positive, got {minutes} minutes"
            )));
        }
        Ok(Self { minutes })
    }

    /// Parse interval strings as the desktop tool phrases them:
    /// `"15 minutes"`, `"1 hour"`, `"2 days"`. A bare number is taken as
    /// minutes; `min`/`h`/`d` abbreviations are accepted.
    pub fn parse(text: &str) -> Result<Self, BinError> {
        let trimmed = text.trim();
        let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
        let value: i64 = digits.parse().map_err(|_| {
            BinError::InvalidInterval(format!(
                "'{trimmed}': expected a number like '15 minutes'"
            ))
        })?;

        let unit = trimmed[digits.len()..].trim().to_ascii_lowercase();
        let per_unit = match unit.as_str() {
            "" | "m" | "min" | "mins" | "minute" | "minutes" => 1,
            "h" | "hour" | "hours" => 60,
            "d" | "day" | "days" => 1440,
            other => {
                return Err(BinError::InvalidInterval(format!(
                    "'{trimmed}': unknown unit '{other}'"
                )))
            }
        };

        let minutes = value.checked_mul(per_unit).ok_or_else(|| {
            BinError::InvalidInterval(format!("'{trimmed}': interval out of range"))
        })?;
        Self::from_minutes(minutes)
    }

    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }
}

impl TryFrom<i64> for BinInterval {
    type Error = String;

    fn try_from(minutes: i64) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes).map_err(|e| e.to_string())
    }
}

impl From<BinInterval> for i64 {
    fn from(interval: BinInterval) -> Self {
        interval.minutes
    }
}

/// Inclusive time bounds applied to raw records before expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Parameter object consumed by the binning core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinConfig {
    /// Bucket width
    pub interval: BinInterval,
    /// Scalar-count allocation policy
    pub allocation: AllocationPolicy,
    /// Optional inclusive trim applied to raw record timestamps
    pub trim: Option<TimeRange>,
}

impl BinConfig {
    pub fn new(interval: BinInterval, allocation: AllocationPolicy) -> Self {
        Self {
            interval,
            allocation,
            trim: None,
        }
    }

    pub fn with_trim(mut self, trim: TimeRange) -> Self {
        self.trim = Some(trim);
        self
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

// ==============================================================================
// RANGE AND GRAIN
// ==============================================================================

/// Chart range picked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "6m")]
    Last6Months,
    #[serde(rename = "1y")]
    LastYear,
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Last24Hours => "24h",
            TimeRange::Last7Days => "7d",
            TimeRange::Last30Days => "30d",
            TimeRange::Last90Days => "90d",
            TimeRange::Last6Months => "6m",
            TimeRange::LastYear => "1y",
            TimeRange::All => "all",
        }
    }

    /// Concrete `[start, end)` window ending at `now`. `All` starts at
    /// midnight UTC of `epoch`.
    pub fn resolve(&self, now: DateTime<Utc>, epoch: NaiveDate) -> Result<TimeWindow, DashboardError> {
        let start = match self {
            TimeRange::Last24Hours => now - Duration::days(1),
            TimeRange::Last7Days => now - Duration::days(7),
            TimeRange::Last30Days => now - Duration::days(30),
            TimeRange::Last90Days => now - Duration::days(90),
            TimeRange::Last6Months => months_before(now, 6)?,
            TimeRange::LastYear => months_before(now, 12)?,
            TimeRange::All => epoch
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .ok_or_else(|| DashboardError::InvalidRange(format!("Invalid epoch {}", epoch)))?,
        };

        Ok(TimeWindow { start, end: now })
    }

    pub fn grain(&self) -> Grain {
        match self {
            TimeRange::Last90Days | TimeRange::Last6Months | TimeRange::LastYear | TimeRange::All => {
                Grain::Month
            }
            TimeRange::Last24Hours | TimeRange::Last7Days | TimeRange::Last30Days => Grain::Day,
        }
    }
}

fn months_before(now: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>, DashboardError> {
    now.checked_sub_months(Months::new(months))
        .ok_or_else(|| DashboardError::InvalidRange(format!("Cannot go back {} months from {}", months, now)))
}

impl FromStr for TimeRange {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(TimeRange::Last24Hours),
            "7d" => Ok(TimeRange::Last7Days),
            "30d" => Ok(TimeRange::Last30Days),
            "90d" => Ok(TimeRange::Last90Days),
            "6m" => Ok(TimeRange::Last6Months),
            "1y" => Ok(TimeRange::LastYear),
            "all" => Ok(TimeRange::All),
            other => Err(DashboardError::InvalidRange(format!(
                "Unknown range '{}', expected one of 24h, 7d, 30d, 90d, 6m, 1y, all",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grain {
    Day,
    Month,
}

impl Grain {
    /// First day of the bucket the timestamp falls into.
    pub fn truncate(&self, at: DateTime<Utc>) -> NaiveDate {
        let date = at.date_naive();
        match self {
            Grain::Day => date,
            Grain::Month => date.with_day(1).unwrap_or(date),
        }
    }

    pub fn label(&self, bucket: NaiveDate) -> String {
        match self {
            Grain::Day => bucket.format("%d/%m").to_string(),
            Grain::Month => bucket.format("%b %Y").to_string(),
        }
    }
}

// ==============================================================================
// RECORDS AND BUCKETS
// ==============================================================================

/// Tables the dashboard reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Patients,
    Doctors,
    Hospitals,
    Subscriptions,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Patients => "patients",
            EntityKind::Doctors => "doctors",
            EntityKind::Hospitals => "hospitals",
            EntityKind::Subscriptions => "subscriptions",
        }
    }

    /// Columns to select; only subscriptions carry an amount.
    pub fn columns(&self) -> &'static str {
        match self {
            EntityKind::Subscriptions => "created_at,amount",
            _ => "created_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedRecord {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl TimestampedRecord {
    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self { created_at, amount: None }
    }

    pub fn with_amount(created_at: DateTime<Utc>, amount: f64) -> Self {
        Self { created_at, amount: Some(amount) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthBucket {
    pub label: String,
    pub patients: u64,
    pub doctors: u64,
    pub hospitals: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBucket {
    pub label: String,
    pub revenue: f64,
}

/// Chart payload: buckets in chronological order plus what produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSeries<T> {
    pub range: TimeRange,
    pub grain: Grain,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub buckets: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub range: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("{0}")]
    InvalidRange(String),

    #[error("Dashboard data unavailable: {0}")]
    Source(String),

    #[error("Dashboard data source is not configured")]
    Unconfigured,
}

impl DashboardError {
    pub fn unavailable(context: &str, err: anyhow::Error) -> Self {
        error!("{}: {:#}", context, err);
        DashboardError::Source(context.to_string())
    }
}

impl From<DashboardError> for shared_models::AppError {
    fn from(err: DashboardError) -> Self {
        match err {
            DashboardError::InvalidRange(msg) => shared_models::AppError::BadRequest(msg),
            DashboardError::Source(msg) => shared_models::AppError::Database(msg),
            DashboardError::Unconfigured => {
                shared_models::AppError::Internal(DashboardError::Unconfigured.to_string())
            }
        }
    }
}

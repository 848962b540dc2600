use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

pub const MIN_SLOT_DURATION: i32 = 5;
pub const MAX_SLOT_DURATION: i32 = 120;
pub const SLOT_DURATION_STEP: i32 = 5;

/// Day of the week as stored: 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(0);
    pub const MONDAY: DayOfWeek = DayOfWeek(1);
    pub const TUESDAY: DayOfWeek = DayOfWeek(2);
    pub const WEDNESDAY: DayOfWeek = DayOfWeek(3);
    pub const THURSDAY: DayOfWeek = DayOfWeek(4);
    pub const FRIDAY: DayOfWeek = DayOfWeek(5);
    pub const SATURDAY: DayOfWeek = DayOfWeek(6);

    pub fn from_weekday(weekday: Weekday) -> Self {
        DayOfWeek(weekday.num_days_from_sunday() as u8)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::from_weekday(date.weekday())
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "Sunday",
            1 => "Monday",
            2 => "Tuesday",
            3 => "Wednesday",
            4 => "Thursday",
            5 => "Friday",
            _ => "Saturday",
        }
    }
}

impl TryFrom<i32> for DayOfWeek {
    type Error = AvailabilityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (0..=6).contains(&value) {
            Ok(DayOfWeek(value as u8))
        } else {
            Err(AvailabilityError::Validation(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ))
        }
    }
}

impl From<DayOfWeek> for i32 {
    fn from(day: DayOfWeek) -> Self {
        day.0 as i32
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `HH:MM` on output; `HH:MM` and `HH:MM:SS` accepted on input since Postgres
/// `time` columns come back with seconds.
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid time of day: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    pub slot_duration: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn rule(&self) -> AvailabilityRule {
        AvailabilityRule {
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            slot_duration: self.slot_duration,
            is_active: self.is_active,
        }
    }
}

/// The editable part of a window. Create, edit and bulk application all write
/// a full rule; nothing is patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub day_of_week: DayOfWeek,
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    pub slot_duration: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    #[serde(alias = "full_name")]
    pub name: String,
    #[serde(alias = "specialty")]
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableSlot {
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
}

/// One doctor's outcome inside a bulk rule application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleApplication {
    #[serde(flatten)]
    pub window: AvailabilityWindow,
    /// True when an existing window for the day was overwritten.
    pub replaced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateReport {
    pub affected: usize,
    pub results: Vec<RuleApplication>,
}

// Request DTOs. Times arrive as strings and are parsed by the rule engine so
// a malformed value becomes a validation error rather than a body rejection.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertAvailabilityRequest {
    pub id: Option<Uuid>,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration: i32,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSlotDurationRequest {
    pub slot_duration: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAvailabilityRequest {
    pub doctor_ids: Vec<Uuid>,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration: i32,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAvailabilityQuery {
    pub confirm: Option<bool>,
}

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Availability storage failed: {0}")]
    Persistence(String),
}

impl AvailabilityError {
    /// Storage failures are logged here, at the boundary, and surfaced as a
    /// generic failure. Nothing is retried.
    pub fn persistence(context: &str, err: anyhow::Error) -> Self {
        error!("{}: {:#}", context, err);
        AvailabilityError::Persistence(context.to_string())
    }
}

impl From<AvailabilityError> for shared_models::AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation(msg) => shared_models::AppError::ValidationError(msg),
            AvailabilityError::Conflict(msg) => shared_models::AppError::Conflict(msg),
            AvailabilityError::NotFound(msg) => shared_models::AppError::NotFound(msg),
            AvailabilityError::Persistence(msg) => shared_models::AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_day_of_week_serializes_as_integer() {
        assert_eq!(serde_json::to_value(DayOfWeek::MONDAY).unwrap(), json!(1));
        let day: DayOfWeek = serde_json::from_value(json!(6)).unwrap();
        assert_eq!(day, DayOfWeek::SATURDAY);
        assert!(serde_json::from_value::<DayOfWeek>(json!(7)).is_err());
    }

    #[test]
    fn test_day_of_week_from_date() {
        // 2024-06-02 was a Sunday
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(DayOfWeek::from_date(sunday), DayOfWeek::SUNDAY);
        assert_eq!(DayOfWeek::from_date(sunday.succ_opt().unwrap()), DayOfWeek::MONDAY);
    }

    #[test]
    fn test_window_accepts_postgres_time_format() {
        let window: AvailabilityWindow = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "doctor_id": Uuid::nil(),
            "day_of_week": 2,
            "start_time": "09:00:00",
            "end_time": "12:30",
            "slot_duration": 30,
            "is_active": true,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(window.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(window.end_time, NaiveTime::from_hms_opt(12, 30, 0).unwrap());
        assert_eq!(serde_json::to_value(&window).unwrap()["start_time"], "09:00");
    }

    #[test]
    fn test_doctor_accepts_storage_column_names() {
        let doctor: Doctor = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "full_name": "Dr. Ada Okafor",
            "specialty": "Cardiology"
        }))
        .unwrap();

        assert_eq!(doctor.name, "Dr. Ada Okafor");
        assert_eq!(doctor.specialization.as_deref(), Some("Cardiology"));
    }
}

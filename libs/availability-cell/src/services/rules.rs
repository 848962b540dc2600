use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;

use crate::models::{
    time_of_day, AvailabilityError, AvailabilityRule, AvailabilityWindow, AvailableSlot,
    DayOfWeek, MAX_SLOT_DURATION, MIN_SLOT_DURATION, SLOT_DURATION_STEP,
};

pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, AvailabilityError> {
    time_of_day::parse(raw).ok_or_else(|| {
        AvailabilityError::Validation(format!("Invalid time '{}', expected HH:MM", raw))
    })
}

/// True iff `end` is strictly later than `start` on the same day. Overnight
/// windows are never valid.
pub fn validate_window(start: NaiveTime, end: NaiveTime) -> bool {
    end > start
}

/// Only the bounds are enforced. The step of [`SLOT_DURATION_STEP`] is what
/// the dashboard offers, not a server-side rule.
pub fn validate_slot_duration(slot_duration: i32) -> Result<(), AvailabilityError> {
    if (MIN_SLOT_DURATION..=MAX_SLOT_DURATION).contains(&slot_duration) {
        if slot_duration % SLOT_DURATION_STEP != 0 {
            debug!("Slot duration {} is off the {}-minute step", slot_duration, SLOT_DURATION_STEP);
        }
        Ok(())
    } else {
        Err(AvailabilityError::Validation(format!(
            "Slot duration must be between {} and {} minutes",
            MIN_SLOT_DURATION, MAX_SLOT_DURATION
        )))
    }
}

impl AvailabilityRule {
    /// Build a rule from raw request values, validating every field.
    pub fn parse(
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
        slot_duration: i32,
        is_active: bool,
    ) -> Result<Self, AvailabilityError> {
        let rule = AvailabilityRule {
            day_of_week: DayOfWeek::try_from(day_of_week)?,
            start_time: parse_time_of_day(start_time)?,
            end_time: parse_time_of_day(end_time)?,
            slot_duration,
            is_active,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if !validate_window(self.start_time, self.end_time) {
            return Err(AvailabilityError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }
        validate_slot_duration(self.slot_duration)
    }
}

/// Expand a start/end range into back-to-back slots. A trailing remainder
/// shorter than one slot is dropped.
pub fn slots_between(start: NaiveTime, end: NaiveTime, slot_duration: i32) -> Vec<AvailableSlot> {
    let mut slots = Vec::new();
    if slot_duration <= 0 || !validate_window(start, end) {
        return slots;
    }

    let step = Duration::minutes(slot_duration as i64);
    let mut current = start;

    loop {
        // overflowing_add_signed wraps at midnight; a non-zero wrap means the
        // slot would spill into the next day.
        let (slot_end, wrapped) = current.overflowing_add_signed(step);
        if wrapped != 0 || slot_end > end {
            break;
        }

        slots.push(AvailableSlot {
            start_time: current,
            end_time: slot_end,
            duration_minutes: slot_duration,
        });
        current = slot_end;
    }

    slots
}

pub fn slots_for_window(window: &AvailabilityWindow) -> Vec<AvailableSlot> {
    slots_between(window.start_time, window.end_time, window.slot_duration)
}

/// Slots bookable on `date` from a doctor's weekly windows. Inactive windows
/// contribute nothing.
pub fn slots_for_date(windows: &[AvailabilityWindow], date: NaiveDate) -> Vec<AvailableSlot> {
    let day = DayOfWeek::from_date(date);

    let mut slots: Vec<AvailableSlot> = windows
        .iter()
        .filter(|w| w.is_active && w.day_of_week == day)
        .flat_map(slots_for_window)
        .collect();

    slots.sort_by_key(|s| s.start_time);
    slots
}

pub fn sort_windows(windows: &mut [AvailabilityWindow]) {
    windows.sort_by(|a, b| {
        a.day_of_week
            .cmp(&b.day_of_week)
            .then(a.start_time.cmp(&b.start_time))
    });
}

/// Calendar view: every window keyed by its day, inactive ones included.
pub fn group_by_day(windows: &[AvailabilityWindow]) -> BTreeMap<DayOfWeek, Vec<AvailabilityWindow>> {
    let mut grouped: BTreeMap<DayOfWeek, Vec<AvailabilityWindow>> = BTreeMap::new();
    for window in windows {
        grouped.entry(window.day_of_week).or_default().push(window.clone());
    }
    grouped
}

/// The window, if any, that already occupies `day` for this doctor, ignoring
/// `exclude_id` (the record being edited).
pub fn find_day_conflict<'a>(
    windows: &'a [AvailabilityWindow],
    day: DayOfWeek,
    exclude_id: Option<uuid::Uuid>,
) -> Option<&'a AvailabilityWindow> {
    windows
        .iter()
        .find(|w| w.day_of_week == day && Some(w.id) != exclude_id)
}

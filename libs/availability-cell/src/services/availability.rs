use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilityError, AvailabilityRule, AvailabilityWindow, AvailableSlot, DayOfWeek, Doctor,
};
use crate::services::delete_flow::{DeleteFlow, InvalidTransition};
use crate::services::rules::{find_day_conflict, slots_for_date, sort_windows, validate_slot_duration};
use crate::services::store::AvailabilityStore;
use shared_database::is_conflict;

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AvailabilityStore>) -> Self {
        Self { store }
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, AvailabilityError> {
        self.store
            .list_doctors()
            .await
            .map_err(|e| AvailabilityError::persistence("Failed to load doctors", e))
    }

    /// Every window of the doctor, inactive ones included, ordered by day and
    /// start time.
    pub async fn list_windows_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!("Fetching availability for doctor: {}", doctor_id);

        let mut windows = self.store
            .find_by_doctor(doctor_id)
            .await
            .map_err(|e| AvailabilityError::persistence("Failed to load availability", e))?;

        sort_windows(&mut windows);
        Ok(windows)
    }

    /// Create a window, or overwrite `existing_id` when given.
    ///
    /// Both paths reject a day that another window of the same doctor already
    /// holds; the edit path ignores the record being edited.
    pub async fn upsert_window(
        &self,
        doctor_id: Uuid,
        rule: AvailabilityRule,
        existing_id: Option<Uuid>,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        rule.validate()?;

        match existing_id {
            None => self.create_window(doctor_id, rule).await,
            Some(id) => self.update_window(doctor_id, id, rule).await,
        }
    }

    async fn create_window(
        &self,
        doctor_id: Uuid,
        rule: AvailabilityRule,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!("Creating availability for doctor {} on {}", doctor_id, rule.day_of_week);

        let existing = self.list_windows_for_doctor(doctor_id).await?;
        if find_day_conflict(&existing, rule.day_of_week, None).is_some() {
            warn!("Doctor {} already has availability on {}", doctor_id, rule.day_of_week);
            return Err(day_taken(rule.day_of_week));
        }

        let window = self.store
            .create(doctor_id, &rule)
            .await
            .map_err(|e| write_error(e, rule.day_of_week, "Failed to create availability"))?;

        debug!("Availability created with ID: {}", window.id);
        Ok(window)
    }

    async fn update_window(
        &self,
        doctor_id: Uuid,
        availability_id: Uuid,
        rule: AvailabilityRule,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!("Updating availability: {}", availability_id);

        let existing = self.list_windows_for_doctor(doctor_id).await?;
        if !existing.iter().any(|w| w.id == availability_id) {
            return Err(not_found(availability_id));
        }

        if find_day_conflict(&existing, rule.day_of_week, Some(availability_id)).is_some() {
            warn!(
                "Moving availability {} onto {} collides with another window of doctor {}",
                availability_id, rule.day_of_week, doctor_id
            );
            return Err(day_taken(rule.day_of_week));
        }

        self.store
            .update(availability_id, &rule)
            .await
            .map_err(|e| write_error(e, rule.day_of_week, "Failed to update availability"))?
            .ok_or_else(|| not_found(availability_id))
    }

    /// Drive a deletion one step. A pending flow is handed back untouched and
    /// nothing is written; only a confirmed flow reaches the store.
    pub async fn delete_window(
        &self,
        doctor_id: Uuid,
        flow: DeleteFlow,
    ) -> Result<DeleteFlow, AvailabilityError> {
        let window_id = match flow {
            DeleteFlow::PendingConfirmation { window_id } => {
                debug!("Deletion of availability {} awaits confirmation", window_id);
                return Ok(flow);
            }
            DeleteFlow::Confirmed { window_id } => window_id,
            other => {
                return Err(InvalidTransition { action: "delete", state: other.state_name() }.into())
            }
        };

        let window = self.store
            .find_by_id(window_id)
            .await
            .map_err(|e| AvailabilityError::persistence("Failed to load availability", e))?;

        match window {
            Some(w) if w.doctor_id == doctor_id => {}
            _ => return Err(not_found(window_id)),
        }

        let deleted = self.store
            .delete(window_id)
            .await
            .map_err(|e| AvailabilityError::persistence("Failed to delete availability", e))?;

        if !deleted {
            return Err(not_found(window_id));
        }

        info!("Deleted availability {} of doctor {}", window_id, doctor_id);
        Ok(flow.complete()?)
    }

    /// Overwrite the slot duration on every window of the doctor, whatever
    /// the day or active flag.
    pub async fn update_slot_duration_for_all_windows(
        &self,
        doctor_id: Uuid,
        slot_duration: i32,
    ) -> Result<u64, AvailabilityError> {
        validate_slot_duration(slot_duration)?;

        let updated = self.store
            .update_slot_duration(doctor_id, slot_duration)
            .await
            .map_err(|e| AvailabilityError::persistence("Failed to update slot duration", e))?;

        debug!("Set slot duration {} on {} windows of doctor {}", slot_duration, updated, doctor_id);
        Ok(updated)
    }

    /// Bookable slots on `date` derived from the doctor's weekly windows.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailableSlot>, AvailabilityError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        let windows = self.list_windows_for_doctor(doctor_id).await?;
        let slots = slots_for_date(&windows, date);

        debug!("Found {} available slots", slots.len());
        Ok(slots)
    }
}

fn day_taken(day: DayOfWeek) -> AvailabilityError {
    AvailabilityError::Conflict(format!("Availability for {} already exists", day))
}

/// A concurrent writer can take the day between the check and the write; the
/// unique `(doctor_id, day_of_week)` constraint then rejects ours.
fn write_error(err: anyhow::Error, day: DayOfWeek, context: &str) -> AvailabilityError {
    if is_conflict(&err) {
        warn!("{}: {:#}", context, err);
        return day_taken(day);
    }
    AvailabilityError::persistence(context, err)
}

fn not_found(id: Uuid) -> AvailabilityError {
    AvailabilityError::NotFound(format!("Availability {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveTime, Utc};
    use mockall::predicate::eq;

    use crate::services::store::MockAvailabilityStore;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn rule(day: DayOfWeek) -> AvailabilityRule {
        AvailabilityRule {
            day_of_week: day,
            start_time: t(9, 0),
            end_time: t(12, 0),
            slot_duration: 30,
            is_active: true,
        }
    }

    fn window(doctor_id: Uuid, day: DayOfWeek) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: day,
            start_time: t(9, 0),
            end_time: t(12, 0),
            slot_duration: 30,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_conflict_never_writes() {
        let doctor_id = Uuid::new_v4();
        let existing = window(doctor_id, DayOfWeek::MONDAY);

        let mut store = MockAvailabilityStore::new();
        store
            .expect_find_by_doctor()
            .with(eq(doctor_id))
            .returning(move |_| Ok(vec![existing.clone()]));
        store.expect_create().never();

        let service = AvailabilityService::new(Arc::new(store));
        let result = service.upsert_window(doctor_id, rule(DayOfWeek::MONDAY), None).await;

        assert_matches!(result, Err(AvailabilityError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_times_never_reach_store() {
        let mut store = MockAvailabilityStore::new();
        store.expect_find_by_doctor().never();
        store.expect_create().never();

        let service = AvailabilityService::new(Arc::new(store));
        let mut bad = rule(DayOfWeek::MONDAY);
        bad.end_time = bad.start_time;

        let result = service.upsert_window(Uuid::new_v4(), bad, None).await;
        assert_matches!(result, Err(AvailabilityError::Validation(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_generic_persistence_error() {
        let mut store = MockAvailabilityStore::new();
        store
            .expect_find_by_doctor()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let service = AvailabilityService::new(Arc::new(store));
        let result = service.list_windows_for_doctor(Uuid::new_v4()).await;

        assert_matches!(result, Err(AvailabilityError::Persistence(msg)) if !msg.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_pending_delete_does_not_touch_store() {
        let mut store = MockAvailabilityStore::new();
        store.expect_find_by_id().never();
        store.expect_delete().never();

        let service = AvailabilityService::new(Arc::new(store));
        let pending = DeleteFlow::Idle.request(Uuid::new_v4()).unwrap();

        let flow = service.delete_window(Uuid::new_v4(), pending).await.unwrap();
        assert_eq!(flow, pending);
    }

    #[tokio::test]
    async fn test_confirmed_delete_completes() {
        let doctor_id = Uuid::new_v4();
        let target = window(doctor_id, DayOfWeek::TUESDAY);
        let target_id = target.id;

        let mut store = MockAvailabilityStore::new();
        store
            .expect_find_by_id()
            .with(eq(target_id))
            .returning(move |_| Ok(Some(target.clone())));
        store
            .expect_delete()
            .with(eq(target_id))
            .times(1)
            .returning(|_| Ok(true));

        let service = AvailabilityService::new(Arc::new(store));
        let confirmed = DeleteFlow::Idle.request(target_id).unwrap().confirm().unwrap();

        let flow = service.delete_window(doctor_id, confirmed).await.unwrap();
        assert_eq!(flow, DeleteFlow::Completed { window_id: target_id });
    }

    #[tokio::test]
    async fn test_delete_of_other_doctors_window_is_not_found() {
        let target = window(Uuid::new_v4(), DayOfWeek::TUESDAY);
        let target_id = target.id;

        let mut store = MockAvailabilityStore::new();
        store
            .expect_find_by_id()
            .returning(move |_| Ok(Some(target.clone())));
        store.expect_delete().never();

        let service = AvailabilityService::new(Arc::new(store));
        let confirmed = DeleteFlow::Idle.request(target_id).unwrap().confirm().unwrap();

        let result = service.delete_window(Uuid::new_v4(), confirmed).await;
        assert_matches!(result, Err(AvailabilityError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_idle_delete_is_rejected() {
        let service = AvailabilityService::new(Arc::new(MockAvailabilityStore::new()));
        let result = service.delete_window(Uuid::new_v4(), DeleteFlow::Idle).await;
        assert_matches!(result, Err(AvailabilityError::Validation(_)));
    }

    #[tokio::test]
    async fn test_slot_duration_out_of_range_never_writes() {
        let mut store = MockAvailabilityStore::new();
        store.expect_update_slot_duration().never();

        let service = AvailabilityService::new(Arc::new(store));
        let result = service.update_slot_duration_for_all_windows(Uuid::new_v4(), 150).await;

        assert_matches!(result, Err(AvailabilityError::Validation(_)));
    }
}

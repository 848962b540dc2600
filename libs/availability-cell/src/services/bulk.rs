use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::{AvailabilityError, AvailabilityRule, BulkUpdateReport};
use crate::services::store::AvailabilityStore;

/// Applies one availability rule to many doctors at once.
pub struct BulkUpdateCoordinator {
    store: Arc<dyn AvailabilityStore>,
}

impl BulkUpdateCoordinator {
    pub fn new(store: Arc<dyn AvailabilityStore>) -> Self {
        Self { store }
    }

    /// Create-or-replace the window for `rule.day_of_week` for every doctor
    /// in `doctor_ids`. Repeated ids count once.
    ///
    /// The batch is atomic: on error nothing has been written and no partial
    /// result is reported. On success the report lists one entry per doctor.
    pub async fn apply_rule_to_doctors(
        &self,
        doctor_ids: &[Uuid],
        rule: AvailabilityRule,
    ) -> Result<BulkUpdateReport, AvailabilityError> {
        if doctor_ids.is_empty() {
            return Err(AvailabilityError::Validation(
                "Select at least one doctor".to_string(),
            ));
        }
        rule.validate()?;

        let mut seen = HashSet::with_capacity(doctor_ids.len());
        let doctor_ids: Vec<Uuid> = doctor_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        debug!(
            "Applying {} {}-{} rule to {} doctors",
            rule.day_of_week, rule.start_time, rule.end_time, doctor_ids.len()
        );

        let results = self.store
            .apply_rule(&doctor_ids, &rule)
            .await
            .map_err(|e| AvailabilityError::persistence("Failed to apply availability rule", e))?;

        if results.len() != doctor_ids.len() {
            error!(
                "Store reported {} rule applications for {} doctors",
                results.len(),
                doctor_ids.len()
            );
            return Err(AvailabilityError::Persistence(
                "Availability rule was not applied to every doctor".to_string(),
            ));
        }

        info!("Applied availability rule to {} doctors", results.len());
        Ok(BulkUpdateReport {
            affected: results.len(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;

    use crate::models::DayOfWeek;
    use crate::services::store::MockAvailabilityStore;

    fn monday_rule() -> AvailabilityRule {
        AvailabilityRule {
            day_of_week: DayOfWeek::MONDAY,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            slot_duration: 20,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_empty_selection_never_reaches_store() {
        let mut store = MockAvailabilityStore::new();
        store.expect_apply_rule().never();

        let coordinator = BulkUpdateCoordinator::new(Arc::new(store));
        let result = coordinator.apply_rule_to_doctors(&[], monday_rule()).await;

        assert_matches!(result, Err(AvailabilityError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_rule_never_reaches_store() {
        let mut store = MockAvailabilityStore::new();
        store.expect_apply_rule().never();

        let coordinator = BulkUpdateCoordinator::new(Arc::new(store));
        let mut rule = monday_rule();
        rule.slot_duration = 200;

        let result = coordinator.apply_rule_to_doctors(&[Uuid::new_v4()], rule).await;
        assert_matches!(result, Err(AvailabilityError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_sent_once() {
        let id = Uuid::new_v4();
        let mut store = MockAvailabilityStore::new();
        store
            .expect_apply_rule()
            .withf(move |ids, _| ids.len() == 1 && ids[0] == id)
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("stop here")));

        let coordinator = BulkUpdateCoordinator::new(Arc::new(store));
        let result = coordinator.apply_rule_to_doctors(&[id, id], monday_rule()).await;

        assert_matches!(result, Err(AvailabilityError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_short_result_is_an_error() {
        let mut store = MockAvailabilityStore::new();
        store.expect_apply_rule().returning(|_, _| Ok(vec![]));

        let coordinator = BulkUpdateCoordinator::new(Arc::new(store));
        let result = coordinator
            .apply_rule_to_doctors(&[Uuid::new_v4(), Uuid::new_v4()], monday_rule())
            .await;

        assert_matches!(result, Err(AvailabilityError::Persistence(_)));
    }
}

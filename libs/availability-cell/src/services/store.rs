use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{AvailabilityRule, AvailabilityWindow, Doctor, RuleApplication};

const AVAILABILITY_TABLE: &str = "/rest/v1/doctor_availability";
const APPLY_RULE_FUNCTION: &str = "apply_availability_rule";

/// Persistence collaborator for availability windows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn list_doctors(&self) -> Result<Vec<Doctor>>;

    /// All windows of one doctor ordered by day, then start time.
    async fn find_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AvailabilityWindow>>;

    async fn create(&self, doctor_id: Uuid, rule: &AvailabilityRule) -> Result<AvailabilityWindow>;

    /// Overwrites the rule fields of an existing window. `None` when the id is unknown.
    async fn update(&self, id: Uuid, rule: &AvailabilityRule) -> Result<Option<AvailabilityWindow>>;

    /// `false` when there was nothing to delete.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Sets `slot_duration` on every window of the doctor and returns how many changed.
    async fn update_slot_duration(&self, doctor_id: Uuid, slot_duration: i32) -> Result<u64>;

    /// Create-or-replace the window for `rule.day_of_week` for every doctor as
    /// one atomic unit: either every doctor is written or none is.
    async fn apply_rule(&self, doctor_ids: &[Uuid], rule: &AvailabilityRule) -> Result<Vec<RuleApplication>>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabaseAvailabilityStore {
    supabase: SupabaseClient,
    auth_token: String,
}

impl SupabaseAvailabilityStore {
    pub fn new(supabase: SupabaseClient, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
        }
    }

    fn rule_body(rule: &AvailabilityRule) -> serde_json::Map<String, serde_json::Value> {
        let mut body = serde_json::Map::new();
        body.insert("day_of_week".to_string(), json!(i32::from(rule.day_of_week)));
        body.insert("start_time".to_string(), json!(rule.start_time.format("%H:%M").to_string()));
        body.insert("end_time".to_string(), json!(rule.end_time.format("%H:%M").to_string()));
        body.insert("slot_duration".to_string(), json!(rule.slot_duration));
        body.insert("is_active".to_string(), json!(rule.is_active));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        body
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        let path = "/rest/v1/doctors?select=id,full_name,specialty&order=full_name.asc";
        self.supabase.request(Method::GET, path, Some(self.auth_token.as_str()), None).await
    }

    async fn find_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        debug!("Fetching availability for doctor: {}", doctor_id);

        let path = format!(
            "{}?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            AVAILABILITY_TABLE, doctor_id
        );
        self.supabase.request(Method::GET, &path, Some(self.auth_token.as_str()), None).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AvailabilityWindow>> {
        let path = format!("{}?id=eq.{}", AVAILABILITY_TABLE, id);
        let result: Vec<AvailabilityWindow> = self.supabase
            .request(Method::GET, &path, Some(self.auth_token.as_str()), None)
            .await?;

        Ok(result.into_iter().next())
    }

    async fn create(&self, doctor_id: Uuid, rule: &AvailabilityRule) -> Result<AvailabilityWindow> {
        let mut body = Self::rule_body(rule);
        body.insert("doctor_id".to_string(), json!(doctor_id));
        body.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));

        let result: Vec<AvailabilityWindow> = self.supabase
            .request_returning(Method::POST, AVAILABILITY_TABLE, Some(self.auth_token.as_str()), Some(body.into()))
            .await?;

        result.into_iter().next().ok_or_else(|| anyhow!("Failed to create availability"))
    }

    async fn update(&self, id: Uuid, rule: &AvailabilityRule) -> Result<Option<AvailabilityWindow>> {
        let path = format!("{}?id=eq.{}", AVAILABILITY_TABLE, id);
        let result: Vec<AvailabilityWindow> = self.supabase
            .request_returning(Method::PATCH, &path, Some(self.auth_token.as_str()), Some(Self::rule_body(rule).into()))
            .await?;

        Ok(result.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let path = format!("{}?id=eq.{}", AVAILABILITY_TABLE, id);
        let result: Vec<serde_json::Value> = self.supabase
            .request_returning(Method::DELETE, &path, Some(self.auth_token.as_str()), None)
            .await?;

        Ok(!result.is_empty())
    }

    async fn update_slot_duration(&self, doctor_id: Uuid, slot_duration: i32) -> Result<u64> {
        let path = format!("{}?doctor_id=eq.{}", AVAILABILITY_TABLE, doctor_id);
        let body = json!({
            "slot_duration": slot_duration,
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<serde_json::Value> = self.supabase
            .request_returning(Method::PATCH, &path, Some(self.auth_token.as_str()), Some(body))
            .await?;

        Ok(result.len() as u64)
    }

    async fn apply_rule(&self, doctor_ids: &[Uuid], rule: &AvailabilityRule) -> Result<Vec<RuleApplication>> {
        // The function upserts on (doctor_id, day_of_week) inside one transaction.
        let args = json!({
            "p_doctor_ids": doctor_ids,
            "p_day_of_week": i32::from(rule.day_of_week),
            "p_start_time": rule.start_time.format("%H:%M").to_string(),
            "p_end_time": rule.end_time.format("%H:%M").to_string(),
            "p_slot_duration": rule.slot_duration,
            "p_is_active": rule.is_active
        });

        self.supabase.rpc(APPLY_RULE_FUNCTION, Some(self.auth_token.as_str()), args).await
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
struct MemoryState {
    doctors: Vec<Doctor>,
    windows: Vec<AvailabilityWindow>,
}

/// Process-local store. Used when Supabase is not configured and by tests.
/// When doctors are registered, writes for unknown doctor ids fail the way a
/// foreign key would.
#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    state: RwLock<MemoryState>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doctors(doctors: Vec<Doctor>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                doctors,
                windows: Vec::new(),
            }),
        }
    }

    pub async fn all_windows(&self) -> Vec<AvailabilityWindow> {
        self.state.read().await.windows.clone()
    }
}

impl MemoryState {
    fn check_doctor(&self, doctor_id: Uuid) -> Result<()> {
        if self.doctors.is_empty() || self.doctors.iter().any(|d| d.id == doctor_id) {
            Ok(())
        } else {
            Err(anyhow!("Doctor not found: {}", doctor_id))
        }
    }

    fn insert(&mut self, doctor_id: Uuid, rule: &AvailabilityRule) -> AvailabilityWindow {
        let now = Utc::now();
        let window = AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: rule.day_of_week,
            start_time: rule.start_time,
            end_time: rule.end_time,
            slot_duration: rule.slot_duration,
            is_active: rule.is_active,
            created_at: now,
            updated_at: now,
        };
        self.windows.push(window.clone());
        window
    }
}

fn overwrite(window: &mut AvailabilityWindow, rule: &AvailabilityRule) {
    window.day_of_week = rule.day_of_week;
    window.start_time = rule.start_time;
    window.end_time = rule.end_time;
    window.slot_duration = rule.slot_duration;
    window.is_active = rule.is_active;
    window.updated_at = Utc::now();
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        let mut doctors = self.state.read().await.doctors.clone();
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }

    async fn find_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let mut windows: Vec<AvailabilityWindow> = self.state.read().await.windows
            .iter()
            .filter(|w| w.doctor_id == doctor_id)
            .cloned()
            .collect();

        crate::services::rules::sort_windows(&mut windows);
        Ok(windows)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AvailabilityWindow>> {
        Ok(self.state.read().await.windows.iter().find(|w| w.id == id).cloned())
    }

    async fn create(&self, doctor_id: Uuid, rule: &AvailabilityRule) -> Result<AvailabilityWindow> {
        let mut state = self.state.write().await;
        state.check_doctor(doctor_id)?;
        Ok(state.insert(doctor_id, rule))
    }

    async fn update(&self, id: Uuid, rule: &AvailabilityRule) -> Result<Option<AvailabilityWindow>> {
        let mut state = self.state.write().await;
        Ok(state.windows.iter_mut().find(|w| w.id == id).map(|window| {
            overwrite(window, rule);
            window.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.windows.len();
        state.windows.retain(|w| w.id != id);
        Ok(state.windows.len() != before)
    }

    async fn update_slot_duration(&self, doctor_id: Uuid, slot_duration: i32) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut count = 0;

        for window in state.windows.iter_mut().filter(|w| w.doctor_id == doctor_id) {
            window.slot_duration = slot_duration;
            window.updated_at = now;
            count += 1;
        }

        Ok(count)
    }

    async fn apply_rule(&self, doctor_ids: &[Uuid], rule: &AvailabilityRule) -> Result<Vec<RuleApplication>> {
        // One write guard for the whole batch; every doctor is checked before
        // anything is written.
        let mut state = self.state.write().await;
        for doctor_id in doctor_ids {
            state.check_doctor(*doctor_id)?;
        }

        let mut results = Vec::with_capacity(doctor_ids.len());
        for doctor_id in doctor_ids {
            let existing = state
                .windows
                .iter()
                .position(|w| w.doctor_id == *doctor_id && w.day_of_week == rule.day_of_week);

            let application = match existing {
                Some(index) => {
                    let window = &mut state.windows[index];
                    overwrite(window, rule);
                    RuleApplication { window: window.clone(), replaced: true }
                }
                None => RuleApplication { window: state.insert(*doctor_id, rule), replaced: false },
            };
            results.push(application);
        }

        Ok(results)
    }
}

// ==============================================================================
// BACKEND SELECTION
// ==============================================================================

/// Where availability is persisted. Supabase stores are built per request so
/// the caller's bearer token reaches row-level security.
#[derive(Clone)]
pub enum StoreBackend {
    Supabase(SupabaseClient),
    InMemory(Arc<InMemoryAvailabilityStore>),
}

impl StoreBackend {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.is_configured() {
            StoreBackend::Supabase(SupabaseClient::new(config))
        } else {
            warn!("Supabase not configured, availability is kept in memory");
            StoreBackend::InMemory(Arc::new(InMemoryAvailabilityStore::new()))
        }
    }

    pub fn for_token(&self, auth_token: &str) -> Arc<dyn AvailabilityStore> {
        match self {
            StoreBackend::Supabase(client) => {
                Arc::new(SupabaseAvailabilityStore::new(client.clone(), auth_token))
            }
            StoreBackend::InMemory(store) => store.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use crate::models::DayOfWeek;

    fn rule(day: DayOfWeek, duration: i32) -> AvailabilityRule {
        AvailabilityRule {
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            slot_duration: duration,
            is_active: true,
        }
    }

    fn doctor(name: &str) -> Doctor {
        Doctor { id: Uuid::new_v4(), name: name.to_string(), specialization: None }
    }

    #[tokio::test]
    async fn test_in_memory_find_by_doctor_is_ordered() {
        let store = InMemoryAvailabilityStore::new();
        let doctor_id = Uuid::new_v4();

        store.create(doctor_id, &rule(DayOfWeek::FRIDAY, 30)).await.unwrap();
        store.create(doctor_id, &rule(DayOfWeek::MONDAY, 30)).await.unwrap();
        store.create(Uuid::new_v4(), &rule(DayOfWeek::SUNDAY, 30)).await.unwrap();

        let windows = store.find_by_doctor(doctor_id).await.unwrap();
        let days: Vec<_> = windows.iter().map(|w| w.day_of_week).collect();

        assert_eq!(days, vec![DayOfWeek::MONDAY, DayOfWeek::FRIDAY]);
    }

    #[tokio::test]
    async fn test_in_memory_apply_rule_is_all_or_nothing() {
        let known = doctor("Dr. Known");
        let store = InMemoryAvailabilityStore::with_doctors(vec![known.clone()]);

        let err = store
            .apply_rule(&[known.id, Uuid::new_v4()], &rule(DayOfWeek::MONDAY, 15))
            .await;

        assert!(err.is_err());
        assert!(store.all_windows().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_apply_rule_replaces_existing_day() {
        let store = InMemoryAvailabilityStore::new();
        let doctor_id = Uuid::new_v4();
        let original = store.create(doctor_id, &rule(DayOfWeek::MONDAY, 30)).await.unwrap();

        let results = store.apply_rule(&[doctor_id], &rule(DayOfWeek::MONDAY, 45)).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].replaced);
        assert_eq!(results[0].window.id, original.id);
        assert_eq!(store.all_windows().await.len(), 1);
        assert_eq!(store.all_windows().await[0].slot_duration, 45);
    }

    #[tokio::test]
    async fn test_in_memory_delete_reports_missing() {
        let store = InMemoryAvailabilityStore::new();
        let window = store.create(Uuid::new_v4(), &rule(DayOfWeek::MONDAY, 30)).await.unwrap();

        assert!(store.delete(window.id).await.unwrap());
        assert!(!store.delete(window.id).await.unwrap());
    }

    #[test]
    fn test_backend_falls_back_to_memory() {
        let backend = StoreBackend::from_config(&AppConfig::for_supabase("", ""));
        assert!(matches!(backend, StoreBackend::InMemory(_)));
    }
}

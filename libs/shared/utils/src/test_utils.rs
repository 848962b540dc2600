use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;

pub const TEST_TOKEN: &str = "test-access-token";

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig::for_supabase(self.supabase_url.clone(), self.supabase_anon_key.clone())
    }
}

pub fn bearer() -> String {
    format!("Bearer {}", TEST_TOKEN)
}

/// Rows shaped the way PostgREST returns them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_row(doctor_id: Uuid, full_name: &str, specialty: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "full_name": full_name,
            "specialty": specialty
        })
    }

    pub fn availability_row(
        id: Uuid,
        doctor_id: Uuid,
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
        slot_duration: i32,
        is_active: bool,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "slot_duration": slot_duration,
            "is_active": is_active,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-01T00:00:00+00:00"
        })
    }

    pub fn created_at_row(created_at: DateTime<Utc>) -> serde_json::Value {
        json!({ "created_at": created_at.to_rfc3339() })
    }

    pub fn subscription_row(created_at: DateTime<Utc>, amount: f64) -> serde_json::Value {
        json!({
            "created_at": created_at.to_rfc3339(),
            "amount": amount
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

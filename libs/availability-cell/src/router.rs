use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::store::StoreBackend;

pub struct AvailabilityState {
    pub backend: StoreBackend,
}

impl AvailabilityState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            backend: StoreBackend::from_config(config),
        }
    }
}

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        // Doctor selection list
        .route("/doctors", get(handlers::list_doctors))

        // Per-doctor weekly schedule
        .route(
            "/doctors/{doctor_id}/availability",
            get(handlers::list_availability).post(handlers::upsert_availability),
        )
        .route(
            "/doctors/{doctor_id}/availability/slot-duration",
            put(handlers::update_slot_duration),
        )
        .route(
            "/doctors/{doctor_id}/availability/{availability_id}",
            put(handlers::update_availability).delete(handlers::delete_availability),
        )
        .route("/doctors/{doctor_id}/available-slots", get(handlers::get_available_slots))

        // Same rule across many doctors
        .route("/availability/bulk", post(handlers::apply_bulk_rule))
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use availability_cell::router::{availability_routes, AvailabilityState};
use dashboard_cell::router::{dashboard_routes, DashboardState};
use shared_config::AppConfig;

pub fn create_router(config: &AppConfig) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .merge(availability_routes(Arc::new(AvailabilityState::from_config(config))))
        .nest("/dashboard", dashboard_routes(Arc::new(DashboardState::from_config(config))))
}

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use chrono::NaiveDate;

use shared_config::AppConfig;

use crate::handlers;
use crate::services::{cache::{DashboardCache, TtlCache}, source::SourceBackend};

pub struct DashboardState {
    pub backend: SourceBackend,
    pub cache: Arc<dyn DashboardCache>,
    pub ttl: Duration,
    pub epoch: NaiveDate,
}

impl DashboardState {
    /// One cache for the whole process. Handlers scope its keys per caller.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            backend: SourceBackend::from_config(config),
            cache: Arc::new(TtlCache::new()),
            ttl: config.dashboard_cache_ttl(),
            epoch: config.dashboard_epoch,
        }
    }
}

pub fn dashboard_routes(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/growth", get(handlers::get_growth))
        .route("/revenue", get(handlers::get_revenue))
        .with_state(state)
}

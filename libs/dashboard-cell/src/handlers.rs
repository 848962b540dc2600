use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use shared_models::AppError;

use crate::models::{DashboardError, DashboardQuery, DashboardSeries, GrowthBucket, RevenueBucket, TimeRange};
use crate::router::DashboardState;
use crate::services::reader::{caller_scope, DashboardReader};

const DEFAULT_RANGE: TimeRange = TimeRange::Last30Days;

fn dashboard_reader(
    state: &DashboardState,
    auth: &Authorization<Bearer>,
) -> Result<DashboardReader, DashboardError> {
    let source = state.backend.for_token(auth.token())?;

    Ok(DashboardReader::new(source, state.cache.clone(), state.ttl, state.epoch)
        .with_cache_scope(caller_scope(auth.token())))
}

fn requested_range(query: &DashboardQuery) -> Result<TimeRange, AppError> {
    match query.range.as_deref() {
        None => Ok(DEFAULT_RANGE),
        Some(raw) => Ok(raw.parse::<TimeRange>()?),
    }
}

#[axum::debug_handler]
pub async fn get_growth(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<DashboardQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<DashboardSeries<GrowthBucket>>, AppError> {
    let range = requested_range(&query)?;
    let series = dashboard_reader(&state, &auth)?.growth(range).await?;
    Ok(Json(series))
}

#[axum::debug_handler]
pub async fn get_revenue(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<DashboardQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<DashboardSeries<RevenueBucket>>, AppError> {
    let range = requested_range(&query)?;
    let series = dashboard_reader(&state, &auth)?.revenue(range).await?;
    Ok(Json(series))
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::AppError;

use crate::models::{
    AvailabilityRule, AvailableSlotsQuery, BulkAvailabilityRequest, DeleteAvailabilityQuery,
    UpdateSlotDurationRequest, UpsertAvailabilityRequest,
};
use crate::router::AvailabilityState;
use crate::services::{
    availability::AvailabilityService,
    bulk::BulkUpdateCoordinator,
    delete_flow::DeleteFlow,
    rules::group_by_day,
};

fn availability_service(state: &AvailabilityState, auth: &Authorization<Bearer>) -> AvailabilityService {
    AvailabilityService::new(state.backend.for_token(auth.token()))
}

fn rule_from_request(request: &UpsertAvailabilityRequest) -> Result<AvailabilityRule, AppError> {
    Ok(AvailabilityRule::parse(
        request.day_of_week,
        &request.start_time,
        &request.end_time,
        request.slot_duration,
        request.is_active.unwrap_or(true),
    )?)
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AvailabilityState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let doctors = availability_service(&state, &auth).list_doctors().await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let windows = availability_service(&state, &auth)
        .list_windows_for_doctor(doctor_id)
        .await?;

    let by_day: serde_json::Map<String, Value> = group_by_day(&windows)
        .into_iter()
        .map(|(day, windows)| (i32::from(day).to_string(), json!(windows)))
        .collect();

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "availability": windows,
        "by_day": by_day
    })))
}

#[axum::debug_handler]
pub async fn upsert_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<UpsertAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let rule = rule_from_request(&request)?;
    let window = availability_service(&state, &auth)
        .upsert_window(doctor_id, rule, request.id)
        .await?;

    let status = if request.id.is_some() { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(json!(window))))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path((doctor_id, availability_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<UpsertAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if request.id.is_some_and(|id| id != availability_id) {
        return Err(AppError::BadRequest("Body id does not match path".to_string()));
    }

    let rule = rule_from_request(&request)?;
    let window = availability_service(&state, &auth)
        .upsert_window(doctor_id, rule, Some(availability_id))
        .await?;

    Ok(Json(json!(window)))
}

/// Without `confirm=true` the deletion is only requested: the response says
/// confirmation is required and nothing is removed.
#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AvailabilityState>>,
    Path((doctor_id, availability_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<DeleteAvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut flow = DeleteFlow::Idle
        .request(availability_id)
        .map_err(crate::models::AvailabilityError::from)?;

    if query.confirm.unwrap_or(false) {
        flow = flow.confirm().map_err(crate::models::AvailabilityError::from)?;
    }

    let flow = availability_service(&state, &auth)
        .delete_window(doctor_id, flow)
        .await?;

    let status = match flow {
        DeleteFlow::Completed { .. } => StatusCode::OK,
        _ => StatusCode::ACCEPTED,
    };

    Ok((status, Json(json!({
        "availability_id": availability_id,
        "confirmation_required": matches!(flow, DeleteFlow::PendingConfirmation { .. }),
        "flow": flow
    }))))
}

#[axum::debug_handler]
pub async fn update_slot_duration(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<UpdateSlotDurationRequest>,
) -> Result<Json<Value>, AppError> {
    let updated = availability_service(&state, &auth)
        .update_slot_duration_for_all_windows(doctor_id, request.slot_duration)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "slot_duration": request.slot_duration,
        "updated": updated
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let slots = availability_service(&state, &auth)
        .available_slots(doctor_id, query.date)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "available_slots": slots,
        "total_slots": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn apply_bulk_rule(
    State(state): State<Arc<AvailabilityState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BulkAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let rule = AvailabilityRule::parse(
        request.day_of_week,
        &request.start_time,
        &request.end_time,
        request.slot_duration,
        request.is_active.unwrap_or(true),
    )?;

    let coordinator = BulkUpdateCoordinator::new(state.backend.for_token(auth.token()));
    let report = coordinator.apply_rule_to_doctors(&request.doctor_ids, rule).await?;

    Ok(Json(json!(report)))
}

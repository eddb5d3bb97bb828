use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;

use crate::models::{AvailabilityError, CreateAvailabilityRequest, UpdateAvailabilityRequest};
use crate::router::AvailabilityState;

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation(msg) => AppError::ValidationError(msg),
            AvailabilityError::NotFound => AppError::NotFound(err.to_string()),
            AvailabilityError::DuplicateTemplate(_) => AppError::Conflict(err.to_string()),
            AvailabilityError::Storage(msg) => AppError::Database(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

/// Admins manage any calendar; doctors only their own.
fn ensure_can_manage(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    match user.actor_role() {
        Some(ActorRole::Admin) => Ok(()),
        Some(ActorRole::Doctor) if user.id == doctor_id.to_string() => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only the doctor or an administrator can manage this availability".to_string(),
        )),
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<AvailabilityState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let templates = state.availability.list_by_doctor(doctor_id).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "availability": templates,
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<AvailabilityState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state.slots.compute_available_slots(doctor_id, query.date).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "available_slots": slots,
        "total_slots": slots.len(),
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<AvailabilityState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ensure_can_manage(&user, doctor_id)?;

    let template = state.availability.create_template(doctor_id, request).await?;
    Ok((StatusCode::CREATED, Json(json!(template))))
}

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<AvailabilityState>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let template = state.availability.get_template(template_id).await?;
    Ok(Json(json!(template)))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<AvailabilityState>,
    Extension(user): Extension<User>,
    Path(template_id): Path<Uuid>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let current = state.availability.get_template(template_id).await?;
    ensure_can_manage(&user, current.doctor_id)?;

    let template = state.availability.update_template(template_id, request).await?;
    Ok(Json(json!(template)))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<AvailabilityState>,
    Extension(user): Extension<User>,
    Path(template_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let current = state.availability.get_template(template_id).await?;
    ensure_can_manage(&user, current.doctor_id)?;

    state.availability.remove_template(template_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

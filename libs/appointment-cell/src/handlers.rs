use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentNotesRequest, AppointmentSearchQuery, BookAppointmentRequest,
    CancelAppointmentRequest, RescheduleAppointmentRequest, UpdateAppointmentRequest,
};
use crate::router::AppointmentState;

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentBody {
    /// Required when staff book on a patient's behalf.
    pub patient_id: Option<Uuid>,
    #[serde(flatten)]
    pub booking: BookAppointmentRequest,
}

#[derive(Debug, Deserialize)]
pub struct PatientScopeQuery {
    pub patient_id: Option<Uuid>,
}

struct Actor {
    id: Uuid,
    role: ActorRole,
}

fn actor(user: &User) -> Result<Actor, AppError> {
    let id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))?;
    let role = user
        .actor_role()
        .ok_or_else(|| AppError::Forbidden("A scheduling role is required".to_string()))?;
    Ok(Actor { id, role })
}

/// Parties see their own appointments; staff see all.
fn ensure_can_view(actor: &Actor, appointment: &Appointment) -> Result<(), AppError> {
    let allowed = match actor.role {
        ActorRole::Patient => appointment.patient_id == actor.id,
        ActorRole::Doctor => appointment.doctor_id == actor.id,
        ActorRole::Receptionist | ActorRole::Admin => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden("You can only access your own appointments".to_string()))
    }
}

/// Only the booking patient or staff may change what was booked.
fn ensure_can_modify(actor: &Actor, appointment: &Appointment) -> Result<(), AppError> {
    if actor.role.is_staff() || (actor.role == ActorRole::Patient && appointment.patient_id == actor.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("You can only modify your own appointments".to_string()))
    }
}

fn ensure_can_manage(actor: &Actor, appointment: &Appointment) -> Result<(), AppError> {
    match actor.role {
        ActorRole::Doctor if appointment.doctor_id == actor.id => Ok(()),
        ActorRole::Receptionist | ActorRole::Admin => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only the treating doctor or clinic staff can do this".to_string(),
        )),
    }
}

fn scoped_patient(actor: &Actor, query: PatientScopeQuery) -> Result<Uuid, AppError> {
    match actor.role {
        ActorRole::Patient => match query.patient_id {
            Some(id) if id != actor.id => Err(AppError::Forbidden(
                "Patients can only view their own appointments".to_string(),
            )),
            _ => Ok(actor.id),
        },
        ActorRole::Doctor | ActorRole::Receptionist | ActorRole::Admin => query
            .patient_id
            .ok_or_else(|| AppError::BadRequest("patient_id is required".to_string())),
    }
}

/// Notes bodies are optional; a request without one leaves notes untouched.
fn notes_from(request: Option<Json<AppointmentNotesRequest>>) -> Option<String> {
    request.and_then(|Json(body)| body.notes)
}

async fn load_for(
    state: &AppointmentState,
    id: Uuid,
) -> Result<Appointment, AppError> {
    Ok(state.scheduling.get_appointment(id).await?)
}

// ==============================================================================
// BOOKING & QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateAppointmentBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor(&user)?;

    let patient_id = match actor.role {
        ActorRole::Patient => match body.patient_id {
            Some(id) if id != actor.id => {
                return Err(AppError::Forbidden(
                    "Patients can only book appointments for themselves".to_string(),
                ))
            }
            _ => actor.id,
        },
        ActorRole::Receptionist | ActorRole::Admin => body
            .patient_id
            .ok_or_else(|| AppError::BadRequest("patient_id is required".to_string()))?,
        ActorRole::Doctor => {
            return Err(AppError::Forbidden("Doctors cannot book appointments".to_string()))
        }
    };

    let appointment = state.scheduling.create_appointment(patient_id, body.booking).await?;
    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    match actor.role {
        ActorRole::Patient => query.patient_id = Some(actor.id),
        ActorRole::Doctor => query.doctor_id = Some(actor.id),
        ActorRole::Receptionist | ActorRole::Admin => {}
    }

    let appointments = state.scheduling.list_appointments(&query).await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(scope): Query<PatientScopeQuery>,
) -> Result<Json<Value>, AppError> {
    let patient_id = scoped_patient(&actor(&user)?, scope)?;
    let appointments = state.scheduling.get_upcoming(patient_id).await?;
    Ok(Json(json!({ "appointments": appointments, "total": appointments.len() })))
}

#[axum::debug_handler]
pub async fn get_past_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(scope): Query<PatientScopeQuery>,
) -> Result<Json<Value>, AppError> {
    let patient_id = scoped_patient(&actor(&user)?, scope)?;
    let appointments = state.scheduling.get_past(patient_id).await?;
    Ok(Json(json!({ "appointments": appointments, "total": appointments.len() })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    let appointment = load_for(&state, id).await?;
    ensure_can_view(&actor, &appointment)?;
    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    ensure_can_modify(&actor, &load_for(&state, id).await?)?;

    let appointment = state.scheduling.update_appointment(id, request).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    ensure_can_modify(&actor, &load_for(&state, id).await?)?;

    let appointment = state
        .scheduling
        .reschedule_appointment(id, request.date, request.start_time.as_deref())
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    ensure_can_view(&actor, &load_for(&state, id).await?)?;

    let appointment = state
        .scheduling
        .cancel_appointment(id, actor.id, actor.role, request.reason)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    request: Option<Json<AppointmentNotesRequest>>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    ensure_can_manage(&actor, &load_for(&state, id).await?)?;

    let appointment = state
        .scheduling
        .confirm_appointment(id, actor.id, notes_from(request))
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    request: Option<Json<AppointmentNotesRequest>>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    ensure_can_manage(&actor, &load_for(&state, id).await?)?;

    let appointment = state
        .scheduling
        .complete_appointment(id, notes_from(request))
        .await?;
    Ok(Json(json!(appointment)))
}

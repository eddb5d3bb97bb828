// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::ClockTime;
use shared_models::auth::ActorRole;

use crate::error::{RepositoryError, SchedulingError};
use crate::models::{
    Appointment, AppointmentEvent, AppointmentEventKind, AppointmentStatus, SchedulingRules,
    UpdateAppointmentRequest,
};
use crate::repository::AppointmentRepository;
use crate::services::clock::Clock;
use crate::services::conflict::BookingConflictGuard;
use crate::services::locks::KeyedLocks;

/// Statuses reachable from `current` through a lifecycle operation.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Pending => &[
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Confirmed => &[AppointmentStatus::Completed, AppointmentStatus::Cancelled],
        // Terminal states - no transitions allowed
        AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => &[],
    }
}

fn ensure_transition(
    current: AppointmentStatus,
    target: AppointmentStatus,
    action: &'static str,
) -> Result<(), SchedulingError> {
    if valid_transitions(current).contains(&target) {
        Ok(())
    } else {
        warn!("Invalid status transition attempted: {} -> {}", current, target);
        Err(SchedulingError::InvalidTransition { status: current, action })
    }
}

fn ensure_editable(current: AppointmentStatus, action: &'static str) -> Result<(), SchedulingError> {
    if current.is_terminal() {
        Err(SchedulingError::InvalidTransition { status: current, action })
    } else {
        Ok(())
    }
}

/// The appointment state machine.
///
/// Each operation loads, checks and stores under a per-appointment lock so
/// two concurrent transitions on one appointment cannot both succeed.
pub struct AppointmentLifecycle {
    repository: Arc<dyn AppointmentRepository>,
    guard: Arc<BookingConflictGuard>,
    clock: Arc<dyn Clock>,
    rules: SchedulingRules,
    events: broadcast::Sender<AppointmentEvent>,
    appointment_locks: KeyedLocks<Uuid>,
}

impl AppointmentLifecycle {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        guard: Arc<BookingConflictGuard>,
        clock: Arc<dyn Clock>,
        rules: SchedulingRules,
        events: broadcast::Sender<AppointmentEvent>,
    ) -> Self {
        Self {
            repository,
            guard,
            clock,
            rules,
            events,
            appointment_locks: KeyedLocks::new(),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        self.repository.find_by_id(id).await?.ok_or(SchedulingError::NotFound)
    }

    /// Writes `appointment` only if storage still holds it in `loaded` status.
    async fn store(
        &self,
        appointment: Appointment,
        loaded: AppointmentStatus,
        action: &'static str,
    ) -> Result<Appointment, SchedulingError> {
        self.repository
            .update(appointment, loaded)
            .await
            .map_err(|err| match err {
                RepositoryError::StatusChanged(status) => {
                    SchedulingError::InvalidTransition { status, action }
                }
                other => other.into(),
            })
    }

    fn publish(&self, kind: AppointmentEventKind, appointment: &Appointment) {
        if self.events.send(AppointmentEvent::new(kind, appointment)).is_err() {
            debug!("No subscribers for {:?} event on {}", kind, appointment.id);
        }
    }

    pub async fn confirm(
        &self,
        id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        let _lock = self.appointment_locks.acquire(id).await;
        let mut appointment = self.load(id).await?;

        if appointment.status != AppointmentStatus::Pending {
            return Err(SchedulingError::InvalidTransition {
                status: appointment.status,
                action: "confirm",
            });
        }

        let now = Utc::now();
        appointment.status = AppointmentStatus::Confirmed;
        appointment.confirmed_by = Some(actor_id);
        appointment.confirmed_at = Some(now);
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = now;

        let stored = self
            .store(appointment, AppointmentStatus::Pending, "confirm")
            .await?;
        info!("Appointment {} confirmed by {}", id, actor_id);
        self.publish(AppointmentEventKind::Confirmed, &stored);
        Ok(stored)
    }

    pub async fn complete(&self, id: Uuid, notes: Option<String>) -> Result<Appointment, SchedulingError> {
        let _lock = self.appointment_locks.acquire(id).await;
        let mut appointment = self.load(id).await?;
        let loaded = appointment.status;
        ensure_transition(loaded, AppointmentStatus::Completed, "complete")?;

        appointment.status = AppointmentStatus::Completed;
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = Utc::now();

        let stored = self.store(appointment, loaded, "complete").await?;
        info!("Appointment {} completed", id);
        self.publish(AppointmentEventKind::Completed, &stored);
        Ok(stored)
    }

    /// Patients must give the configured notice. Other roles are exempt.
    pub async fn cancel(
        &self,
        id: Uuid,
        actor_id: Uuid,
        actor_role: ActorRole,
        reason: String,
    ) -> Result<Appointment, SchedulingError> {
        let _lock = self.appointment_locks.acquire(id).await;
        let mut appointment = self.load(id).await?;
        let loaded = appointment.status;
        ensure_transition(loaded, AppointmentStatus::Cancelled, "cancel")?;

        if actor_role == ActorRole::Patient {
            let notice = appointment.scheduled_start() - self.clock.now();
            if notice < self.rules.cancellation_notice() {
                debug!(
                    "Cancellation of {} refused: {} minutes of notice",
                    id,
                    notice.num_minutes()
                );
                return Err(SchedulingError::CancellationTooLate {
                    notice_hours: self.rules.cancellation_notice().num_hours(),
                });
            }
        }

        let now = Utc::now();
        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancel_reason = Some(reason);
        appointment.cancelled_by = Some(actor_id);
        appointment.cancelled_at = Some(now);
        appointment.updated_at = now;

        let stored = self.store(appointment, loaded, "cancel").await?;
        info!("Appointment {} cancelled by {} ({})", id, actor_id, actor_role);
        self.publish(AppointmentEventKind::Cancelled, &stored);
        Ok(stored)
    }

    /// Moves the appointment. Omitted fields keep their current value; an
    /// unchanged date and time returns the appointment as is.
    pub async fn reschedule(
        &self,
        id: Uuid,
        new_date: Option<NaiveDate>,
        new_start_time: Option<ClockTime>,
    ) -> Result<Appointment, SchedulingError> {
        let _lock = self.appointment_locks.acquire(id).await;
        let current = self.load(id).await?;
        ensure_editable(current.status, "reschedule")?;

        let date = new_date.unwrap_or(current.date);
        let start_time = new_start_time.unwrap_or(current.start_time);
        if date == current.date && start_time == current.start_time {
            debug!("Reschedule of {} changes nothing", id);
            return Ok(current);
        }
        if date < self.clock.today() {
            return Err(SchedulingError::Validation(
                "Cannot move an appointment into the past".to_string(),
            ));
        }

        let stored = self.guard.reserve_for_reschedule(&current, date, start_time).await?;
        self.publish(AppointmentEventKind::Rescheduled, &stored);
        Ok(stored)
    }

    pub async fn update_details(
        &self,
        id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let _lock = self.appointment_locks.acquire(id).await;
        let mut appointment = self.load(id).await?;
        let loaded = appointment.status;
        ensure_editable(loaded, "update")?;

        if request.reason.is_some() {
            appointment.reason = request.reason;
        }
        if request.notes.is_some() {
            appointment.notes = request.notes;
        }
        if let Some(appointment_type) = request.appointment_type {
            appointment.appointment_type = appointment_type;
        }
        appointment.updated_at = Utc::now();

        self.store(appointment, loaded, "update").await
    }
}

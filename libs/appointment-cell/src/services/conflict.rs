use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use availability_cell::{ClockTime, DayOfWeek, SlotGenerator};

use crate::error::{RepositoryError, SchedulingError};
use crate::models::{Appointment, AppointmentStatus, SlotHolder};
use crate::repository::AppointmentRepository;
use crate::services::locks::KeyedLocks;

/// Enforces that no doctor or patient calendar cell is booked twice.
///
/// Check-and-write runs under a per-(doctor, date) async lock on this node.
/// The repository enforces the same uniqueness on write, which covers other
/// nodes and patient cells shared across doctors. A lost insert race is
/// retried after recomputing the open slots.
pub struct BookingConflictGuard {
    repository: Arc<dyn AppointmentRepository>,
    slots: Arc<SlotGenerator>,
    day_locks: KeyedLocks<(Uuid, NaiveDate)>,
    retry_attempts: u32,
}

#[derive(Clone, Copy)]
enum WriteKind {
    Insert,
    /// Applies only while the stored row still has this status.
    Update(AppointmentStatus),
}

impl BookingConflictGuard {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        slots: Arc<SlotGenerator>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            repository,
            slots,
            day_locks: KeyedLocks::new(),
            retry_attempts,
        }
    }

    /// Store a new appointment in its requested cell.
    /// `end_time` is derived from the template that offered the slot.
    #[instrument(skip(self, appointment), fields(doctor_id = %appointment.doctor_id, date = %appointment.date, start_time = %appointment.start_time))]
    pub async fn reserve(&self, appointment: Appointment) -> Result<Appointment, SchedulingError> {
        let _day = self.day_locks.acquire((appointment.doctor_id, appointment.date)).await;
        let stored = self.place(appointment, None, WriteKind::Insert).await?;
        info!("Appointment {} reserved", stored.id);
        Ok(stored)
    }

    /// Move an existing appointment to a new date and start time.
    /// The appointment itself never counts as a conflict.
    #[instrument(skip(self, current), fields(appointment_id = %current.id))]
    pub async fn reserve_for_reschedule(
        &self,
        current: &Appointment,
        new_date: NaiveDate,
        new_start_time: ClockTime,
    ) -> Result<Appointment, SchedulingError> {
        let _day = self.day_locks.acquire((current.doctor_id, new_date)).await;

        let mut moved = current.clone();
        moved.date = new_date;
        moved.start_time = new_start_time;
        moved.updated_at = Utc::now();

        let stored = self
            .place(moved, Some(current.id), WriteKind::Update(current.status))
            .await?;
        info!(
            "Appointment {} moved from {} {} to {} {}",
            stored.id, current.date, current.start_time, stored.date, stored.start_time
        );
        Ok(stored)
    }

    async fn place(
        &self,
        mut appointment: Appointment,
        exclude: Option<Uuid>,
        write: WriteKind,
    ) -> Result<Appointment, SchedulingError> {
        let mut attempt = 0;
        loop {
            appointment.end_time = self.check(&appointment, exclude).await?;

            let result = match write {
                WriteKind::Insert => self.repository.insert(appointment.clone()).await,
                WriteKind::Update(expected) => self.repository.update(appointment.clone(), expected).await,
            };

            match result {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::UniqueViolation(key)) if attempt < self.retry_attempts => {
                    attempt += 1;
                    warn!("Lost race for {}, retrying ({}/{})", key, attempt, self.retry_attempts);
                }
                Err(RepositoryError::UniqueViolation(key)) => {
                    return Err(match key.holder {
                        SlotHolder::Doctor => SchedulingError::SlotUnavailable {
                            date: key.date,
                            start_time: key.start_time,
                        },
                        SlotHolder::Patient => SchedulingError::PatientConflict {
                            date: key.date,
                            start_time: key.start_time,
                        },
                    });
                }
                Err(RepositoryError::StatusChanged(status)) => {
                    return Err(SchedulingError::InvalidTransition { status, action: "reschedule" });
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Runs the read checks in order and returns the derived end time.
    /// A day without a template is a configuration gap, not a taken slot.
    async fn check(&self, appointment: &Appointment, exclude: Option<Uuid>) -> Result<ClockTime, SchedulingError> {
        let date = appointment.date;
        let start_time = appointment.start_time;

        let schedule = self
            .slots
            .day_schedule(appointment.doctor_id, date, exclude)
            .await?
            .ok_or_else(|| {
                SchedulingError::Validation(format!(
                    "Doctor has no availability configured for {}",
                    DayOfWeek::from_date(date)
                ))
            })?;
        if !schedule.is_open(start_time) {
            debug!("{} on {} is not among the open slots", start_time, date);
            return Err(SchedulingError::SlotUnavailable { date, start_time });
        }

        let doctor_key = appointment.slot_key(SlotHolder::Doctor);
        if self.repository.find_slot_holder(&doctor_key, exclude).await?.is_some() {
            return Err(SchedulingError::DoctorConflict { date, start_time });
        }

        let patient_key = appointment.slot_key(SlotHolder::Patient);
        if self.repository.find_slot_holder(&patient_key, exclude).await?.is_some() {
            return Err(SchedulingError::PatientConflict { date, start_time });
        }

        start_time
            .checked_add_minutes(schedule.template.slot_duration_minutes)
            .ok_or(SchedulingError::SlotUnavailable { date, start_time })
    }
}

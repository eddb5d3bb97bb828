use chrono::NaiveDate;
use thiserror::Error;

use availability_cell::{AvailabilityError, ClockTime, DayOfWeek};
use shared_database::supabase::DatabaseError;
use shared_models::error::AppError;

use crate::models::{AppointmentStatus, SlotHolder, SlotKey};

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Availability template not found")]
    TemplateNotFound,

    #[error("The time slot {start_time} on {date} is not available")]
    SlotUnavailable { date: NaiveDate, start_time: ClockTime },

    #[error("The doctor already has an appointment at {start_time} on {date}")]
    DoctorConflict { date: NaiveDate, start_time: ClockTime },

    #[error("The patient already has an appointment at {start_time} on {date}")]
    PatientConflict { date: NaiveDate, start_time: ClockTime },

    #[error("Appointments can only be cancelled at least {notice_hours} hours in advance")]
    CancellationTooLate { notice_hours: i64 },

    #[error("Cannot {action} an appointment that is {status}")]
    InvalidTransition { status: AppointmentStatus, action: &'static str },

    #[error("An active availability template already exists for {0}")]
    DuplicateTemplate(DayOfWeek),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures reported by appointment storage.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Calendar cell already taken: {0}")]
    UniqueViolation(SlotKey),

    #[error("Appointment not found")]
    NotFound,

    /// The stored status no longer matches the one the write was based on.
    #[error("Appointment status changed to {0} since it was read")]
    StatusChanged(AppointmentStatus),

    #[error("Storage failure: {0}")]
    Backend(String),
}

impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        RepositoryError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Backend(format!("malformed row: {}", err))
    }
}

impl From<RepositoryError> for SchedulingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueViolation(key) => match key.holder {
                SlotHolder::Doctor => SchedulingError::DoctorConflict {
                    date: key.date,
                    start_time: key.start_time,
                },
                SlotHolder::Patient => SchedulingError::PatientConflict {
                    date: key.date,
                    start_time: key.start_time,
                },
            },
            RepositoryError::NotFound => SchedulingError::NotFound,
            RepositoryError::StatusChanged(status) => SchedulingError::InvalidTransition {
                status,
                action: "update",
            },
            RepositoryError::Backend(msg) => SchedulingError::Storage(msg),
        }
    }
}

impl From<AvailabilityError> for SchedulingError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Validation(msg) => SchedulingError::Validation(msg),
            AvailabilityError::NotFound => SchedulingError::TemplateNotFound,
            AvailabilityError::DuplicateTemplate(day) => SchedulingError::DuplicateTemplate(day),
            AvailabilityError::Storage(msg) => SchedulingError::Storage(msg),
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Validation(msg) => AppError::ValidationError(msg),
            SchedulingError::NotFound | SchedulingError::TemplateNotFound => {
                AppError::NotFound(err.to_string())
            }
            SchedulingError::SlotUnavailable { .. }
            | SchedulingError::DoctorConflict { .. }
            | SchedulingError::PatientConflict { .. }
            | SchedulingError::InvalidTransition { .. }
            | SchedulingError::DuplicateTemplate(_) => AppError::Conflict(err.to_string()),
            SchedulingError::CancellationTooLate { .. } => AppError::Unprocessable(err.to_string()),
            SchedulingError::Storage(msg) => AppError::Database(msg),
        }
    }
}

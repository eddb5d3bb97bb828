// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use availability_cell::ClockTime;
use shared_config::{AppConfig, MAX_CANCELLATION_NOTICE_HOURS};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// No lifecycle operation leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Every status except cancelled keeps its calendar cell taken.
    pub fn holds_slot(self) -> bool {
        self != AppointmentStatus::Cancelled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    InPerson,
    Online,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Local wall-clock instant the appointment starts at.
    pub fn scheduled_start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time.to_naive_time())
    }

    pub fn slot_key(&self, holder: SlotHolder) -> SlotKey {
        SlotKey {
            holder,
            holder_id: match holder {
                SlotHolder::Doctor => self.doctor_id,
                SlotHolder::Patient => self.patient_id,
            },
            date: self.date,
            start_time: self.start_time,
        }
    }
}

/// Which side of an appointment a calendar cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotHolder {
    Doctor,
    Patient,
}

/// A (holder, date, start time) calendar cell. At most one non-cancelled
/// appointment may occupy each cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub holder: SlotHolder,
    pub holder_id: Uuid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
}

impl SlotKey {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        appointment.status.holds_slot() && appointment.slot_key(self.holder) == *self
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let holder = match self.holder {
            SlotHolder::Doctor => "doctor",
            SlotHolder::Patient => "patient",
        };
        write!(f, "{} {} at {} {}", holder, self.holder_id, self.date, self.start_time)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub appointment_type: Option<AppointmentType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentNotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl AppointmentSearchQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.status.map_or(true, |status| appointment.status == status)
            && self.date_from.map_or(true, |from| appointment.date >= from)
            && self.date_to.map_or(true, |to| appointment.date <= to)
    }
}

// ==============================================================================
// EVENTS & RULES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventKind {
    Booked,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
}

/// Published after a lifecycle change is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub kind: AppointmentEventKind,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub occurred_at: DateTime<Utc>,
}

impl AppointmentEvent {
    pub fn new(kind: AppointmentEventKind, appointment: &Appointment) -> Self {
        Self {
            kind,
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            date: appointment.date,
            start_time: appointment.start_time,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    /// Patients must cancel at least this many hours ahead.
    pub cancellation_notice_hours: i64,
    /// Extra attempts after losing an insert race.
    pub reserve_retry_attempts: u32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            cancellation_notice_hours: 24,
            reserve_retry_attempts: 1,
        }
    }
}

impl SchedulingRules {
    /// Notice window, bounded to `0..=MAX_CANCELLATION_NOTICE_HOURS`.
    pub fn cancellation_notice(&self) -> Duration {
        Duration::hours(self.cancellation_notice_hours.clamp(0, MAX_CANCELLATION_NOTICE_HOURS))
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cancellation_notice_hours: config.cancellation_notice_hours,
            reserve_retry_attempts: config.booking_race_retries,
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use availability_cell::{AvailabilityError, BookedSlotSource, ClockTime};

use crate::error::RepositoryError;
use crate::models::{Appointment, AppointmentSearchQuery, AppointmentStatus, SlotKey};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryAppointmentRepository;
pub use supabase::SupabaseAppointmentRepository;

/// Storage port for appointments.
///
/// `insert` and `update` must refuse to let two non-cancelled appointments
/// share a doctor cell or a patient cell, reporting `UniqueViolation`.
/// `update` only applies while the stored status still equals `expected`,
/// otherwise it reports `StatusChanged` with the status found.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, RepositoryError>;

    /// Matches sorted by date then start time.
    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, RepositoryError>;

    /// The non-cancelled appointment occupying `key`, if any.
    async fn find_slot_holder(
        &self,
        key: &SlotKey,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, RepositoryError>;

    async fn booked_start_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ClockTime>, RepositoryError>;

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError>;

    async fn update(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, RepositoryError>;
}

/// Feeds booked appointments into slot generation.
pub struct AppointmentBookings {
    repository: Arc<dyn AppointmentRepository>,
}

impl AppointmentBookings {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl BookedSlotSource for AppointmentBookings {
    async fn booked_start_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ClockTime>, AvailabilityError> {
        self.repository
            .booked_start_times(doctor_id, date, exclude)
            .await
            .map_err(|e| AvailabilityError::Storage(e.to_string()))
    }
}

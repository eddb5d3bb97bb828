use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AvailabilityError, AvailabilityTemplate, DayOfWeek};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryAvailabilityRepository;
pub use supabase::SupabaseAvailabilityRepository;

/// Storage port for weekly templates.
///
/// Implementations enforce at most one active template per (doctor, day) on
/// both `insert` and `save`, reporting `DuplicateTemplate` otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn insert(&self, template: AvailabilityTemplate) -> Result<AvailabilityTemplate, AvailabilityError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AvailabilityTemplate>, AvailabilityError>;

    async fn find_active(
        &self,
        doctor_id: Uuid,
        day_of_week: DayOfWeek,
    ) -> Result<Option<AvailabilityTemplate>, AvailabilityError>;

    async fn list_active_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityTemplate>, AvailabilityError>;

    async fn save(&self, template: AvailabilityTemplate) -> Result<AvailabilityTemplate, AvailabilityError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, AvailabilityError>;
}

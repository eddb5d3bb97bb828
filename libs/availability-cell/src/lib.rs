pub mod handlers;
pub mod models;
pub mod repository;
pub mod router;
pub mod services;
pub mod validation;

pub use models::*;
pub use repository::{AvailabilityRepository, InMemoryAvailabilityRepository, SupabaseAvailabilityRepository};
pub use router::{availability_routes, AvailabilityState};
pub use services::{AvailabilityService, BookedSlotSource, NoBookedSlots, SlotGenerator};

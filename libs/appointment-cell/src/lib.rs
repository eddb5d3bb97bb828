pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod router;
pub mod services;

pub use error::{RepositoryError, SchedulingError};
pub use models::*;
pub use repository::{AppointmentRepository, InMemoryAppointmentRepository, SupabaseAppointmentRepository};
pub use router::{appointment_routes, AppointmentState};
pub use services::{FixedClock, SchedulingService, SystemClock};

pub mod clock;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod scheduling;

pub use clock::{Clock, FixedClock, SystemClock};
pub use conflict::BookingConflictGuard;
pub use lifecycle::AppointmentLifecycle;
pub use scheduling::SchedulingService;

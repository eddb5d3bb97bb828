pub mod availability;
pub mod slots;

pub use availability::AvailabilityService;
pub use slots::{generate_time_slots, BookedSlotSource, NoBookedSlots, SlotGenerator};

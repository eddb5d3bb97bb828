use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, AppointmentState, SchedulingService};
use availability_cell::{availability_routes, AvailabilityState};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, scheduling: Arc<SchedulingService>) -> Router {
    let availability = AvailabilityState {
        config: Arc::clone(&config),
        availability: scheduling.availability_service(),
        slots: scheduling.slot_generator(),
    };
    let appointments = AppointmentState { config, scheduling };

    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .merge(availability_routes(availability))
        .nest("/appointments", appointment_routes(appointments))
}

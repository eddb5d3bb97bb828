use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{AvailabilityService, SlotGenerator};

#[derive(Clone)]
pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub availability: Arc<AvailabilityService>,
    pub slots: Arc<SlotGenerator>,
}

pub fn availability_routes(state: AvailabilityState) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/doctors/{doctor_id}/availability", get(handlers::list_availability))
        .route("/doctors/{doctor_id}/available-slots", get(handlers::get_available_slots));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/doctors/{doctor_id}/availability", post(handlers::create_availability))
        .route(
            "/availability/{template_id}",
            get(handlers::get_availability)
                .put(handlers::update_availability)
                .delete(handlers::delete_availability),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

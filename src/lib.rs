pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod time;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let business = Router::new()
        .route(
            "/appointments",
            get(handlers::appointments::list_appointments)
                .post(handlers::appointments::create_appointment),
        )
        .route(
            "/appointments/:external_id",
            patch(handlers::appointments::update_appointment),
        )
        .route(
            "/appointments/:external_id/cancel",
            post(handlers::appointments::cancel_appointment),
        )
        .route(
            "/appointments/:external_id/history",
            get(handlers::appointments::get_history),
        )
        .route("/slots", get(handlers::availability::get_slots))
        .route(
            "/available-dates",
            get(handlers::availability::get_available_dates),
        )
        .route(
            "/hours",
            get(handlers::business::get_hours).put(handlers::business::put_hours),
        )
        .route(
            "/services",
            get(handlers::business::get_services).put(handlers::business::put_services),
        )
        .route(
            "/settings",
            get(handlers::business::get_settings).put(handlers::business::put_settings),
        )
        .route(
            "/blocked-slots",
            get(handlers::business::get_blocked_slots)
                .post(handlers::business::create_blocked_slot),
        )
        .route("/events", get(handlers::events::events_stream));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/ssa", post(handlers::webhook::ssa_webhook))
        .nest("/api/businesses/:id", business)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

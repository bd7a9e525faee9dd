//! Portal Backend
//!
//! REST backend for the internal administration portal, with SQLite
//! persistence and a client-side optimistic mutation layer.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod sync;

use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Meetings (nested aggregate: agenda points and their completion notes)
        .route("/meetings", get(api::list_meetings))
        .route("/meetings", post(api::create_meeting))
        .route("/meetings/{id}", get(api::get_meeting))
        .route("/meetings/{id}", patch(api::update_meeting))
        .route("/meetings/{id}", delete(api::delete_meeting))
        // Tasks (flat entity, whitelist PATCH)
        .route("/tasks", get(api::list_tasks))
        .route("/tasks", post(api::create_task))
        .route("/tasks/{id}", get(api::get_task))
        .route("/tasks/{id}", patch(api::update_task))
        .route("/tasks/{id}", delete(api::delete_task));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

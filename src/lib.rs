//! LMS account provisioning for phishing-simulation groups.
//!
//! The server half stores groups and their targets and runs bulk LMS account jobs in
//! the background. The client half ([`coordinator`]) submits those jobs and polls them
//! to completion on behalf of a dashboard.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use db::Repository;
use jobs::JobRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub jobs: JobRegistry,
    pub config: Arc<ServerConfig>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_keys = Arc::new(state.config.api_keys.clone());

    let api_routes = Router::new()
        // Groups
        .route("/groups", get(api::list_groups).post(api::create_group))
        .route(
            "/groups/{id}",
            get(api::get_group)
                .put(api::update_group)
                .delete(api::delete_group),
        )
        // LMS accounts
        .route(
            "/groups/{id}/lms-accounts",
            post(api::create_lms_accounts).delete(api::delete_lms_accounts),
        )
        .route(
            "/groups/{id}/lms-accounts/jobs/{job_id}",
            get(api::get_lms_job),
        )
        .layer(middleware::from_fn(move |req, next| {
            auth::api_key_layer(api_keys.clone(), req, next)
        }));

    // Health check (no auth required)
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

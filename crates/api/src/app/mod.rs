//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the shared reconciliation engine
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
}

/// Router over a fresh in-memory ledger (dev/test).
pub fn build_in_memory_app() -> Router {
    build_app(Arc::new(AppServices::in_memory()))
}

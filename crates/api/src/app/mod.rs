//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage, publisher and reindex runner wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router from the environment (entrypoint for `main.rs`).
pub async fn build_app() -> Router {
    let services = Arc::new(services::build_services().await);
    build_app_with(services)
}

/// Build the router over already-wired services.
pub fn build_app_with(services: Arc<services::AppServices>) -> Router {
    // Tenant-scoped routes: require a valid x-tenant header.
    let tenant_scoped = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::tenant_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(tenant_scoped)
        .layer(ServiceBuilder::new())
}

use axum::Router;

pub mod records;
pub mod reindex;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/records", records::router())
        .nest("/reindex", reindex::router())
}

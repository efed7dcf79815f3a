use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use recordstore_infra::reindex::ReindexJobId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_reindex))
        .route("/:id", get(get_reindex_job).delete(cancel_reindex_job))
}

pub async fn submit_reindex(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    match services.submit_reindex(tenant.tenant_id()) {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => errors::reindex_error_to_response(e),
    }
}

pub async fn get_reindex_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ReindexJobId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id");
        }
    };

    match services.get_reindex_job(id) {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        Err(e) => errors::repository_error_to_response(e),
    }
}

pub async fn cancel_reindex_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ReindexJobId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id");
        }
    };

    match services.cancel_reindex_job(tenant.tenant_id(), id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::reindex_error_to_response(e),
    }
}

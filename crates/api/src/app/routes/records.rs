use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use recordstore_core::RecordId;
use recordstore_infra::records::Record;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_record))
        .route("/:id", get(get_record).put(update_record).delete(delete_record))
}

pub async fn create_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::CreateRecordRequest>,
) -> axum::response::Response {
    let record = Record::new(body.id.unwrap_or_else(RecordId::new), body.data);

    match services.create_record(tenant.tenant_id(), record) {
        Ok(created) => {
            (StatusCode::CREATED, Json(dto::record_to_json(&created))).into_response()
        }
        Err(e) => errors::record_error_to_response(e),
    }
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RecordId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid record id");
        }
    };

    match services.get_record(tenant.tenant_id(), id) {
        Ok(Some(record)) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "record not found"),
        Err(e) => errors::record_error_to_response(e),
    }
}

pub async fn update_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateRecordRequest>,
) -> axum::response::Response {
    let id: RecordId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid record id");
        }
    };

    match services.update_record(tenant.tenant_id(), Record::new(id, body.data)) {
        Ok(updated) => (StatusCode::OK, Json(dto::record_to_json(&updated))).into_response(),
        Err(e) => errors::record_error_to_response(e),
    }
}

pub async fn delete_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RecordId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid record id");
        }
    };

    match services.delete_record(tenant.tenant_id(), id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::record_error_to_response(e),
    }
}

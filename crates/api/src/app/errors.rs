use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use recordstore_infra::records::RecordStoreError;
use recordstore_infra::reindex::{ReindexError, RepositoryError};

pub fn record_error_to_response(err: RecordStoreError) -> axum::response::Response {
    match err {
        RecordStoreError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        RecordStoreError::AlreadyExists(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        RecordStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn reindex_error_to_response(err: ReindexError) -> axum::response::Response {
    match err {
        ReindexError::NotInProgress(_) | ReindexError::AlreadyRunning(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        ReindexError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ReindexError::Repository(e) => repository_error_to_response(e),
        ReindexError::Source(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "source_error", e.to_string())
        }
    }
}

pub fn repository_error_to_response(err: RepositoryError) -> axum::response::Response {
    match err {
        RepositoryError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        RepositoryError::AlreadyExists(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        RepositoryError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

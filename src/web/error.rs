use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            WebError::Storage(e) => {
                error!(error = %e, "Storage error while serving request.");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {e}"))
            }
            WebError::Template(e) => {
                error!(error = ?e, "Template rendering failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {e}"))
            }
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

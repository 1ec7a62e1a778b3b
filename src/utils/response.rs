use axum::{
    extract::rejection::JsonRejection,
    extract::FromRequest,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::engine::EngineError;

/// JSON extractor whose rejection is an [`AppError`].
///
/// Axum's own `Json` rejects undeserializable bodies with 422; malformed
/// requests are validation failures here and must surface as 400.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Application error type
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request("INVALID_REQUEST", &rejection.body_text())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidQuantity(_) => {
                AppError::bad_request("INVALID_QUANTITY", &err.to_string())
            }
            EngineError::InvalidPrice(_) => {
                AppError::bad_request("INVALID_PRICE", &err.to_string())
            }
            EngineError::NotPending(_) => {
                AppError::bad_request("ORDER_NOT_PENDING", &err.to_string())
            }
            // Invariant breaches inside the engine; never expected in
            // normal operation.
            EngineError::DuplicateOrder(_) | EngineError::Overfill { .. } => {
                tracing::error!(error = %err, "engine invariant breach");
                AppError::internal(&err.to_string())
            }
        }
    }
}

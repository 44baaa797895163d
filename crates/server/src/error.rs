use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tessera_core::error::CoreError;
use tessera_core::protocol::{codes, ErrorBody};

/// Application-level error type for RPC handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error bodies, which
/// clients surface as remote faults.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::Render(msg) => {
                    tracing::warn!(error = %msg, "Render failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, codes::RENDER_ERROR, msg.clone())
                }
                CoreError::Resource(msg) => {
                    tracing::error!(error = %msg, "Resource error");
                    (StatusCode::INTERNAL_SERVER_ERROR, codes::RESOURCE_ERROR, msg.clone())
                }
                CoreError::InvalidState(msg) => {
                    (StatusCode::CONFLICT, codes::INVALID_STATE, msg.clone())
                }
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, codes::BAD_REQUEST, msg.clone())
                }
                other => {
                    tracing::error!(error = %other, "Unexpected error in RPC handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        codes::INTERNAL_ERROR,
                        "An internal error occurred".to_string(),
                    )
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, codes::BAD_REQUEST, msg.clone()),
        };

        let body = ErrorBody {
            error: message,
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Malformed or mistyped request bodies answer 400 like any other bad input.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        match &self {
            AppError::InvalidInput(_) | AppError::NotFound => {
                tracing::debug!(error = ?self, "Request rejected")
            }
            _ => tracing::error!(error = ?self, "Request failed"),
        }

        match self {
            AppError::Database(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DatabaseError,
                None,
            ),
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::SignatureInvalid => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::SignatureInvalid, None)
            }
            AppError::DuplicateOrder(_) => {
                error_resp(StatusCode::CONFLICT, ErrorCode::DuplicateOrder, None)
            }
            err @ AppError::ConflictingTransition { .. } => error_resp(
                StatusCode::CONFLICT,
                ErrorCode::ConflictingTransition,
                Some(err.to_string()),
            ),
            err @ AppError::IllegalTransition { .. } => error_resp(
                StatusCode::CONFLICT,
                ErrorCode::IllegalTransition,
                Some(err.to_string()),
            ),
            err @ AppError::RefundInProgress(_) => error_resp(
                StatusCode::CONFLICT,
                ErrorCode::RefundInProgress,
                Some(err.to_string()),
            ),
            AppError::GatewayUnreachable(_) => error_resp(
                StatusCode::BAD_GATEWAY,
                ErrorCode::GatewayUnreachable,
                None,
            ),
            AppError::GatewayRejected(msg) => error_resp(
                StatusCode::BAD_GATEWAY,
                ErrorCode::GatewayRejected,
                Some(msg),
            ),
            AppError::ProviderNotConfigured => error_resp(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ProviderNotConfigured,
                None,
            ),
            AppError::ProviderNotSupported(msg) => error_resp(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::ProviderNotSupported,
                Some(msg),
            ),
            AppError::Internal(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                None,
            ),
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}

//! Provider callback (IPN) endpoints.

use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    domain::entities::payment_provider::PaymentProvider,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{provider}", post(handle_webhook))
}

/// Header names a provider may carry its callback secret in
const SIGNATURE_HEADERS: &[&str] = &["x-signature", "x-secret-key"];

/// Determines if a callback processing error should make the provider retry.
///
/// Returns `true` for transient failures, answered with 500.
///
/// Returns `false` for outcomes a retry cannot change (unknown order,
/// conflicting report, illegal edge), answered with 200 and logged.
fn is_retryable_error(error: &AppError) -> bool {
    match error {
        AppError::Database(_) => true,
        AppError::Internal(_) => true,

        AppError::InvalidInput(_) => false,
        AppError::NotFound => false,
        AppError::SignatureInvalid => false,
        AppError::DuplicateOrder(_) => false,
        AppError::ConflictingTransition { .. } => false,
        AppError::IllegalTransition { .. } => false,
        AppError::GatewayUnreachable(_) => false,
        AppError::GatewayRejected(_) => false,
        AppError::ProviderNotConfigured => false,
        AppError::ProviderNotSupported(_) => false,
        AppError::RefundInProgress(_) => false,
    }
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

/// POST /webhooks/{provider}
async fn handle_webhook(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Response> {
    let provider = PaymentProvider::from_str(&provider).map_err(|_| AppError::NotFound)?;

    let outcome = app_state
        .payments
        .handle_callback(provider, &body, signature_header(&headers))
        .await;

    match outcome {
        Ok(record) => {
            info!(
                order_id = %record.order_id,
                provider = %provider,
                status = %record.status,
                "Callback processed"
            );
            Ok(Json(json!({ "ok": true })).into_response())
        }
        Err(AppError::SignatureInvalid) => Err(AppError::SignatureInvalid),
        Err(e) if is_retryable_error(&e) => {
            error!(
                error = %e,
                provider = %provider,
                retryable = true,
                "Callback processing failed, returning 500 for provider retry"
            );
            Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            warn!(
                error = %e,
                provider = %provider,
                retryable = false,
                "Callback acknowledged without a ledger change"
            );
            Ok(Json(json!({ "ok": false })).into_response())
        }
    }
}

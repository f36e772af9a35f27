use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    domain::entities::{payment_provider::PaymentProvider, transaction_status::TransactionStatus},
    use_cases::payment::CreatePaymentInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_payment))
        .route("/{order_id}/status", get(get_status))
        .route("/{order_id}/refund", post(refund_payment))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentPayload {
    user_id: Uuid,
    planning_id: Uuid,
    amount: i64,
    #[serde(default)]
    description: String,
    provider: Option<PaymentProvider>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentResponse {
    order_id: Uuid,
    checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    form_fields: Option<BTreeMap<String, String>>,
}

/// POST /payments
async fn create_payment(
    State(app_state): State<AppState>,
    payload: Result<Json<CreatePaymentPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = payload?;
    let checkout = app_state
        .payments
        .create_payment(CreatePaymentInput {
            user_id: payload.user_id,
            planning_id: payload.planning_id,
            amount: payload.amount,
            description: payload.description,
            provider: payload.provider,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            order_id: checkout.order_id,
            checkout_url: checkout.checkout_url,
            form_fields: checkout.form_fields,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentStatusResponse {
    order_id: Uuid,
    status: TransactionStatus,
    amount: i64,
    provider: PaymentProvider,
}

/// GET /payments/{order_id}/status
async fn get_status(
    State(app_state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = app_state.payments.check_status(order_id).await?;

    Ok(Json(PaymentStatusResponse {
        order_id: record.order_id,
        status: record.status,
        amount: record.amount,
        provider: record.provider,
    }))
}

#[derive(Deserialize)]
struct RefundPayload {
    amount: Option<i64>,
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundResponse {
    order_id: Uuid,
    status: TransactionStatus,
}

/// POST /payments/{order_id}/refund
async fn refund_payment(
    State(app_state): State<AppState>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<RefundPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = payload?;
    let record = app_state
        .payments
        .refund(order_id, payload.amount, payload.reason)
        .await?;

    Ok(Json(RefundResponse {
        order_id: record.order_id,
        status: record.status,
    }))
}

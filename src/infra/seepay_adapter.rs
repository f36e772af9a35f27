//! SeePay hosted-checkout gateway.
//!
//! Payment creation is local: the adapter signs a form the client POSTs to
//! SeePay's checkout page. Order lookups and refunds use the REST API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CheckoutResult, GatewayPaymentRequest, GatewayRefundRequest, GatewayResult,
        PaymentGatewayPort,
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::SeePayConfig,
        gateway_signing::{hmac_sha256_base64, join_pairs},
        http_client::{RetryPolicy, send_json},
    },
};

const CURRENCY: &str = "VND";
const OPERATION: &str = "PURCHASE";

/// Form fields covered by the checkout signature, in signing order.
const SIGNED_FIELDS: &[&str] = &[
    "merchant",
    "operation",
    "payment_method",
    "order_amount",
    "currency",
    "order_invoice_number",
    "order_description",
    "customer_id",
    "success_url",
    "error_url",
    "cancel_url",
];

pub struct SeePayAdapter {
    client: Client,
    checkout_url: Url,
    api_url: Url,
    merchant_id: String,
    secret_key: SecretString,
    success_url: String,
    error_url: String,
    cancel_url: String,
}

impl SeePayAdapter {
    pub fn new(client: Client, config: &SeePayConfig, return_url: &str) -> Self {
        Self {
            client,
            checkout_url: config.checkout_url.clone(),
            api_url: config.api_url.clone(),
            merchant_id: config.merchant_id.clone(),
            secret_key: SecretString::new(config.secret_key.expose_secret().into()),
            success_url: format!("{return_url}?result=success"),
            error_url: format!("{return_url}?result=error"),
            cancel_url: format!("{return_url}?result=cancel"),
        }
    }

    /// SeePay invoice number for a canonical order
    pub fn invoice_number(order_id: Uuid) -> String {
        format!("PLN{}", order_id.simple()).to_uppercase()
    }

    /// Build the signed checkout form for an order.
    fn checkout_form(&self, request: &GatewayPaymentRequest) -> AppResult<BTreeMap<String, String>> {
        let mut fields = BTreeMap::from([
            ("merchant".to_string(), self.merchant_id.clone()),
            ("operation".to_string(), OPERATION.to_string()),
            ("order_amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), CURRENCY.to_string()),
            (
                "order_invoice_number".to_string(),
                Self::invoice_number(request.order_id),
            ),
            ("order_description".to_string(), request.description.clone()),
            ("customer_id".to_string(), request.user_id.to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("error_url".to_string(), self.error_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ]);
        let signature = self.sign_form(&fields)?;
        fields.insert("signature".to_string(), signature);
        Ok(fields)
    }

    fn sign_form(&self, fields: &BTreeMap<String, String>) -> AppResult<String> {
        let pairs = SIGNED_FIELDS
            .iter()
            .filter_map(|name| fields.get(*name).map(|v| (*name, v.as_str())));
        hmac_sha256_base64(self.secret_key.expose_secret(), &join_pairs(pairs, ","))
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        self.api_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid SeePay API URL: {e}")))
    }
}

// ============================================================================
// SeePay wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderDetail {
    order_invoice_number: Option<String>,
    order_status: Option<String>,
    #[serde(default)]
    transactions: Vec<OrderTransaction>,
}

#[derive(Debug, Deserialize)]
struct OrderTransaction {
    transaction_id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    order_invoice_number: &'a str,
    refund_amount: i64,
    refund_reason: &'a str,
}

fn render_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PaymentGatewayPort for SeePayAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::SeePay
    }

    fn validate(&self, request: &GatewayPaymentRequest) -> AppResult<()> {
        if request.amount <= 0 {
            return Err(AppError::InvalidInput("SeePay amount must be positive".into()));
        }
        if request.description.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "SeePay requires an order description".into(),
            ));
        }
        Ok(())
    }

    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<CheckoutResult> {
        self.validate(request)?;

        let form_fields = self.checkout_form(request)?;
        Ok(CheckoutResult {
            checkout_url: self.checkout_url.to_string(),
            provider_order_ref: Self::invoice_number(request.order_id),
            form_fields: Some(form_fields),
        })
    }

    fn parse_callback(&self, raw_payload: &str) -> AppResult<GatewayResult> {
        let body: Value = serde_json::from_str(raw_payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed SeePay IPN: {e}")))?;
        let order = body
            .get("order")
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::InvalidInput("SeePay IPN missing order".into()))?;

        let invoice = order
            .get("order_invoice_number")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidInput("SeePay IPN missing invoice number".into()))?;
        let status = order
            .get("order_status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let transaction_id = body
            .get("transaction")
            .and_then(|t| t.get("transaction_id"))
            .and_then(render_id);

        Ok(GatewayResult::from_raw(PaymentProvider::SeePay, status, invoice)
            .with_transaction_id(transaction_id))
    }

    async fn query_status(&self, provider_order_ref: &str) -> AppResult<GatewayResult> {
        let url = self.url(&format!("/v1/order/detail/{provider_order_ref}"))?;
        let envelope: Envelope<OrderDetail> = send_json("seepay", RetryPolicy::IDEMPOTENT, || {
            self.client
                .get(url.clone())
                .basic_auth(&self.merchant_id, Some(self.secret_key.expose_secret()))
        })
        .await?;

        let detail = envelope.data.ok_or_else(|| {
            AppError::GatewayRejected(format!(
                "SeePay returned no order: {}",
                envelope.message.unwrap_or_default()
            ))
        })?;
        if let Some(invoice) = &detail.order_invoice_number {
            if invoice != provider_order_ref {
                return Err(AppError::GatewayRejected(format!(
                    "SeePay returned order {invoice}, expected {provider_order_ref}"
                )));
            }
        }

        let transaction_id = detail
            .transactions
            .iter()
            .find_map(|t| t.transaction_id.as_ref().and_then(render_id));
        Ok(GatewayResult::from_raw(
            PaymentProvider::SeePay,
            detail.order_status.unwrap_or_default(),
            provider_order_ref,
        )
        .with_transaction_id(transaction_id))
    }

    async fn refund(&self, request: &GatewayRefundRequest) -> AppResult<GatewayResult> {
        let url = self.url("/v1/order/refund")?;
        let body = RefundRequest {
            order_invoice_number: &request.provider_order_ref,
            refund_amount: request.amount,
            refund_reason: &request.reason,
        };
        let envelope: Envelope<OrderDetail> = send_json("seepay", RetryPolicy::SINGLE, || {
            self.client
                .post(url.clone())
                .basic_auth(&self.merchant_id, Some(self.secret_key.expose_secret()))
                .json(&body)
        })
        .await?;

        let status = envelope
            .data
            .and_then(|d| d.order_status)
            .unwrap_or_default();
        Ok(GatewayResult::from_raw(
            PaymentProvider::SeePay,
            status,
            &request.provider_order_ref,
        )
        .with_message(envelope.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::transaction_status::TransactionStatus;
    use crate::infra::http_client::build_client;
    use std::time::Duration;

    fn adapter() -> SeePayAdapter {
        SeePayAdapter::new(
            build_client(Duration::from_secs(1)).unwrap(),
            &SeePayConfig {
                checkout_url: "https://pay.seepay.test/v1/checkout/init".parse().unwrap(),
                api_url: "http://127.0.0.1:9".parse().unwrap(),
                merchant_id: "SP-TEST".into(),
                secret_key: SecretString::new("secret".into()),
                ipn_secret: SecretString::new("ipn".into()),
            },
            "https://app.test/payments/return",
        )
    }

    fn request() -> GatewayPaymentRequest {
        GatewayPaymentRequest {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            planning_id: Uuid::new_v4(),
            amount: 100_000,
            description: "Pro Monthly".into(),
        }
    }

    #[tokio::test]
    async fn create_payment_returns_signed_form_without_network() {
        let seepay = adapter();
        let req = request();

        let checkout = seepay.create_payment(&req).await.unwrap();

        let fields = checkout.form_fields.unwrap();
        assert_eq!(checkout.checkout_url, "https://pay.seepay.test/v1/checkout/init");
        assert_eq!(checkout.provider_order_ref, SeePayAdapter::invoice_number(req.order_id));
        assert_eq!(fields["order_amount"], "100000");
        assert_eq!(fields["merchant"], "SP-TEST");

        let mut unsigned = fields.clone();
        let signature = unsigned.remove("signature").unwrap();
        assert_eq!(signature, seepay.sign_form(&unsigned).unwrap());
    }

    #[test]
    fn form_signature_covers_amount() {
        let seepay = adapter();
        let req = request();
        let mut fields = seepay.checkout_form(&req).unwrap();
        let original = fields.remove("signature").unwrap();

        fields.insert("order_amount".into(), "1".into());

        assert_ne!(original, seepay.sign_form(&fields).unwrap());
    }

    #[test]
    fn parse_ipn_reads_order_and_transaction() {
        let payload = r#"{"timestamp":1759134682,"notification_type":"ORDER_PAID",
            "order":{"order_id":"e2c1","order_status":"CAPTURED","order_amount":"100000.00",
            "order_invoice_number":"PLNABC"},
            "transaction":{"transaction_id":"384c66dd","transaction_status":"APPROVED"}}"#;

        let result = adapter().parse_callback(payload).unwrap();

        assert_eq!(result.provider_order_ref, "PLNABC");
        assert_eq!(result.canonical_status, TransactionStatus::Success);
        assert_eq!(result.provider_transaction_id.as_deref(), Some("384c66dd"));
    }

    #[test]
    fn parse_ipn_without_status_fails_closed() {
        let payload = r#"{"order":{"order_invoice_number":"PLNABC"}}"#;

        let result = adapter().parse_callback(payload).unwrap();

        assert_eq!(result.canonical_status, TransactionStatus::Failed);
        assert!(result.unmapped_code);
    }
}

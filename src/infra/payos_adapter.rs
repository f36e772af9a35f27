//! PayOS payment-link gateway.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CheckoutResult, GatewayPaymentRequest, GatewayRefundRequest, GatewayResult,
        PaymentGatewayPort,
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::PayOsConfig,
        gateway_signing::{hmac_sha256_hex, join_pairs},
        http_client::{RetryPolicy, send_json},
    },
};

const MAX_DESCRIPTION_CHARS: usize = 25;
const SUCCESS_CODE: &str = "00";

pub struct PayOsAdapter {
    client: Client,
    endpoint: Url,
    client_id: String,
    api_key: SecretString,
    checksum_key: SecretString,
    return_url: String,
    cancel_url: String,
}

impl PayOsAdapter {
    pub fn new(client: Client, config: &PayOsConfig, return_url: String, cancel_url: String) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
            api_key: SecretString::new(config.api_key.expose_secret().into()),
            checksum_key: SecretString::new(config.checksum_key.expose_secret().into()),
            return_url,
            cancel_url,
        }
    }

    /// Positive integer order code: clock millis plus a random suffix.
    fn generate_order_code() -> i64 {
        let millis = Utc::now().timestamp_millis() % 1_000_000_000_000;
        millis * 1_000 + (rand::random::<u16>() % 1_000) as i64
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid PayOS endpoint: {e}")))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&CreateRequest<'_>>,
        policy: RetryPolicy,
    ) -> AppResult<Envelope<T>> {
        let url = self.url(path)?;
        let envelope: Envelope<T> = send_json("payos", policy, || {
            let builder = self
                .client
                .request(method.clone(), url.clone())
                .header("x-client-id", &self.client_id)
                .header("x-api-key", self.api_key.expose_secret());
            match body {
                Some(body) => builder.json(body),
                None => builder,
            }
        })
        .await?;

        if envelope.code != SUCCESS_CODE {
            return Err(AppError::GatewayRejected(format!(
                "PayOS error {}: {}",
                envelope.code,
                envelope.desc.clone().unwrap_or_default()
            )));
        }
        Ok(envelope)
    }
}

/// Signature PayOS puts on webhooks: HMAC over the `data` object with keys
/// sorted and nulls rendered empty.
pub fn payos_data_signature(checksum_key: &str, data: &Map<String, Value>) -> AppResult<String> {
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    let values: Vec<String> = keys.iter().map(|k| render_value(&data[k.as_str()])).collect();
    let pairs = keys
        .iter()
        .zip(values.iter())
        .map(|(k, v)| (k.as_str(), v.as_str()));
    hmac_sha256_hex(checksum_key, &join_pairs(pairs, "&"))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// PayOS wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    desc: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    order_code: i64,
    amount: i64,
    description: &'a str,
    return_url: &'a str,
    cancel_url: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentLinkData {
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentInfoData {
    order_code: Value,
    status: String,
    #[serde(default)]
    transactions: Vec<PaymentInfoTransaction>,
}

#[derive(Debug, Deserialize)]
struct PaymentInfoTransaction {
    reference: Option<String>,
}

#[async_trait]
impl PaymentGatewayPort for PayOsAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::PayOs
    }

    fn validate(&self, request: &GatewayPaymentRequest) -> AppResult<()> {
        if request.amount <= 0 {
            return Err(AppError::InvalidInput("PayOS amount must be positive".into()));
        }
        let chars = request.description.chars().count();
        if chars == 0 || chars > MAX_DESCRIPTION_CHARS {
            return Err(AppError::InvalidInput(format!(
                "PayOS description must be 1 to {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
        Ok(())
    }

    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<CheckoutResult> {
        self.validate(request)?;

        let order_code = Self::generate_order_code();
        let amount = request.amount.to_string();
        let order_code_str = order_code.to_string();
        let signature = hmac_sha256_hex(
            self.checksum_key.expose_secret(),
            &join_pairs(
                [
                    ("amount", amount.as_str()),
                    ("cancelUrl", self.cancel_url.as_str()),
                    ("description", request.description.as_str()),
                    ("orderCode", order_code_str.as_str()),
                    ("returnUrl", self.return_url.as_str()),
                ],
                "&",
            ),
        )?;
        let body = CreateRequest {
            order_code,
            amount: request.amount,
            description: &request.description,
            return_url: &self.return_url,
            cancel_url: &self.cancel_url,
            signature,
        };

        let envelope: Envelope<PaymentLinkData> = self
            .call(
                reqwest::Method::POST,
                "/v2/payment-requests",
                Some(&body),
                RetryPolicy::CREATE,
            )
            .await?;
        let data = envelope
            .data
            .ok_or_else(|| AppError::GatewayRejected("PayOS returned no payment link".into()))?;

        Ok(CheckoutResult {
            checkout_url: data.checkout_url,
            provider_order_ref: order_code_str,
            form_fields: None,
        })
    }

    fn parse_callback(&self, raw_payload: &str) -> AppResult<GatewayResult> {
        let body: Value = serde_json::from_str(raw_payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed PayOS webhook: {e}")))?;
        let data = body
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::InvalidInput("PayOS webhook missing data".into()))?;

        let order_code = data
            .get("orderCode")
            .filter(|v| !v.is_null())
            .map(render_value)
            .ok_or_else(|| AppError::InvalidInput("PayOS webhook missing orderCode".into()))?;

        // Payment webhooks carry `code` rather than a status string.
        let status = match data.get("status").and_then(Value::as_str) {
            Some(status) => status.to_string(),
            None => match data.get("code").and_then(Value::as_str) {
                Some(SUCCESS_CODE) => "PAID".to_string(),
                Some(code) => code.to_string(),
                None => String::new(),
            },
        };
        let reference = data
            .get("reference")
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = data.get("desc").and_then(Value::as_str).map(str::to_string);

        Ok(GatewayResult::from_raw(PaymentProvider::PayOs, status, order_code)
            .with_transaction_id(reference)
            .with_message(message))
    }

    async fn query_status(&self, provider_order_ref: &str) -> AppResult<GatewayResult> {
        let envelope: Envelope<PaymentInfoData> = self
            .call(
                reqwest::Method::GET,
                &format!("/v2/payment-requests/{provider_order_ref}"),
                None,
                RetryPolicy::IDEMPOTENT,
            )
            .await?;
        let data = envelope
            .data
            .ok_or_else(|| AppError::GatewayRejected("PayOS returned no payment info".into()))?;

        if render_value(&data.order_code) != provider_order_ref {
            return Err(AppError::GatewayRejected(format!(
                "PayOS returned order {}, expected {provider_order_ref}",
                render_value(&data.order_code)
            )));
        }

        let reference = data.transactions.into_iter().find_map(|t| t.reference);
        Ok(
            GatewayResult::from_raw(PaymentProvider::PayOs, data.status, provider_order_ref)
                .with_transaction_id(reference),
        )
    }

    async fn refund(&self, _request: &GatewayRefundRequest) -> AppResult<GatewayResult> {
        Err(AppError::ProviderNotSupported(
            "PayOS has no refund API".into(),
        ))
    }
}

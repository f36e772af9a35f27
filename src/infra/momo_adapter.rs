//! MoMo wallet gateway (v2 "captureWallet" API).

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CheckoutResult, GatewayPaymentRequest, GatewayRefundRequest, GatewayResult,
        PaymentGatewayPort,
    },
    domain::entities::{payment_provider::PaymentProvider, transaction_status::TransactionStatus},
    infra::{
        config::MomoConfig,
        gateway_signing::{hmac_sha256_hex, join_pairs},
        http_client::{RetryPolicy, send_json},
    },
};

const REQUEST_TYPE: &str = "captureWallet";
const MIN_AMOUNT: i64 = 1_000;
const MAX_AMOUNT: i64 = 50_000_000;

/// Fields of an IPN body covered by MoMo's signature, in signing order.
const IPN_SIGNED_FIELDS: &[&str] = &[
    "accessKey",
    "amount",
    "extraData",
    "message",
    "orderId",
    "orderInfo",
    "orderType",
    "partnerCode",
    "payType",
    "requestId",
    "responseTime",
    "resultCode",
    "transId",
];

pub struct MomoAdapter {
    client: Client,
    endpoint: Url,
    partner_code: String,
    access_key: SecretString,
    secret_key: SecretString,
    redirect_url: String,
    ipn_url: String,
}

impl MomoAdapter {
    pub fn new(client: Client, config: &MomoConfig, redirect_url: String, ipn_url: String) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            partner_code: config.partner_code.clone(),
            access_key: SecretString::new(config.access_key.expose_secret().into()),
            secret_key: SecretString::new(config.secret_key.expose_secret().into()),
            redirect_url,
            ipn_url,
        }
    }

    /// MoMo orderId for a canonical order
    pub fn order_ref(order_id: Uuid) -> String {
        order_id.simple().to_string()
    }

    /// MoMo orderId of the refund for a canonical order
    pub fn refund_ref(order_id: Uuid) -> String {
        format!("{}-refund", order_id.simple())
    }

    fn sign(&self, pairs: &[(&str, &str)]) -> AppResult<String> {
        hmac_sha256_hex(self.secret_key.expose_secret(), &join_pairs(pairs.iter().copied(), "&"))
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid MoMo endpoint: {e}")))
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        policy: RetryPolicy,
    ) -> AppResult<T> {
        let url = self.url(path)?;
        send_json("momo", policy, || self.client.post(url.clone()).json(body)).await
    }
}

/// Signature MoMo puts on IPN callbacks, computed over the body's fields.
pub fn momo_ipn_signature(
    access_key: &str,
    secret_key: &str,
    body: &Map<String, Value>,
) -> AppResult<String> {
    let values: Vec<String> = IPN_SIGNED_FIELDS
        .iter()
        .map(|field| match *field {
            "accessKey" => access_key.to_string(),
            name => body.get(name).map(render_value).unwrap_or_default(),
        })
        .collect();
    let pairs = IPN_SIGNED_FIELDS
        .iter()
        .zip(values.iter())
        .map(|(k, v)| (*k, v.as_str()));
    hmac_sha256_hex(secret_key, &join_pairs(pairs, "&"))
}

/// MoMo sends numbers for some fields and strings for others.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// MoMo wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    partner_code: &'a str,
    request_id: String,
    amount: i64,
    order_id: String,
    order_info: &'a str,
    redirect_url: &'a str,
    ipn_url: &'a str,
    request_type: &'a str,
    extra_data: &'a str,
    lang: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    result_code: i64,
    message: Option<String>,
    pay_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    partner_code: &'a str,
    request_id: String,
    order_id: &'a str,
    lang: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    order_id: Option<String>,
    result_code: i64,
    message: Option<String>,
    trans_id: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest<'a> {
    partner_code: &'a str,
    order_id: String,
    request_id: String,
    amount: i64,
    trans_id: i64,
    lang: &'a str,
    description: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundResponse {
    result_code: i64,
    message: Option<String>,
    trans_id: Option<Value>,
}

#[async_trait]
impl PaymentGatewayPort for MomoAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Momo
    }

    fn validate(&self, request: &GatewayPaymentRequest) -> AppResult<()> {
        if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&request.amount) {
            return Err(AppError::InvalidInput(format!(
                "MoMo amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}"
            )));
        }
        if request.description.trim().is_empty() {
            return Err(AppError::InvalidInput("MoMo requires an order description".into()));
        }
        Ok(())
    }

    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<CheckoutResult> {
        self.validate(request)?;

        let order_ref = Self::order_ref(request.order_id);
        let request_id = order_ref.clone();
        let amount = request.amount.to_string();
        let signature = self.sign(&[
            ("accessKey", self.access_key.expose_secret()),
            ("amount", amount.as_str()),
            ("extraData", ""),
            ("ipnUrl", self.ipn_url.as_str()),
            ("orderId", order_ref.as_str()),
            ("orderInfo", request.description.as_str()),
            ("partnerCode", self.partner_code.as_str()),
            ("redirectUrl", self.redirect_url.as_str()),
            ("requestId", request_id.as_str()),
            ("requestType", REQUEST_TYPE),
        ])?;
        let body = CreateRequest {
            partner_code: &self.partner_code,
            request_id,
            amount: request.amount,
            order_id: order_ref.clone(),
            order_info: &request.description,
            redirect_url: &self.redirect_url,
            ipn_url: &self.ipn_url,
            request_type: REQUEST_TYPE,
            extra_data: "",
            lang: "vi",
            signature,
        };

        let response: CreateResponse = self
            .post("/v2/gateway/api/create", &body, RetryPolicy::CREATE)
            .await?;

        match (response.result_code, response.pay_url) {
            (0, Some(pay_url)) => Ok(CheckoutResult {
                checkout_url: pay_url,
                provider_order_ref: order_ref,
                form_fields: None,
            }),
            (code, _) => Err(AppError::GatewayRejected(format!(
                "MoMo create failed ({code}): {}",
                response.message.unwrap_or_default()
            ))),
        }
    }

    fn parse_callback(&self, raw_payload: &str) -> AppResult<GatewayResult> {
        let body: Map<String, Value> = serde_json::from_str(raw_payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed MoMo callback: {e}")))?;

        let order_ref = body
            .get("orderId")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidInput("MoMo callback missing orderId".into()))?;
        let result_code = body
            .get("resultCode")
            .filter(|v| !v.is_null())
            .map(render_value)
            .ok_or_else(|| AppError::InvalidInput("MoMo callback missing resultCode".into()))?;
        let trans_id = body
            .get("transId")
            .map(render_value)
            .filter(|s| !s.is_empty() && s != "0");
        let message = body.get("message").and_then(Value::as_str).map(str::to_string);

        Ok(GatewayResult::from_raw(PaymentProvider::Momo, result_code, order_ref)
            .with_transaction_id(trans_id)
            .with_message(message))
    }

    async fn query_status(&self, provider_order_ref: &str) -> AppResult<GatewayResult> {
        let request_id = Uuid::new_v4().simple().to_string();
        let signature = self.sign(&[
            ("accessKey", self.access_key.expose_secret()),
            ("orderId", provider_order_ref),
            ("partnerCode", self.partner_code.as_str()),
            ("requestId", request_id.as_str()),
        ])?;
        let body = QueryRequest {
            partner_code: &self.partner_code,
            request_id,
            order_id: provider_order_ref,
            lang: "vi",
            signature,
        };

        let response: QueryResponse = self
            .post("/v2/gateway/api/query", &body, RetryPolicy::IDEMPOTENT)
            .await?;

        if let Some(order_id) = &response.order_id {
            if order_id != provider_order_ref {
                return Err(AppError::GatewayRejected(format!(
                    "MoMo query returned order {order_id}, expected {provider_order_ref}"
                )));
            }
        }

        let trans_id = response
            .trans_id
            .as_ref()
            .map(render_value)
            .filter(|s| !s.is_empty() && s != "0");
        Ok(GatewayResult::from_raw(
            PaymentProvider::Momo,
            response.result_code.to_string(),
            provider_order_ref,
        )
        .with_transaction_id(trans_id)
        .with_message(response.message))
    }

    async fn refund(&self, request: &GatewayRefundRequest) -> AppResult<GatewayResult> {
        let trans_id: i64 = request
            .provider_transaction_id
            .as_deref()
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| {
                AppError::InvalidInput("MoMo refund requires the settlement transId".into())
            })?;

        // The refund needs its own orderId. Deriving it from the order keeps a
        // repeated refund call a duplicate on MoMo's side.
        let refund_order_id = Self::refund_ref(request.order_id);
        let request_id = refund_order_id.clone();
        let amount = request.amount.to_string();
        let trans_id_str = trans_id.to_string();
        let signature = self.sign(&[
            ("accessKey", self.access_key.expose_secret()),
            ("amount", amount.as_str()),
            ("description", request.reason.as_str()),
            ("orderId", refund_order_id.as_str()),
            ("partnerCode", self.partner_code.as_str()),
            ("requestId", request_id.as_str()),
            ("transId", trans_id_str.as_str()),
        ])?;
        let body = RefundRequest {
            partner_code: &self.partner_code,
            order_id: refund_order_id,
            request_id,
            amount: request.amount,
            trans_id,
            lang: "vi",
            description: &request.reason,
            signature,
        };

        let response: RefundResponse = self
            .post("/v2/gateway/api/refund", &body, RetryPolicy::SINGLE)
            .await?;

        let mut result = GatewayResult::from_raw(
            PaymentProvider::Momo,
            response.result_code.to_string(),
            &request.provider_order_ref,
        )
        .with_transaction_id(response.trans_id.as_ref().map(render_value))
        .with_message(response.message);
        // resultCode 0 on the refund endpoint means the refund went through.
        if result.canonical_status == TransactionStatus::Success {
            result.canonical_status = TransactionStatus::Refunded;
        }
        Ok(result)
    }
}

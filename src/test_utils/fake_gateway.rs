//! Scripted gateway and verifier doubles.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        callback_verifier::CallbackVerifier,
        payment_gateway::{
            CheckoutResult, GatewayPaymentRequest, GatewayRefundRequest, GatewayResult,
            PaymentGatewayPort,
        },
    },
    domain::entities::{payment_provider::PaymentProvider, transaction_status::TransactionStatus},
};

// ============================================================================
// FakeGateway
// ============================================================================

/// Gateway double speaking a tiny JSON callback format:
/// `{"orderRef": "...", "code": "...", "transactionId": "..."}`.
///
/// Errors scripted with `fail_*` are returned once.
pub struct FakeGateway {
    provider: PaymentProvider,
    query_code: Mutex<Option<String>>,
    refund_code: Mutex<Option<String>>,
    create_failure: Mutex<Option<AppError>>,
    query_failure: Mutex<Option<AppError>>,
    refund_failure: Mutex<Option<AppError>>,
    create_calls: AtomicUsize,
    parse_calls: AtomicUsize,
    query_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            query_code: Mutex::new(None),
            refund_code: Mutex::new(None),
            create_failure: Mutex::new(None),
            query_failure: Mutex::new(None),
            refund_failure: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            parse_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
        }
    }

    /// Provider reference this fake assigns to an order
    pub fn ref_for(&self, order_id: Uuid) -> String {
        format!("{}-{}", self.provider.as_ref(), order_id.simple())
    }

    pub fn callback_payload(&self, order_id: Uuid, code: &str) -> String {
        serde_json::json!({
            "orderRef": self.ref_for(order_id),
            "code": code,
            "transactionId": format!("txn-{}", order_id.simple()),
        })
        .to_string()
    }

    pub fn set_query_result(&self, code: &str) {
        *self.query_code.lock().unwrap() = Some(code.to_string());
    }

    pub fn set_refund_result(&self, code: &str) {
        *self.refund_code.lock().unwrap() = Some(code.to_string());
    }

    pub fn fail_create(&self, err: AppError) {
        *self.create_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_query(&self, err: AppError) {
        *self.query_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_refund(&self, err: AppError) {
        *self.refund_failure.lock().unwrap() = Some(err);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }

    fn open_code(&self) -> &'static str {
        match self.provider {
            PaymentProvider::Momo => "9000",
            PaymentProvider::PayOs | PaymentProvider::SeePay => "PENDING",
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for FakeGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn validate(&self, request: &GatewayPaymentRequest) -> AppResult<()> {
        if request.description.is_empty() {
            return Err(AppError::InvalidInput("description is required".into()));
        }
        Ok(())
    }

    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<CheckoutResult> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_failure.lock().unwrap().take() {
            return Err(err);
        }

        let provider_order_ref = self.ref_for(request.order_id);
        let form_fields = self.provider.uses_client_form().then(|| {
            BTreeMap::from([
                ("order_invoice_number".to_string(), provider_order_ref.clone()),
                ("order_amount".to_string(), request.amount.to_string()),
            ])
        });
        Ok(CheckoutResult {
            checkout_url: format!("https://pay.test/{provider_order_ref}"),
            provider_order_ref,
            form_fields,
        })
    }

    fn parse_callback(&self, raw_payload: &str) -> AppResult<GatewayResult> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        let body: Value = serde_json::from_str(raw_payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed callback: {e}")))?;
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AppError::InvalidInput(format!("Callback missing {name}")))
        };

        Ok(
            GatewayResult::from_raw(self.provider, field("code")?, field("orderRef")?)
                .with_transaction_id(field("transactionId").ok()),
        )
    }

    async fn query_status(&self, provider_order_ref: &str) -> AppResult<GatewayResult> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.query_failure.lock().unwrap().take() {
            return Err(err);
        }
        let code = self
            .query_code
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.open_code().to_string());
        Ok(GatewayResult::from_raw(self.provider, code, provider_order_ref))
    }

    async fn refund(&self, request: &GatewayRefundRequest) -> AppResult<GatewayResult> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to run while the refund is in flight.
        tokio::task::yield_now().await;
        if let Some(err) = self.refund_failure.lock().unwrap().take() {
            return Err(err);
        }
        let scripted = self.refund_code.lock().unwrap().clone();
        Ok(match scripted {
            Some(code) => GatewayResult::from_raw(self.provider, code, &request.provider_order_ref),
            None => GatewayResult {
                provider: self.provider,
                canonical_status: TransactionStatus::Refunded,
                raw_code: "REFUNDED".to_string(),
                unmapped_code: false,
                provider_order_ref: request.provider_order_ref.clone(),
                provider_transaction_id: request.provider_transaction_id.clone(),
                message: None,
            },
        })
    }
}

// ============================================================================
// StaticCallbackVerifier
// ============================================================================

/// Verifier that accepts or rejects everything, switchable at runtime.
pub struct StaticCallbackVerifier {
    accept: AtomicBool,
}

impl StaticCallbackVerifier {
    pub fn accepting() -> Self {
        Self {
            accept: AtomicBool::new(true),
        }
    }

    pub fn reject_all(&self) {
        self.accept.store(false, Ordering::SeqCst);
    }
}

impl CallbackVerifier for StaticCallbackVerifier {
    fn verify(&self, _provider: PaymentProvider, _raw_payload: &str, _signature: Option<&str>) -> bool {
        self.accept.load(Ordering::SeqCst)
    }
}

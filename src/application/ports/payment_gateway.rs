use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        payment_provider::PaymentProvider, result_code::ResultCodeMapper,
        transaction_status::TransactionStatus,
    },
};

// ============================================================================
// Port Types - Provider-agnostic gateway types
// ============================================================================

/// What the orchestrator asks a gateway to charge
#[derive(Debug, Clone)]
pub struct GatewayPaymentRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub planning_id: Uuid,
    /// Minor currency units
    pub amount: i64,
    pub description: String,
}

/// Result of creating a payment at the provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    /// Where the client is sent to pay
    pub checkout_url: String,
    /// Provider-native order id used to correlate callbacks
    pub provider_order_ref: String,
    /// Fields the client must POST to `checkout_url` (form-post providers only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_fields: Option<BTreeMap<String, String>>,
}

/// Normalised payment report from a callback or status query
#[derive(Debug, Clone)]
pub struct GatewayResult {
    pub provider: PaymentProvider,
    pub canonical_status: TransactionStatus,
    pub raw_code: String,
    pub unmapped_code: bool,
    pub provider_order_ref: String,
    pub provider_transaction_id: Option<String>,
    pub message: Option<String>,
}

impl GatewayResult {
    /// Build a result by running the provider's raw code through the mapper.
    pub fn from_raw(
        provider: PaymentProvider,
        raw_code: impl Into<String>,
        provider_order_ref: impl Into<String>,
    ) -> Self {
        let raw_code = raw_code.into();
        let mapped = ResultCodeMapper::map(provider, &raw_code);
        Self {
            provider,
            canonical_status: mapped.status,
            raw_code,
            unmapped_code: mapped.unmapped_code,
            provider_order_ref: provider_order_ref.into(),
            provider_transaction_id: None,
            message: None,
        }
    }

    pub fn with_transaction_id(mut self, id: Option<String>) -> Self {
        self.provider_transaction_id = id;
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}

/// A refund to issue against a settled order
#[derive(Debug, Clone)]
pub struct GatewayRefundRequest {
    pub order_id: Uuid,
    pub provider_order_ref: String,
    pub provider_transaction_id: Option<String>,
    pub amount: i64,
    pub reason: String,
}

// ============================================================================
// Port Trait
// ============================================================================

/// One payment provider integration.
///
/// Adapters translate between the provider's wire protocol and the types
/// above. They never touch the ledger; the orchestrator owns persistence.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Reject requests the provider would refuse (limits, description length).
    fn validate(&self, request: &GatewayPaymentRequest) -> AppResult<()>;

    /// Register the order with the provider and return checkout data.
    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<CheckoutResult>;

    /// Parse an already-verified callback body.
    fn parse_callback(&self, raw_payload: &str) -> AppResult<GatewayResult>;

    /// Ask the provider for the current state of an order.
    async fn query_status(&self, provider_order_ref: &str) -> AppResult<GatewayResult>;

    /// Issue a refund. Providers without a refund API return `ProviderNotSupported`.
    async fn refund(&self, request: &GatewayRefundRequest) -> AppResult<GatewayResult>;
}

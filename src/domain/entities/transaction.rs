use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{payment_provider::PaymentProvider, transaction_status::TransactionStatus};

/// Durable record of one Planning purchase, keyed by the canonical order id
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    /// Provider-native id (MoMo orderId, PayOS orderCode, SeePay invoice number)
    pub provider_order_ref: Option<String>,
    /// Provider settlement id (MoMo transId), needed for refunds
    pub provider_transaction_id: Option<String>,
    pub user_id: Uuid,
    pub planning_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub checkout_url: Option<String>,
    pub form_fields: Option<BTreeMap<String, String>>,
    pub status: TransactionStatus,
    pub raw_provider_result_code: Option<String>,
    pub unmapped_code: bool,
    pub failure_reason: Option<String>,
    pub activation_applied: bool,
    /// Set while a refund is in flight or once one was confirmed
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds since the order was created
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

/// Input for a fresh PENDING record
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub user_id: Uuid,
    pub planning_id: Uuid,
    pub amount: i64,
    pub description: String,
}

/// Checkout data stored once the gateway accepted the order
#[derive(Debug, Clone)]
pub struct CheckoutAttachment {
    pub provider_order_ref: String,
    pub checkout_url: String,
    pub form_fields: Option<BTreeMap<String, String>>,
}

/// A status report to apply to the ledger
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub raw_code: Option<String>,
    pub unmapped_code: bool,
    pub failure_reason: Option<String>,
    pub provider_transaction_id: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            raw_code: None,
            unmapped_code: false,
            failure_reason: None,
            provider_transaction_id: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::new(TransactionStatus::Failed)
        }
    }

    pub fn with_raw_code(mut self, raw_code: impl Into<String>) -> Self {
        self.raw_code = Some(raw_code.into());
        self
    }
}

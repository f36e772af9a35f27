//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entities::{
    payment_provider::PaymentProvider, planning::Planning, transaction::NewTransaction,
    transaction::TransactionRecord, transaction_status::TransactionStatus,
};

/// Create a purchasable test planning with sensible defaults.
pub fn create_test_planning(overrides: impl FnOnce(&mut Planning)) -> Planning {
    let mut planning = Planning {
        id: Uuid::new_v4(),
        name: "Pro Monthly".to_string(),
        price: 100_000,
        days_limit: 30,
        daily_request_limit: Some(20),
        total_request_limit: Some(500),
        is_purchasable: true,
    };
    overrides(&mut planning);
    planning
}

/// Create input for a fresh MoMo order.
pub fn create_test_new_transaction(overrides: impl FnOnce(&mut NewTransaction)) -> NewTransaction {
    let mut tx = NewTransaction {
        order_id: Uuid::new_v4(),
        provider: PaymentProvider::Momo,
        user_id: Uuid::new_v4(),
        planning_id: Uuid::new_v4(),
        amount: 100_000,
        description: "Pro Monthly".to_string(),
    };
    overrides(&mut tx);
    tx
}

/// Create a PENDING MoMo transaction record with sensible defaults.
pub fn create_test_transaction(
    overrides: impl FnOnce(&mut TransactionRecord),
) -> TransactionRecord {
    let now = Utc::now();
    let mut record = TransactionRecord {
        order_id: Uuid::new_v4(),
        provider: PaymentProvider::Momo,
        provider_order_ref: None,
        provider_transaction_id: None,
        user_id: Uuid::new_v4(),
        planning_id: Uuid::new_v4(),
        amount: 100_000,
        description: "Pro Monthly".to_string(),
        checkout_url: None,
        form_fields: None,
        status: TransactionStatus::Pending,
        raw_provider_result_code: None,
        unmapped_code: false,
        failure_reason: None,
        activation_applied: false,
        refund_requested_at: None,
        created_at: now,
        last_updated_at: now,
    };
    overrides(&mut record);
    record
}

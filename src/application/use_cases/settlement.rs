use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::GatewayResult,
    domain::entities::{
        transaction::{StatusUpdate, TransactionRecord},
        transaction_status::TransactionStatus,
    },
};

use super::{
    entitlement::{EntitlementActivator, log_activation},
    ledger::TransactionLedger,
};

/// Routes a verified gateway result into the ledger.
///
/// Callbacks, polls and the reconciliation sweep all settle through here, so
/// they converge on the same idempotent ledger write.
pub struct SettlementService {
    ledger: Arc<TransactionLedger>,
    activator: Arc<EntitlementActivator>,
}

impl SettlementService {
    pub fn new(ledger: Arc<TransactionLedger>, activator: Arc<EntitlementActivator>) -> Self {
        Self { ledger, activator }
    }

    pub async fn settle(
        &self,
        record: &TransactionRecord,
        result: &GatewayResult,
    ) -> AppResult<TransactionRecord> {
        if result.unmapped_code {
            tracing::warn!(
                security_event = true,
                order_id = %record.order_id,
                provider = %result.provider,
                raw_code = %result.raw_code,
                "Unmapped provider result code, failing closed"
            );
        }

        let grant = if result.canonical_status == TransactionStatus::Success
            && !record.activation_applied
        {
            match self.activator.prepare_grant(record).await {
                Ok(grant) => Some(grant),
                Err(AppError::NotFound) => {
                    // The payment still settles; reconciliation retries the grant.
                    tracing::error!(
                        order_id = %record.order_id,
                        planning_id = %record.planning_id,
                        "Planning missing for paid order"
                    );
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let update = StatusUpdate {
            status: result.canonical_status,
            raw_code: Some(result.raw_code.clone()),
            unmapped_code: result.unmapped_code,
            failure_reason: failure_reason(result),
            provider_transaction_id: result.provider_transaction_id.clone(),
        };

        let applied = self
            .ledger
            .apply_result(record.order_id, update, grant.as_ref())
            .await?;

        if let Some(outcome) = &applied.activation {
            log_activation(record.order_id, outcome);
        } else if grant.is_some() && applied.record.activation_applied {
            tracing::debug!(order_id = %record.order_id, "Concurrent activation skipped");
        }

        Ok(applied.record)
    }
}

/// Human-readable reason stored with FAILED and CANCELLED results.
fn failure_reason(result: &GatewayResult) -> Option<String> {
    match result.canonical_status {
        TransactionStatus::Failed if result.unmapped_code => Some(format!(
            "Unrecognised {} result code {}",
            result.provider.display_name(),
            result.raw_code
        )),
        TransactionStatus::Failed => Some(result.message.clone().unwrap_or_else(|| {
            format!(
                "Payment failed at {} (code {})",
                result.provider.display_name(),
                result.raw_code
            )
        })),
        TransactionStatus::Cancelled => Some(
            result
                .message
                .clone()
                .unwrap_or_else(|| "Payment cancelled".to_string()),
        ),
        _ => None,
    }
}

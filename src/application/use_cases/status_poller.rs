use std::sync::Arc;

use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{transaction::TransactionRecord, transaction_status::TransactionStatus},
};

use super::{gateway_registry::GatewayRegistry, ledger::TransactionLedger, settlement::SettlementService};

/// Fallback path for lost callbacks: asks the gateway directly.
pub struct StatusPoller {
    ledger: Arc<TransactionLedger>,
    registry: Arc<GatewayRegistry>,
    settlement: Arc<SettlementService>,
}

impl StatusPoller {
    pub fn new(
        ledger: Arc<TransactionLedger>,
        registry: Arc<GatewayRegistry>,
        settlement: Arc<SettlementService>,
    ) -> Self {
        Self {
            ledger,
            registry,
            settlement,
        }
    }

    /// Query the gateway and settle anything the ledger has not recorded yet.
    ///
    /// No lock is held during the network call; only the final ledger write
    /// is serialized.
    pub async fn poll(&self, order_id: Uuid) -> AppResult<TransactionRecord> {
        let record = self.ledger.get(order_id).await?;
        if record.is_terminal() {
            return Ok(record);
        }
        let Some(provider_order_ref) = record.provider_order_ref.clone() else {
            tracing::debug!(order_id = %order_id, "No provider reference yet, skipping poll");
            return Ok(record);
        };

        let gateway = self.registry.get(record.provider)?;
        let result = gateway.query_status(&provider_order_ref).await?;

        tracing::debug!(
            order_id = %order_id,
            provider = %record.provider,
            raw_code = %result.raw_code,
            status = %result.canonical_status,
            "Polled gateway status"
        );

        if is_stale_report(record.status, result.canonical_status) {
            return Ok(record);
        }

        self.settlement.settle(&record, &result).await
    }
}

/// A report that does not move the record forward.
fn is_stale_report(current: TransactionStatus, reported: TransactionStatus) -> bool {
    current == reported
        || (current == TransactionStatus::Processing && reported == TransactionStatus::Pending)
}

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        callback_verifier::CallbackVerifier,
        payment_gateway::{GatewayPaymentRequest, GatewayRefundRequest},
    },
    domain::entities::{
        payment_provider::PaymentProvider,
        transaction::{CheckoutAttachment, NewTransaction, StatusUpdate, TransactionRecord},
        transaction_status::TransactionStatus,
    },
};

use super::{
    entitlement::{EntitlementActivator, PlanningRepoTrait},
    gateway_registry::GatewayRegistry,
    ledger::TransactionLedger,
    settlement::SettlementService,
    status_poller::StatusPoller,
};

// ============================================================================
// Constants
// ============================================================================

/// Orders handled per reconciliation pass
pub const RECONCILE_BATCH_SIZE: i64 = 100;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub default_provider: PaymentProvider,
    /// Open orders older than this are polled on status checks
    pub status_poll_after: Duration,
    /// Open orders older than this are swept to FAILED
    pub pending_retention: Duration,
    /// Resubmissions inside this window return the existing checkout
    pub checkout_reuse_window: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            default_provider: PaymentProvider::Momo,
            status_poll_after: Duration::seconds(120),
            pending_retention: Duration::hours(24),
            checkout_reuse_window: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub user_id: Uuid,
    pub planning_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub provider: Option<PaymentProvider>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCheckout {
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_fields: Option<BTreeMap<String, String>>,
    /// True when an existing open order was returned instead of a new one
    pub reused: bool,
}

impl PaymentCheckout {
    fn from_record(record: &TransactionRecord, checkout_url: String, reused: bool) -> Self {
        Self {
            order_id: record.order_id,
            provider: record.provider,
            checkout_url,
            form_fields: record.form_fields.clone(),
            reused,
        }
    }
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub polled: usize,
    pub swept: usize,
    pub activated: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Façade over the payment flow: the only component that writes the ledger
/// on behalf of callers, callbacks and the reconciliation job.
pub struct PaymentOrchestrator {
    ledger: Arc<TransactionLedger>,
    plannings: Arc<dyn PlanningRepoTrait>,
    registry: Arc<GatewayRegistry>,
    verifier: Arc<dyn CallbackVerifier>,
    activator: Arc<EntitlementActivator>,
    settlement: Arc<SettlementService>,
    poller: Arc<StatusPoller>,
    settings: PaymentSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        ledger: Arc<TransactionLedger>,
        plannings: Arc<dyn PlanningRepoTrait>,
        registry: Arc<GatewayRegistry>,
        verifier: Arc<dyn CallbackVerifier>,
        activator: Arc<EntitlementActivator>,
        settings: PaymentSettings,
    ) -> Self {
        let settlement = Arc::new(SettlementService::new(ledger.clone(), activator.clone()));
        let poller = Arc::new(StatusPoller::new(
            ledger.clone(),
            registry.clone(),
            settlement.clone(),
        ));
        Self {
            ledger,
            plannings,
            registry,
            verifier,
            activator,
            settlement,
            poller,
            settings,
        }
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create_payment(&self, input: CreatePaymentInput) -> AppResult<PaymentCheckout> {
        if input.amount <= 0 {
            return Err(AppError::InvalidInput("Amount must be positive".into()));
        }

        let planning = self
            .plannings
            .get_by_id(input.planning_id)
            .await?
            .ok_or_else(|| AppError::InvalidInput("Planning not found".into()))?;
        if !planning.is_purchasable {
            return Err(AppError::InvalidInput("Planning is not purchasable".into()));
        }
        if planning.price != input.amount {
            return Err(AppError::InvalidInput(format!(
                "Amount {} does not match planning price {}",
                input.amount, planning.price
            )));
        }

        let provider = input.provider.unwrap_or(self.settings.default_provider);
        let gateway = self.registry.get(provider)?;

        let description = match input.description.trim() {
            "" => planning.name.clone(),
            d => d.to_string(),
        };
        let request = GatewayPaymentRequest {
            order_id: Uuid::new_v4(),
            user_id: input.user_id,
            planning_id: input.planning_id,
            amount: input.amount,
            description,
        };
        gateway.validate(&request)?;

        let since = Utc::now() - self.settings.checkout_reuse_window;
        let reusable = self
            .ledger
            .find_reusable(input.user_id, input.planning_id, provider, since)
            .await?;
        if let Some(existing) = reusable {
            if let Some(url) = existing.checkout_url.clone() {
                tracing::info!(
                    order_id = %existing.order_id,
                    user_id = %input.user_id,
                    "Returning existing checkout for open order"
                );
                return Ok(PaymentCheckout::from_record(&existing, url, true));
            }
        }

        self.ledger
            .create(NewTransaction {
                order_id: request.order_id,
                provider,
                user_id: request.user_id,
                planning_id: request.planning_id,
                amount: request.amount,
                description: request.description.clone(),
            })
            .await?;

        let checkout = match gateway.create_payment(&request).await {
            Ok(checkout) => checkout,
            Err(e) => {
                tracing::warn!(
                    order_id = %request.order_id,
                    provider = %provider,
                    error = %e,
                    "Gateway rejected payment creation"
                );
                if let Err(mark_err) = self
                    .ledger
                    .apply_result(request.order_id, StatusUpdate::failed(e.to_string()), None)
                    .await
                {
                    tracing::error!(
                        order_id = %request.order_id,
                        error = %mark_err,
                        "Failed to mark order FAILED after gateway error"
                    );
                }
                return Err(e);
            }
        };

        let record = self
            .ledger
            .attach_checkout(
                request.order_id,
                CheckoutAttachment {
                    provider_order_ref: checkout.provider_order_ref,
                    checkout_url: checkout.checkout_url.clone(),
                    form_fields: checkout.form_fields,
                },
            )
            .await?;

        Ok(PaymentCheckout::from_record(&record, checkout.checkout_url, false))
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Authenticate, parse and settle a provider callback.
    pub async fn handle_callback(
        &self,
        provider: PaymentProvider,
        raw_payload: &str,
        signature: Option<&str>,
    ) -> AppResult<TransactionRecord> {
        if !self.verifier.verify(provider, raw_payload, signature) {
            tracing::warn!(
                security_event = true,
                provider = %provider,
                payload_len = raw_payload.len(),
                "Callback signature verification failed, discarding"
            );
            return Err(AppError::SignatureInvalid);
        }

        let gateway = self.registry.get(provider)?;
        let result = gateway.parse_callback(raw_payload)?;
        let record = self
            .ledger
            .get_by_provider_ref(provider, &result.provider_order_ref)
            .await?;

        tracing::info!(
            order_id = %record.order_id,
            provider = %provider,
            raw_code = %result.raw_code,
            status = %result.canonical_status,
            "Callback received"
        );

        self.settlement.settle(&record, &result).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current record, polling the gateway first if the order has been open
    /// longer than the poll threshold.
    pub async fn check_status(&self, order_id: Uuid) -> AppResult<TransactionRecord> {
        let record = self.ledger.get(order_id).await?;
        if !record.status.is_open()
            || record.age_secs(Utc::now()) < self.settings.status_poll_after.num_seconds()
        {
            return Ok(record);
        }

        match self.poller.poll(order_id).await {
            Ok(polled) => Ok(polled),
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Status poll failed");
                Ok(record)
            }
        }
    }

    // ========================================================================
    // Refunds
    // ========================================================================

    /// Refund a settled order. The order is claimed before the gateway call so
    /// concurrent requests for the same order reach the provider once.
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Option<i64>,
        reason: Option<String>,
    ) -> AppResult<TransactionRecord> {
        let record = self.ledger.get(order_id).await?;
        if !record.provider.supports_refunds() {
            return Err(AppError::ProviderNotSupported(format!(
                "{} has no refund API",
                record.provider.display_name()
            )));
        }
        if record.status != TransactionStatus::Success {
            return Err(AppError::IllegalTransition {
                order_id,
                from: record.status,
                to: TransactionStatus::Refunded,
            });
        }

        let amount = amount.unwrap_or(record.amount);
        if amount <= 0 || amount > record.amount {
            return Err(AppError::InvalidInput(format!(
                "Refund amount must be between 1 and {}",
                record.amount
            )));
        }

        let provider_order_ref = record
            .provider_order_ref
            .clone()
            .ok_or_else(|| AppError::Internal("Settled order has no provider reference".into()))?;
        let reason = reason.unwrap_or_else(|| "Refund requested".to_string());

        let gateway = self.registry.get(record.provider)?;
        let record = self.ledger.claim_refund(order_id).await?;

        let outcome = gateway
            .refund(&GatewayRefundRequest {
                order_id,
                provider_order_ref,
                provider_transaction_id: record.provider_transaction_id.clone(),
                amount,
                reason: reason.clone(),
            })
            .await
            .and_then(|result| {
                if result.canonical_status == TransactionStatus::Refunded {
                    Ok(result)
                } else {
                    Err(AppError::GatewayRejected(format!(
                        "Refund not confirmed by {} (code {})",
                        record.provider.display_name(),
                        result.raw_code
                    )))
                }
            });

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                if let Err(release_err) = self.ledger.release_refund_claim(order_id).await {
                    tracing::error!(
                        order_id = %order_id,
                        error = %release_err,
                        "Failed to release refund claim"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(order_id = %order_id, amount, reason = %reason, "Refund confirmed by gateway");

        let applied = self
            .ledger
            .apply_result(
                order_id,
                StatusUpdate::new(TransactionStatus::Refunded).with_raw_code(result.raw_code),
                None,
            )
            .await?;
        Ok(applied.record)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// One pass of the background job: poll stale open orders, sweep expired
    /// ones to FAILED and retry missing activations.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let stale = self
            .ledger
            .list_stale_open(now - self.settings.status_poll_after, RECONCILE_BATCH_SIZE)
            .await?;

        for record in stale {
            let polled = match self.poller.poll(record.order_id).await {
                Ok(polled) => {
                    report.polled += 1;
                    polled
                }
                Err(e) => {
                    tracing::warn!(order_id = %record.order_id, error = %e, "Reconciliation poll failed");
                    record
                }
            };

            if polled.status.is_open()
                && polled.age_secs(now) >= self.settings.pending_retention.num_seconds()
            {
                match self
                    .ledger
                    .apply_result(
                        polled.order_id,
                        StatusUpdate::failed("Expired without a provider result"),
                        None,
                    )
                    .await
                {
                    Ok(_) => {
                        report.swept += 1;
                        tracing::info!(order_id = %polled.order_id, "Stale order swept to FAILED");
                    }
                    Err(e) => {
                        tracing::warn!(order_id = %polled.order_id, error = %e, "Failed to sweep stale order")
                    }
                }
            }
        }

        let unactivated = self
            .ledger
            .list_unactivated_success(RECONCILE_BATCH_SIZE)
            .await?;
        for record in unactivated {
            match self.activator.activate(&record).await {
                Ok(_) => report.activated += 1,
                Err(e) => tracing::error!(
                    order_id = %record.order_id,
                    error = %e,
                    "Activation retry failed for paid order"
                ),
            }
        }

        Ok(report)
    }
}

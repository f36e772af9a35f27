use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        payment_provider::PaymentProvider,
        transaction::{CheckoutAttachment, NewTransaction, StatusUpdate, TransactionRecord},
        transaction_status::TransitionCheck,
        user_planning::{ActivationOutcome, EntitlementGrant},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

/// What a single serialized ledger write did.
#[derive(Debug, Clone)]
pub struct AppliedResult {
    /// The record as stored after the write (unchanged on a rejected edge)
    pub record: TransactionRecord,
    pub check: TransitionCheck,
    /// Set when the write also ran the entitlement activation
    pub activation: Option<ActivationOutcome>,
}

#[async_trait]
pub trait TransactionRepoTrait: Send + Sync {
    /// Insert a PENDING record. Fails with `DuplicateOrder` if the order id exists.
    async fn insert(&self, tx: &NewTransaction) -> AppResult<TransactionRecord>;

    async fn get_by_order_id(&self, order_id: Uuid) -> AppResult<Option<TransactionRecord>>;

    async fn get_by_provider_ref(
        &self,
        provider: PaymentProvider,
        provider_order_ref: &str,
    ) -> AppResult<Option<TransactionRecord>>;

    /// Newest open order for the pair that already has checkout data and was
    /// created at or after `since`.
    async fn find_reusable(
        &self,
        user_id: Uuid,
        planning_id: Uuid,
        provider: PaymentProvider,
        since: DateTime<Utc>,
    ) -> AppResult<Option<TransactionRecord>>;

    async fn attach_checkout(
        &self,
        order_id: Uuid,
        checkout: &CheckoutAttachment,
    ) -> AppResult<TransactionRecord>;

    /// The single transition function.
    ///
    /// Runs under per-order mutual exclusion: reads the current status, checks
    /// the edge, writes the new status and, when the resulting status is
    /// SUCCESS with a grant and `activation_applied` is still false, activates
    /// the entitlement in the same write. A REFUNDED write deactivates the
    /// order's entitlement. Rejected edges leave the record untouched and are
    /// reported through `AppliedResult::check`.
    async fn apply_result(
        &self,
        order_id: Uuid,
        update: &StatusUpdate,
        grant: Option<&EntitlementGrant>,
    ) -> AppResult<AppliedResult>;

    /// Mark a SUCCESS order as having a refund in flight. At most one claim
    /// is held per order: a second caller gets `RefundInProgress`, a non-SUCCESS
    /// order gets `IllegalTransition`.
    async fn claim_refund(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<TransactionRecord>;

    /// Drop the claim of a refund the gateway did not confirm.
    async fn release_refund_claim(&self, order_id: Uuid) -> AppResult<()>;

    /// Open orders created before `created_before`, oldest first.
    async fn list_stale_open(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<TransactionRecord>>;

    /// SUCCESS orders whose entitlement was never granted.
    async fn list_unactivated_success(&self, limit: i64) -> AppResult<Vec<TransactionRecord>>;
}

// ============================================================================
// Ledger
// ============================================================================

/// Single source of truth for transaction state.
///
/// Thin layer over the repository that turns rejected edges into errors and
/// logs integrity problems.
pub struct TransactionLedger {
    repo: Arc<dyn TransactionRepoTrait>,
}

impl TransactionLedger {
    pub fn new(repo: Arc<dyn TransactionRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, tx: NewTransaction) -> AppResult<TransactionRecord> {
        let record = self.repo.insert(&tx).await?;
        tracing::info!(
            order_id = %record.order_id,
            provider = %record.provider,
            user_id = %record.user_id,
            planning_id = %record.planning_id,
            amount = record.amount,
            "Transaction created"
        );
        Ok(record)
    }

    pub async fn get(&self, order_id: Uuid) -> AppResult<TransactionRecord> {
        self.repo
            .get_by_order_id(order_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn get_by_provider_ref(
        &self,
        provider: PaymentProvider,
        provider_order_ref: &str,
    ) -> AppResult<TransactionRecord> {
        self.repo
            .get_by_provider_ref(provider, provider_order_ref)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn find_reusable(
        &self,
        user_id: Uuid,
        planning_id: Uuid,
        provider: PaymentProvider,
        since: DateTime<Utc>,
    ) -> AppResult<Option<TransactionRecord>> {
        self.repo
            .find_reusable(user_id, planning_id, provider, since)
            .await
    }

    pub async fn attach_checkout(
        &self,
        order_id: Uuid,
        checkout: CheckoutAttachment,
    ) -> AppResult<TransactionRecord> {
        self.repo.attach_checkout(order_id, &checkout).await
    }

    /// Apply a status report. Re-applying the current status is a no-op that
    /// returns the stored record.
    pub async fn apply_result(
        &self,
        order_id: Uuid,
        update: StatusUpdate,
        grant: Option<&EntitlementGrant>,
    ) -> AppResult<AppliedResult> {
        let applied = self.repo.apply_result(order_id, &update, grant).await?;
        let from = applied.record.status;

        match applied.check {
            TransitionCheck::Advance => {
                tracing::info!(
                    order_id = %order_id,
                    status = %applied.record.status,
                    raw_code = ?update.raw_code,
                    "Transaction status updated"
                );
                Ok(applied)
            }
            TransitionCheck::Unchanged => {
                tracing::debug!(order_id = %order_id, status = %from, "Duplicate status report ignored");
                Ok(applied)
            }
            TransitionCheck::Conflict => {
                tracing::error!(
                    order_id = %order_id,
                    from = %from,
                    to = %update.status,
                    raw_code = ?update.raw_code,
                    manual_review = true,
                    "Conflicting terminal status reported"
                );
                Err(AppError::ConflictingTransition {
                    order_id,
                    from,
                    to: update.status,
                })
            }
            TransitionCheck::Illegal => {
                tracing::warn!(order_id = %order_id, from = %from, to = %update.status, "Illegal transition rejected");
                Err(AppError::IllegalTransition {
                    order_id,
                    from,
                    to: update.status,
                })
            }
        }
    }

    pub async fn claim_refund(&self, order_id: Uuid) -> AppResult<TransactionRecord> {
        let record = self.repo.claim_refund(order_id, Utc::now()).await?;
        tracing::info!(order_id = %order_id, "Refund claimed");
        Ok(record)
    }

    pub async fn release_refund_claim(&self, order_id: Uuid) -> AppResult<()> {
        self.repo.release_refund_claim(order_id).await?;
        tracing::info!(order_id = %order_id, "Refund claim released");
        Ok(())
    }

    pub async fn list_stale_open(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<TransactionRecord>> {
        self.repo.list_stale_open(created_before, limit).await
    }

    pub async fn list_unactivated_success(&self, limit: i64) -> AppResult<Vec<TransactionRecord>> {
        self.repo.list_unactivated_success(limit).await
    }
}

//! In-memory mock implementations for the payment repository traits.
//!
//! All three traits share one `Mutex` over a combined state struct, which
//! gives the same atomicity the Postgres implementation gets from
//! `SELECT ... FOR UPDATE` inside a transaction.
//!
//! `hold_writes_until` parks ledger writes on a barrier so tests can line up
//! several writers that all read the record before any of them writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        entitlement::{EntitlementRepoTrait, PlanningRepoTrait},
        ledger::{AppliedResult, TransactionRepoTrait},
    },
    domain::entities::{
        payment_provider::PaymentProvider,
        planning::Planning,
        transaction::{CheckoutAttachment, NewTransaction, StatusUpdate, TransactionRecord},
        transaction_status::{TransactionStatus, TransitionCheck},
        user_planning::{ActivationOutcome, EntitlementGrant, UserPlanning},
    },
};

#[derive(Default)]
struct PaymentState {
    plannings: HashMap<Uuid, Planning>,
    transactions: HashMap<Uuid, TransactionRecord>,
    user_plannings: Vec<UserPlanning>,
    /// Number of UserPlannings ever created per order
    activations: HashMap<Uuid, usize>,
}

impl PaymentState {
    fn transaction_mut(&mut self, order_id: Uuid) -> AppResult<&mut TransactionRecord> {
        self.transactions
            .get_mut(&order_id)
            .ok_or(AppError::NotFound)
    }

    fn activate(
        &mut self,
        order_id: Uuid,
        grant: &EntitlementGrant,
        now: DateTime<Utc>,
    ) -> AppResult<ActivationOutcome> {
        let tx = self.transaction_mut(order_id)?;
        if tx.activation_applied {
            let existing = self
                .user_plannings
                .iter()
                .find(|up| up.order_id == order_id)
                .cloned()
                .ok_or_else(|| AppError::Internal("activation flag set without entitlement".into()))?;
            return Ok(ActivationOutcome::AlreadyApplied(existing));
        }
        tx.activation_applied = true;
        tx.last_updated_at = now;

        for up in self
            .user_plannings
            .iter_mut()
            .filter(|up| up.user_id == grant.user_id && up.is_active)
        {
            up.is_active = false;
            up.deactivated_at = Some(now);
        }

        let up = grant.clone().into_user_planning(order_id, now);
        self.user_plannings.push(up.clone());
        *self.activations.entry(order_id).or_default() += 1;
        Ok(ActivationOutcome::Activated(up))
    }

    fn deactivate_for_order(&mut self, order_id: Uuid, now: DateTime<Utc>) {
        for up in self
            .user_plannings
            .iter_mut()
            .filter(|up| up.order_id == order_id && up.is_active)
        {
            up.is_active = false;
            up.deactivated_at = Some(now);
        }
    }
}

// ============================================================================
// InMemoryPaymentStore
// ============================================================================

struct WriteGate {
    barrier: Arc<Barrier>,
    first_call: usize,
    held: usize,
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    state: Mutex<PaymentState>,
    apply_calls: AtomicUsize,
    write_gate: Mutex<Option<WriteGate>>,
    write_failure: Mutex<Option<AppError>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `writers` calls to `apply_result` wait for each other
    /// before touching the state.
    pub fn hold_writes_until(&self, writers: usize) {
        *self.write_gate.lock().unwrap() = Some(WriteGate {
            barrier: Arc::new(Barrier::new(writers)),
            first_call: self.apply_calls.load(Ordering::SeqCst),
            held: writers,
        });
    }

    /// Fail the next `apply_result` with `err` before anything is written.
    pub fn fail_next_write(&self, err: AppError) {
        *self.write_failure.lock().unwrap() = Some(err);
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    async fn wait_for_gate(&self) {
        let call = self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let barrier = {
            let gate = self.write_gate.lock().unwrap();
            gate.as_ref()
                .filter(|g| call >= g.first_call && call - g.first_call < g.held)
                .map(|g| g.barrier.clone())
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }

    pub fn add_planning(&self, planning: Planning) {
        self.state
            .lock()
            .unwrap()
            .plannings
            .insert(planning.id, planning);
    }

    /// Insert a record as-is, bypassing the transition rules.
    pub fn seed_transaction(&self, record: TransactionRecord) -> TransactionRecord {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(record.order_id, record.clone());
        record
    }

    pub fn get_transaction(&self, order_id: Uuid) -> Option<TransactionRecord> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(&order_id)
            .cloned()
    }

    pub fn all_transactions(&self) -> Vec<TransactionRecord> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .values()
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    /// Move an order's creation time into the past.
    pub fn backdate(&self, order_id: Uuid, created_at: DateTime<Utc>) {
        if let Some(tx) = self.state.lock().unwrap().transactions.get_mut(&order_id) {
            tx.created_at = created_at;
        }
    }

    pub fn user_plannings_for(&self, user_id: Uuid) -> Vec<UserPlanning> {
        self.state
            .lock()
            .unwrap()
            .user_plannings
            .iter()
            .filter(|up| up.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn activation_count(&self, order_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .activations
            .get(&order_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PlanningRepoTrait for InMemoryPaymentStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Planning>> {
        Ok(self.state.lock().unwrap().plannings.get(&id).cloned())
    }
}

#[async_trait]
impl TransactionRepoTrait for InMemoryPaymentStore {
    async fn insert(&self, tx: &NewTransaction) -> AppResult<TransactionRecord> {
        let mut state = self.state.lock().unwrap();
        if state.transactions.contains_key(&tx.order_id) {
            return Err(AppError::DuplicateOrder(tx.order_id));
        }
        let now = Utc::now();
        let record = TransactionRecord {
            order_id: tx.order_id,
            provider: tx.provider,
            provider_order_ref: None,
            provider_transaction_id: None,
            user_id: tx.user_id,
            planning_id: tx.planning_id,
            amount: tx.amount,
            description: tx.description.clone(),
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
        state.transactions.insert(record.order_id, record.clone());
        Ok(record)
    }

    async fn get_by_order_id(&self, order_id: Uuid) -> AppResult<Option<TransactionRecord>> {
        Ok(self.get_transaction(order_id))
    }

    async fn get_by_provider_ref(
        &self,
        provider: PaymentProvider,
        provider_order_ref: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .find(|t| {
                t.provider == provider && t.provider_order_ref.as_deref() == Some(provider_order_ref)
            })
            .cloned())
    }

    async fn find_reusable(
        &self,
        user_id: Uuid,
        planning_id: Uuid,
        provider: PaymentProvider,
        since: DateTime<Utc>,
    ) -> AppResult<Option<TransactionRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.planning_id == planning_id
                    && t.provider == provider
                    && t.status.is_open()
                    && t.checkout_url.is_some()
                    && t.created_at >= since
            })
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn attach_checkout(
        &self,
        order_id: Uuid,
        checkout: &CheckoutAttachment,
    ) -> AppResult<TransactionRecord> {
        let mut state = self.state.lock().unwrap();
        let tx = state.transaction_mut(order_id)?;
        tx.provider_order_ref = Some(checkout.provider_order_ref.clone());
        tx.checkout_url = Some(checkout.checkout_url.clone());
        tx.form_fields = checkout.form_fields.clone();
        tx.last_updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn apply_result(
        &self,
        order_id: Uuid,
        update: &StatusUpdate,
        grant: Option<&EntitlementGrant>,
    ) -> AppResult<AppliedResult> {
        self.wait_for_gate().await;
        if let Some(err) = self.write_failure.lock().unwrap().take() {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let tx = state.transaction_mut(order_id)?;
        let check = tx.status.check_transition(update.status);

        match check {
            TransitionCheck::Advance => {
                tx.status = update.status;
                if update.raw_code.is_some() {
                    tx.raw_provider_result_code = update.raw_code.clone();
                }
                tx.unmapped_code = update.unmapped_code;
                if update.failure_reason.is_some() {
                    tx.failure_reason = update.failure_reason.clone();
                }
                if update.provider_transaction_id.is_some() {
                    tx.provider_transaction_id = update.provider_transaction_id.clone();
                }
                tx.last_updated_at = now;
            }
            TransitionCheck::Unchanged => {}
            TransitionCheck::Conflict | TransitionCheck::Illegal => {
                return Ok(AppliedResult {
                    record: tx.clone(),
                    check,
                    activation: None,
                });
            }
        }

        let status = tx.status;
        let activation_applied = tx.activation_applied;

        let activation = match grant {
            Some(grant) if status == TransactionStatus::Success && !activation_applied => {
                Some(state.activate(order_id, grant, now)?)
            }
            _ => None,
        };
        if check == TransitionCheck::Advance && status == TransactionStatus::Refunded {
            state.deactivate_for_order(order_id, now);
        }

        let record = state.transaction_mut(order_id)?.clone();
        Ok(AppliedResult {
            record,
            check,
            activation,
        })
    }

    async fn claim_refund(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<TransactionRecord> {
        let mut state = self.state.lock().unwrap();
        let tx = state.transaction_mut(order_id)?;
        if tx.status != TransactionStatus::Success {
            return Err(AppError::IllegalTransition {
                order_id,
                from: tx.status,
                to: TransactionStatus::Refunded,
            });
        }
        if tx.refund_requested_at.is_some() {
            return Err(AppError::RefundInProgress(order_id));
        }
        tx.refund_requested_at = Some(now);
        tx.last_updated_at = now;
        Ok(tx.clone())
    }

    async fn release_refund_claim(&self, order_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        let tx = state.transaction_mut(order_id)?;
        if tx.status == TransactionStatus::Success {
            tx.refund_requested_at = None;
        }
        Ok(())
    }

    async fn list_stale_open(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<TransactionRecord>> {
        let mut stale: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.status.is_open() && t.created_at < created_before)
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn list_unactivated_success(&self, limit: i64) -> AppResult<Vec<TransactionRecord>> {
        let mut pending: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Success && !t.activation_applied)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }
}

#[async_trait]
impl EntitlementRepoTrait for InMemoryPaymentStore {
    async fn activate_for_order(
        &self,
        order_id: Uuid,
        grant: &EntitlementGrant,
    ) -> AppResult<ActivationOutcome> {
        let mut state = self.state.lock().unwrap();
        let status = state.transaction_mut(order_id)?.status;
        if status != TransactionStatus::Success {
            return Err(AppError::InvalidInput(format!(
                "Order {order_id} is {status}, only SUCCESS orders can be activated"
            )));
        }
        state.activate(order_id, grant, Utc::now())
    }

    async fn get_by_order_id(&self, order_id: Uuid) -> AppResult<Option<UserPlanning>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .user_plannings
            .iter()
            .find(|up| up.order_id == order_id)
            .cloned())
    }

    async fn get_active_for_user(&self, user_id: Uuid) -> AppResult<Option<UserPlanning>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .user_plannings
            .iter()
            .find(|up| up.user_id == user_id && up.is_active)
            .cloned())
    }
}

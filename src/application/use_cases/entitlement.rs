use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        planning::Planning,
        transaction::TransactionRecord,
        transaction_status::TransactionStatus,
        user_planning::{ActivationOutcome, EntitlementGrant, UserPlanning},
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait PlanningRepoTrait: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Planning>>;
}

#[async_trait]
pub trait EntitlementRepoTrait: Send + Sync {
    /// Grant the entitlement for a SUCCESS order in one atomic write.
    ///
    /// Locks the order, returns `AlreadyApplied` with the existing row when
    /// `activation_applied` is set, otherwise deactivates the user's other
    /// active plannings, inserts the new one and sets the flag.
    async fn activate_for_order(
        &self,
        order_id: Uuid,
        grant: &EntitlementGrant,
    ) -> AppResult<ActivationOutcome>;

    async fn get_by_order_id(&self, order_id: Uuid) -> AppResult<Option<UserPlanning>>;

    async fn get_active_for_user(&self, user_id: Uuid) -> AppResult<Option<UserPlanning>>;
}

// ============================================================================
// Activator
// ============================================================================

/// Grants purchased Plannings. The only path that creates a `UserPlanning`.
pub struct EntitlementActivator {
    plannings: Arc<dyn PlanningRepoTrait>,
    repo: Arc<dyn EntitlementRepoTrait>,
}

impl EntitlementActivator {
    pub fn new(plannings: Arc<dyn PlanningRepoTrait>, repo: Arc<dyn EntitlementRepoTrait>) -> Self {
        Self { plannings, repo }
    }

    /// Snapshot the order's Planning so the ledger can activate inside the
    /// terminal-status write.
    pub async fn prepare_grant(&self, record: &TransactionRecord) -> AppResult<EntitlementGrant> {
        let planning = self
            .plannings
            .get_by_id(record.planning_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(EntitlementGrant::from_planning(record.user_id, &planning))
    }

    /// Activate the entitlement for a settled order. Calling this again for the
    /// same order returns the existing `UserPlanning`.
    pub async fn activate(&self, record: &TransactionRecord) -> AppResult<UserPlanning> {
        if record.status != TransactionStatus::Success {
            return Err(AppError::InvalidInput(format!(
                "Order {} is {}, only SUCCESS orders can be activated",
                record.order_id, record.status
            )));
        }

        let grant = self.prepare_grant(record).await?;
        let outcome = self.repo.activate_for_order(record.order_id, &grant).await?;
        log_activation(record.order_id, &outcome);
        Ok(outcome.into_user_planning())
    }

    pub async fn get_for_order(&self, order_id: Uuid) -> AppResult<Option<UserPlanning>> {
        self.repo.get_by_order_id(order_id).await
    }

    pub async fn get_active_for_user(&self, user_id: Uuid) -> AppResult<Option<UserPlanning>> {
        self.repo.get_active_for_user(user_id).await
    }
}

pub(crate) fn log_activation(order_id: Uuid, outcome: &ActivationOutcome) {
    let up = outcome.user_planning();
    match outcome {
        ActivationOutcome::Activated(_) => tracing::info!(
            order_id = %order_id,
            user_id = %up.user_id,
            planning_id = %up.planning_id,
            expiry_date = %up.expiry_date,
            "Planning activated"
        ),
        ActivationOutcome::AlreadyApplied(_) => tracing::debug!(
            order_id = %order_id,
            user_planning_id = %up.id,
            "Concurrent activation skipped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryPaymentStore, create_test_planning, create_test_transaction};
    use chrono::Duration;

    fn activator(store: &Arc<InMemoryPaymentStore>) -> EntitlementActivator {
        EntitlementActivator::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn activate_twice_creates_one_user_planning() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let planning = create_test_planning(|p| p.days_limit = 30);
        store.add_planning(planning.clone());
        let record = store.seed_transaction(create_test_transaction(|t| {
            t.planning_id = planning.id;
            t.status = TransactionStatus::Success;
        }));
        let activator = activator(&store);

        let first = activator.activate(&record).await.unwrap();
        let second = activator.activate(&record).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.user_plannings_for(record.user_id).len(), 1);
        assert_eq!(store.activation_count(record.order_id), 1);
        assert_eq!(first.expiry_date - first.transaction_date, Duration::days(30));
        assert!(store.get_transaction(record.order_id).unwrap().activation_applied);
    }

    #[tokio::test]
    async fn activation_deactivates_previous_planning() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let planning = create_test_planning(|_| {});
        store.add_planning(planning.clone());
        let user_id = Uuid::new_v4();
        let older = store.seed_transaction(create_test_transaction(|t| {
            t.user_id = user_id;
            t.planning_id = planning.id;
            t.status = TransactionStatus::Success;
        }));
        let newer = store.seed_transaction(create_test_transaction(|t| {
            t.user_id = user_id;
            t.planning_id = planning.id;
            t.status = TransactionStatus::Success;
        }));
        let activator = activator(&store);

        let old_up = activator.activate(&older).await.unwrap();
        let new_up = activator.activate(&newer).await.unwrap();

        let active = activator.get_active_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(active.id, new_up.id);
        let old_after = activator.get_for_order(older.order_id).await.unwrap().unwrap();
        assert_eq!(old_after.id, old_up.id);
        assert!(!old_after.is_active);
        assert!(old_after.deactivated_at.is_some());
    }

    #[tokio::test]
    async fn activate_rejects_unsettled_order() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let record = store.seed_transaction(create_test_transaction(|_| {}));

        let err = activator(&store).activate(&record).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(store.user_plannings_for(record.user_id).is_empty());
    }

    #[tokio::test]
    async fn prepare_grant_without_planning_is_not_found() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let record = create_test_transaction(|_| {});

        let err = activator(&store).prepare_grant(&record).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound));
    }
}

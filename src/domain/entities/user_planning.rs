use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::planning::Planning;

/// An activated entitlement linking a user to a purchased Planning
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlanning {
    pub id: Uuid,
    pub user_id: Uuid,
    pub planning_id: Uuid,
    /// Back-reference to the transaction that paid for it
    pub order_id: Uuid,
    pub is_active: bool,
    pub transaction_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub daily_request_limit: Option<i32>,
    pub total_request_limit: Option<i32>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// Snapshot of what a paid order entitles the user to.
///
/// Built before the ledger write so the activation can run inside the same
/// atomic operation as the SUCCESS transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementGrant {
    pub user_id: Uuid,
    pub planning_id: Uuid,
    pub days_limit: i32,
    pub daily_request_limit: Option<i32>,
    pub total_request_limit: Option<i32>,
}

impl EntitlementGrant {
    pub fn from_planning(user_id: Uuid, planning: &Planning) -> Self {
        Self {
            user_id,
            planning_id: planning.id,
            days_limit: planning.days_limit,
            daily_request_limit: planning.daily_request_limit,
            total_request_limit: planning.total_request_limit,
        }
    }

    pub fn into_user_planning(self, order_id: Uuid, now: DateTime<Utc>) -> UserPlanning {
        UserPlanning {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            planning_id: self.planning_id,
            order_id,
            is_active: true,
            transaction_date: now,
            expiry_date: now + Duration::days(i64::from(self.days_limit)),
            daily_request_limit: self.daily_request_limit,
            total_request_limit: self.total_request_limit,
            deactivated_at: None,
        }
    }
}

/// Result of an activation attempt
#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    /// A new UserPlanning was created for the order
    Activated(UserPlanning),
    /// The order was already activated; the existing entitlement is returned
    AlreadyApplied(UserPlanning),
}

impl ActivationOutcome {
    pub fn user_planning(&self) -> &UserPlanning {
        match self {
            ActivationOutcome::Activated(up) | ActivationOutcome::AlreadyApplied(up) => up,
        }
    }

    pub fn into_user_planning(self) -> UserPlanning {
        match self {
            ActivationOutcome::Activated(up) | ActivationOutcome::AlreadyApplied(up) => up,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ActivationOutcome::Activated(_))
    }
}

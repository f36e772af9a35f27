use serde::{Deserialize, Serialize};

/// Canonical lifecycle status of a payment transaction.
///
/// `Pending -> Processing -> {Success | Failed | Cancelled}`, plus the single
/// `Success -> Refunded` edge. `Processing` may be skipped when a gateway
/// reports the final outcome directly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    Cancelled,
    Refunded,
}

/// Outcome of checking a requested status change against the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// Legal edge, the new status should be written
    Advance,
    /// Same status reported again, nothing to write
    Unchanged,
    /// A different terminal status after a terminal one; needs manual review
    Conflict,
    /// Any other edge (backwards, or skipping SUCCESS on the way to REFUNDED)
    Illegal,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Refunded => "REFUNDED",
        }
    }

    /// Terminal statuses never change again, except SUCCESS -> REFUNDED
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success
                | TransactionStatus::Failed
                | TransactionStatus::Cancelled
                | TransactionStatus::Refunded
        )
    }

    /// Still waiting on the gateway
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn check_transition(self, next: TransactionStatus) -> TransitionCheck {
        use TransactionStatus::*;

        if self == next {
            return TransitionCheck::Unchanged;
        }

        match (self, next) {
            (Pending, Processing) => TransitionCheck::Advance,
            (Pending | Processing, Success | Failed | Cancelled) => TransitionCheck::Advance,
            (Success, Refunded) => TransitionCheck::Advance,
            (from, to) if from.is_terminal() && to.is_terminal() => TransitionCheck::Conflict,
            _ => TransitionCheck::Illegal,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PROCESSING" => Ok(TransactionStatus::Processing),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            "REFUNDED" => Ok(TransactionStatus::Refunded),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

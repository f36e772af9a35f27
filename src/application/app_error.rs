use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::transaction_status::TransactionStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Callback signature verification failed")]
    SignatureInvalid,

    #[error("Order {0} already exists")]
    DuplicateOrder(Uuid),

    #[error("Conflicting transition for order {order_id}: {from} -> {to}")]
    ConflictingTransition {
        order_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Illegal transition for order {order_id}: {from} -> {to}")]
    IllegalTransition {
        order_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("A refund is already in progress for order {0}")]
    RefundInProgress(Uuid),

    #[error("Payment gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("Payment provider is not configured")]
    ProviderNotConfigured,

    #[error("Not supported by payment provider: {0}")]
    ProviderNotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    NotFound,
    SignatureInvalid,
    DuplicateOrder,
    ConflictingTransition,
    IllegalTransition,
    RefundInProgress,
    GatewayUnreachable,
    GatewayRejected,
    ProviderNotConfigured,
    ProviderNotSupported,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::SignatureInvalid => "SIGNATURE_INVALID",
            ErrorCode::DuplicateOrder => "DUPLICATE_ORDER",
            ErrorCode::ConflictingTransition => "CONFLICTING_TRANSITION",
            ErrorCode::IllegalTransition => "ILLEGAL_TRANSITION",
            ErrorCode::RefundInProgress => "REFUND_IN_PROGRESS",
            ErrorCode::GatewayUnreachable => "GATEWAY_UNREACHABLE",
            ErrorCode::GatewayRejected => "GATEWAY_REJECTED",
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED",
            ErrorCode::ProviderNotSupported => "PROVIDER_NOT_SUPPORTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                // PostgreSQL unique violation
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    AppError::InvalidInput("A record with this value already exists".into())
                }
                // PostgreSQL foreign key violation
                else if msg.contains("foreign key") {
                    AppError::InvalidInput("Referenced record not found".into())
                } else {
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}

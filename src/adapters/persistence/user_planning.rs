use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::entitlement::EntitlementRepoTrait,
    domain::entities::{
        transaction_status::TransactionStatus,
        user_planning::{ActivationOutcome, EntitlementGrant, UserPlanning},
    },
};

const SELECT_COLS: &str = r#"
    id, user_id, planning_id, order_id, is_active, transaction_date,
    expiry_date, daily_request_limit, total_request_limit, deactivated_at
"#;

fn row_to_user_planning(row: sqlx::postgres::PgRow) -> UserPlanning {
    UserPlanning {
        id: row.get("id"),
        user_id: row.get("user_id"),
        planning_id: row.get("planning_id"),
        order_id: row.get("order_id"),
        is_active: row.get("is_active"),
        transaction_date: row.get("transaction_date"),
        expiry_date: row.get("expiry_date"),
        daily_request_limit: row.get("daily_request_limit"),
        total_request_limit: row.get("total_request_limit"),
        deactivated_at: row.get("deactivated_at"),
    }
}

async fn find_for_order(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Option<UserPlanning>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM user_plannings WHERE order_id = $1"
    ))
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(row_to_user_planning))
}

/// Map a failed entitlement write. A unique violation means another
/// activation for the same user slipped past the locks, which is a storage
/// failure and must not read as bad input.
fn activation_write_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            tracing::error!(
                constraint = ?db_err.constraint(),
                error = %db_err,
                "Entitlement write hit a unique constraint"
            );
            AppError::Database("Entitlement write conflicted".into())
        }
        _ => err.into(),
    }
}

/// Grant the entitlement for an order inside the caller's transaction.
///
/// The caller must hold the `payment_transactions` row lock for `order_id`.
/// A transaction-scoped advisory lock on the user serializes activations of
/// different orders for the same user, so only one row is ever active.
pub(super) async fn activate_locked(
    conn: &mut PgConnection,
    order_id: Uuid,
    activation_applied: bool,
    grant: &EntitlementGrant,
    now: DateTime<Utc>,
) -> AppResult<ActivationOutcome> {
    if activation_applied {
        let existing = find_for_order(&mut *conn, order_id).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "Order {order_id} is marked activated but has no entitlement"
            ))
        })?;
        return Ok(ActivationOutcome::AlreadyApplied(existing));
    }

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(grant.user_id.to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        UPDATE user_plannings
        SET is_active = FALSE, deactivated_at = $2
        WHERE user_id = $1 AND is_active
        "#,
    )
    .bind(grant.user_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(activation_write_error)?;

    let up = grant.clone().into_user_planning(order_id, now);
    sqlx::query(
        r#"
        INSERT INTO user_plannings (
            id, user_id, planning_id, order_id, is_active, transaction_date,
            expiry_date, daily_request_limit, total_request_limit, deactivated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(up.id)
    .bind(up.user_id)
    .bind(up.planning_id)
    .bind(up.order_id)
    .bind(up.is_active)
    .bind(up.transaction_date)
    .bind(up.expiry_date)
    .bind(up.daily_request_limit)
    .bind(up.total_request_limit)
    .bind(up.deactivated_at)
    .execute(&mut *conn)
    .await
    .map_err(activation_write_error)?;

    sqlx::query(
        r#"
        UPDATE payment_transactions
        SET activation_applied = TRUE, last_updated_at = $2
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(ActivationOutcome::Activated(up))
}

/// Deactivate the entitlement paid for by a refunded order.
pub(super) async fn deactivate_for_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE user_plannings
        SET is_active = FALSE, deactivated_at = $2
        WHERE order_id = $1 AND is_active
        "#,
    )
    .bind(order_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl EntitlementRepoTrait for PostgresPersistence {
    async fn activate_for_order(
        &self,
        order_id: Uuid,
        grant: &EntitlementGrant,
    ) -> AppResult<ActivationOutcome> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query(
            r#"
            SELECT status, activation_applied
            FROM payment_transactions
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        let status: TransactionStatus = row.get("status");
        if status != TransactionStatus::Success {
            return Err(AppError::InvalidInput(format!(
                "Order {order_id} is {status}, only SUCCESS orders can be activated"
            )));
        }

        let outcome = activate_locked(
            &mut *tx,
            order_id,
            row.get("activation_applied"),
            grant,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_by_order_id(&self, order_id: Uuid) -> AppResult<Option<UserPlanning>> {
        let mut conn = self.pool().acquire().await?;
        find_for_order(&mut conn, order_id).await
    }

    async fn get_active_for_user(&self, user_id: Uuid) -> AppResult<Option<UserPlanning>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM user_plannings WHERE user_id = $1 AND is_active"
        ))
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(row_to_user_planning))
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback, user_planning},
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{AppliedResult, TransactionRepoTrait},
    domain::entities::{
        payment_provider::PaymentProvider,
        transaction::{CheckoutAttachment, NewTransaction, StatusUpdate, TransactionRecord},
        transaction_status::{TransactionStatus, TransitionCheck},
        user_planning::EntitlementGrant,
    },
};

const SELECT_COLS: &str = r#"
    order_id, provider, provider_order_ref, provider_transaction_id,
    user_id, planning_id, amount, description, checkout_url, form_fields,
    status, raw_provider_result_code, unmapped_code, failure_reason,
    activation_applied, refund_requested_at, created_at, last_updated_at
"#;

fn row_to_record(row: sqlx::postgres::PgRow) -> TransactionRecord {
    let order_id: Uuid = row.get("order_id");
    let form_fields = row
        .get::<Option<serde_json::Value>, _>("form_fields")
        .map(|json| {
            parse_json_with_fallback::<BTreeMap<String, String>>(
                &json,
                "form_fields",
                "payment_transaction",
                &order_id.to_string(),
            )
        });

    TransactionRecord {
        order_id,
        provider: row.get("provider"),
        provider_order_ref: row.get("provider_order_ref"),
        provider_transaction_id: row.get("provider_transaction_id"),
        user_id: row.get("user_id"),
        planning_id: row.get("planning_id"),
        amount: row.get("amount"),
        description: row.get("description"),
        checkout_url: row.get("checkout_url"),
        form_fields,
        status: row.get("status"),
        raw_provider_result_code: row.get("raw_provider_result_code"),
        unmapped_code: row.get("unmapped_code"),
        failure_reason: row.get("failure_reason"),
        activation_applied: row.get("activation_applied"),
        refund_requested_at: row.get("refund_requested_at"),
        created_at: row.get("created_at"),
        last_updated_at: row.get("last_updated_at"),
    }
}

async fn fetch_locked(conn: &mut PgConnection, order_id: Uuid) -> AppResult<TransactionRecord> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM payment_transactions WHERE order_id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(row_to_record(row))
}

#[async_trait]
impl TransactionRepoTrait for PostgresPersistence {
    async fn insert(&self, tx: &NewTransaction) -> AppResult<TransactionRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_transactions (
                order_id, provider, user_id, planning_id, amount, description, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(tx.order_id)
        .bind(tx.provider)
        .bind(tx.user_id)
        .bind(tx.planning_id)
        .bind(tx.amount)
        .bind(&tx.description)
        .bind(TransactionStatus::Pending)
        .fetch_optional(self.pool())
        .await?
        .ok_or(AppError::DuplicateOrder(tx.order_id))?;

        Ok(row_to_record(row))
    }

    async fn get_by_order_id(&self, order_id: Uuid) -> AppResult<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM payment_transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(row_to_record))
    }

    async fn get_by_provider_ref(
        &self,
        provider: PaymentProvider,
        provider_order_ref: &str,
    ) -> AppResult<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLS}
            FROM payment_transactions
            WHERE provider = $1 AND provider_order_ref = $2
            "#
        ))
        .bind(provider)
        .bind(provider_order_ref)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(row_to_record))
    }

    async fn find_reusable(
        &self,
        user_id: Uuid,
        planning_id: Uuid,
        provider: PaymentProvider,
        since: DateTime<Utc>,
    ) -> AppResult<Option<TransactionRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLS}
            FROM payment_transactions
            WHERE user_id = $1
              AND planning_id = $2
              AND provider = $3
              AND status IN ('pending', 'processing')
              AND checkout_url IS NOT NULL
              AND created_at >= $4
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(planning_id)
        .bind(provider)
        .bind(since)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(row_to_record))
    }

    async fn attach_checkout(
        &self,
        order_id: Uuid,
        checkout: &CheckoutAttachment,
    ) -> AppResult<TransactionRecord> {
        let form_fields = checkout
            .form_fields
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Unserializable form fields: {e}")))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_transactions
            SET provider_order_ref = $2,
                checkout_url = $3,
                form_fields = $4,
                last_updated_at = NOW()
            WHERE order_id = $1
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(order_id)
        .bind(&checkout.provider_order_ref)
        .bind(&checkout.checkout_url)
        .bind(form_fields)
        .fetch_optional(self.pool())
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(row_to_record(row))
    }

    async fn apply_result(
        &self,
        order_id: Uuid,
        update: &StatusUpdate,
        grant: Option<&EntitlementGrant>,
    ) -> AppResult<AppliedResult> {
        let mut tx = self.pool().begin().await?;
        let now = Utc::now();

        let current = fetch_locked(&mut *tx, order_id).await?;
        let check = current.status.check_transition(update.status);

        match check {
            TransitionCheck::Advance => {
                sqlx::query(
                    r#"
                    UPDATE payment_transactions
                    SET status = $2,
                        raw_provider_result_code = COALESCE($3, raw_provider_result_code),
                        unmapped_code = $4,
                        failure_reason = COALESCE($5, failure_reason),
                        provider_transaction_id = COALESCE($6, provider_transaction_id),
                        last_updated_at = $7
                    WHERE order_id = $1
                    "#,
                )
                .bind(order_id)
                .bind(update.status)
                .bind(&update.raw_code)
                .bind(update.unmapped_code)
                .bind(&update.failure_reason)
                .bind(&update.provider_transaction_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            TransitionCheck::Unchanged => {}
            TransitionCheck::Conflict | TransitionCheck::Illegal => {
                tx.rollback().await?;
                return Ok(AppliedResult {
                    record: current,
                    check,
                    activation: None,
                });
            }
        }

        let status = if check == TransitionCheck::Advance {
            update.status
        } else {
            current.status
        };

        let activation = match grant {
            Some(grant) if status == TransactionStatus::Success && !current.activation_applied => {
                Some(
                    user_planning::activate_locked(&mut *tx, order_id, false, grant, now).await?,
                )
            }
            _ => None,
        };
        if check == TransitionCheck::Advance && status == TransactionStatus::Refunded {
            user_planning::deactivate_for_order(&mut *tx, order_id, now).await?;
        }

        let record = fetch_locked(&mut *tx, order_id).await?;
        tx.commit().await?;

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
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_transactions
            SET refund_requested_at = $2, last_updated_at = $2
            WHERE order_id = $1 AND status = 'success' AND refund_requested_at IS NULL
            RETURNING {SELECT_COLS}
            "#
        ))
        .bind(order_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        if let Some(row) = row {
            return Ok(row_to_record(row));
        }

        let current = TransactionRepoTrait::get_by_order_id(self, order_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if current.status != TransactionStatus::Success {
            return Err(AppError::IllegalTransition {
                order_id,
                from: current.status,
                to: TransactionStatus::Refunded,
            });
        }
        Err(AppError::RefundInProgress(order_id))
    }

    async fn release_refund_claim(&self, order_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET refund_requested_at = NULL
            WHERE order_id = $1 AND status = 'success'
            "#,
        )
        .bind(order_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_stale_open(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLS}
            FROM payment_transactions
            WHERE status IN ('pending', 'processing') AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(created_before)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn list_unactivated_success(&self, limit: i64) -> AppResult<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLS}
            FROM payment_transactions
            WHERE status = $1 AND NOT activation_applied
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(TransactionStatus::Success)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }
}

use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::AppResult,
    application::use_cases::entitlement::PlanningRepoTrait,
    domain::entities::planning::Planning,
};

fn row_to_planning(row: sqlx::postgres::PgRow) -> Planning {
    Planning {
        id: row.get("id"),
        name: row.get("name"),
        price: row.get("price"),
        days_limit: row.get("days_limit"),
        daily_request_limit: row.get("daily_request_limit"),
        total_request_limit: row.get("total_request_limit"),
        is_purchasable: row.get("is_purchasable"),
    }
}

#[async_trait]
impl PlanningRepoTrait for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Planning>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price, days_limit, daily_request_limit,
                   total_request_limit, is_purchasable
            FROM plannings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(row_to_planning))
    }
}

use serde::Serialize;
use uuid::Uuid;

/// A purchasable package granting request quotas for a number of days.
///
/// Plannings are authored elsewhere; this service only reads them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Planning {
    pub id: Uuid,
    pub name: String,
    /// Price in minor currency units
    pub price: i64,
    pub days_limit: i32,
    pub daily_request_limit: Option<i32>,
    pub total_request_limit: Option<i32>,
    pub is_purchasable: bool,
}

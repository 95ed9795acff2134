use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Company account, identified by its registered name and GSTIN
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    pub company_name: String,
    pub gstin: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub wallet_address: Option<String>,
    pub created_at: NaiveDateTime,
}

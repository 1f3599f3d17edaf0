use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A live resume record. Hard-deleted rows are gone, so every row is live.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub slot: i16,
    pub name: String,
    pub industry: String,
    pub yoe_bucket: String,
    /// Primary blob key in the documents bucket. Fixed at create; rename does not move it.
    pub pdf_storage_key: String,
    pub pdf_size_bytes: i64,
    pub pdf_mime: String,
    pub page_count: i16,
    /// Empty until a preview has been stored.
    pub image_key_prefix: String,
    pub image_ready: bool,
    // Ranking fields: written at insert, owned by the matchmaking side afterwards.
    pub current_elo_int: i32,
    pub battles_count: i32,
    pub in_flight: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

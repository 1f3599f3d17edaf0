use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::resume::ResumeRow;

const OWNER_SLOT_CONSTRAINT: &str = "resumes_owner_slot_key";
const STORAGE_KEY_CONSTRAINT: &str = "resumes_pdf_storage_key_key";

/// Ranking defaults for a fresh resume.
pub const INITIAL_ELO: i32 = 1000;
pub const INITIAL_BATTLES: i32 = 0;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("slot {slot} is already taken for this owner")]
    SlotTaken { slot: i16 },

    #[error("storage key already belongs to another resume")]
    StorageKeyTaken,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fields supplied by the lifecycle when inserting a resume.
#[derive(Debug, Clone)]
pub struct NewResume {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub slot: i16,
    pub name: String,
    pub industry: String,
    pub yoe_bucket: String,
    pub pdf_storage_key: String,
    pub pdf_size_bytes: i64,
    pub pdf_mime: String,
    pub page_count: i16,
}

/// Owner-scoped access to resume records. Every read and write filters by owner.
#[async_trait]
pub trait ResumeRepository: Send + Sync {
    async fn occupied_slots(&self, owner: Uuid) -> Result<Vec<i16>, RepositoryError>;

    /// Whether any live record already points at `key` in the documents bucket.
    async fn storage_key_in_use(&self, key: &str) -> Result<bool, RepositoryError>;

    /// Insert with `image_ready = false` and the default ranking fields.
    async fn insert(&self, new: &NewResume) -> Result<ResumeRow, RepositoryError>;

    async fn update_name(
        &self,
        id: Uuid,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<ResumeRow>, RepositoryError>;

    async fn update_preview(
        &self,
        id: Uuid,
        owner: Uuid,
        prefix: &str,
        ready: bool,
    ) -> Result<Option<ResumeRow>, RepositoryError>;

    async fn get(&self, id: Uuid, owner: Uuid) -> Result<Option<ResumeRow>, RepositoryError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool, RepositoryError>;

    async fn list(
        &self,
        owner: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ResumeRow>, RepositoryError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

pub struct PgResumeRepository {
    pool: PgPool,
}

impl PgResumeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn classify_insert_error(err: sqlx::Error, slot: i16) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(OWNER_SLOT_CONSTRAINT) => return RepositoryError::SlotTaken { slot },
                Some(STORAGE_KEY_CONSTRAINT) => return RepositoryError::StorageKeyTaken,
                _ => {}
            }
        }
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl ResumeRepository for PgResumeRepository {
    async fn occupied_slots(&self, owner: Uuid) -> Result<Vec<i16>, RepositoryError> {
        let slots: Vec<i16> =
            sqlx::query_scalar("SELECT slot FROM resumes WHERE owner_user_id = $1 ORDER BY slot")
                .bind(owner)
                .fetch_all(&self.pool)
                .await?;
        Ok(slots)
    }

    async fn storage_key_in_use(&self, key: &str) -> Result<bool, RepositoryError> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM resumes WHERE pdf_storage_key = $1)",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }

    async fn insert(&self, new: &NewResume) -> Result<ResumeRow, RepositoryError> {
        sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resumes (
                id, owner_user_id, slot, name, industry, yoe_bucket,
                pdf_storage_key, pdf_size_bytes, pdf_mime, page_count,
                image_key_prefix, image_ready,
                current_elo_int, battles_count, in_flight
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, '', FALSE, $11, $12, FALSE)
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.owner_user_id)
        .bind(new.slot)
        .bind(&new.name)
        .bind(&new.industry)
        .bind(&new.yoe_bucket)
        .bind(&new.pdf_storage_key)
        .bind(new.pdf_size_bytes)
        .bind(&new.pdf_mime)
        .bind(new.page_count)
        .bind(INITIAL_ELO)
        .bind(INITIAL_BATTLES)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_insert_error(e, new.slot))
    }

    async fn update_name(
        &self,
        id: Uuid,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<ResumeRow>, RepositoryError> {
        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            UPDATE resumes SET name = $3, updated_at = now()
            WHERE id = $1 AND owner_user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_preview(
        &self,
        id: Uuid,
        owner: Uuid,
        prefix: &str,
        ready: bool,
    ) -> Result<Option<ResumeRow>, RepositoryError> {
        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            UPDATE resumes SET image_key_prefix = $3, image_ready = $4, updated_at = now()
            WHERE id = $1 AND owner_user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(prefix)
        .bind(ready)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid, owner: Uuid) -> Result<Option<ResumeRow>, RepositoryError> {
        let row = sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE id = $1 AND owner_user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND owner_user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        owner: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ResumeRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, ResumeRow>(
            r#"
            SELECT * FROM resumes
            WHERE owner_user_id = $1
            ORDER BY slot
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

//! Resume lifecycle across the documents bucket, the previews bucket and the
//! `resumes` table.
//!
//! There is no distributed transaction. Steps run in an order where a failure
//! leaves, at worst, a blob that no record points at. Such a blob can never be
//! served, and the next create under the same name overwrites it.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::resume::ResumeRow;
use crate::storage::{BoxReader, ObjectStore};

use super::error::{store_failure, ResumeError};
use super::keys::{self, ResumeName, PREVIEW_FORMAT_VERSION};
use super::preview::{PreviewError, PreviewRenderer};
use super::repository::{NewResume, RepositoryError, ResumeRepository};
use super::slots::{find_free_slot, MAX_SLOTS};
use super::validation::{DocumentValidator, Upload, ValidationLimits};

/// A create that loses the slot race re-reads the free slots this many times.
const SLOT_RACE_RETRIES: usize = 1;

const PREVIEW_PENDING_WARNING: &str =
    "resume saved, but its preview could not be generated yet";

pub struct CreateResume {
    pub name: String,
    pub industry: String,
    pub yoe_bucket: String,
    pub upload: Upload,
}

#[derive(Debug, Serialize)]
pub struct CreatedResume {
    pub resume: ResumeRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct ResumeDownload {
    pub filename: String,
    pub content_type: String,
    pub content_length: u64,
    pub body: BoxReader,
}

pub struct ResumeService {
    repo: Arc<dyn ResumeRepository>,
    documents: Arc<dyn ObjectStore>,
    previews: Arc<dyn ObjectStore>,
    renderer: Arc<dyn PreviewRenderer>,
    validator: DocumentValidator,
}

impl ResumeService {
    pub fn new(
        repo: Arc<dyn ResumeRepository>,
        documents: Arc<dyn ObjectStore>,
        previews: Arc<dyn ObjectStore>,
        renderer: Arc<dyn PreviewRenderer>,
        validator: DocumentValidator,
    ) -> Self {
        Self {
            repo,
            documents,
            previews,
            renderer,
            validator,
        }
    }

    pub fn limits(&self) -> &ValidationLimits {
        self.validator.limits()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Create
    // ────────────────────────────────────────────────────────────────────────

    pub async fn create(
        &self,
        owner: Uuid,
        req: CreateResume,
    ) -> Result<CreatedResume, ResumeError> {
        let name = ResumeName::parse(&req.name)?;
        let document = self.validator.validate(&req.upload).await.map_err(|e| {
            info!(owner = %owner, reason = e.code(), "upload rejected");
            e
        })?;
        let slot = find_free_slot(self.repo.as_ref(), owner).await?;

        let key = keys::primary_key(owner, &name);
        let in_use = self
            .repo
            .storage_key_in_use(&key)
            .await
            .map_err(|e| store_failure("create", owner, None, e))?;
        if in_use {
            return Err(ResumeError::Conflict(format!(
                "a resume stored as '{name}' already exists"
            )));
        }

        self.documents
            .put(&key, req.upload.bytes.clone(), &document.mime_type)
            .await
            .map_err(|e| store_failure("create", owner, None, e))?;

        let mut new = NewResume {
            id: Uuid::new_v4(),
            owner_user_id: owner,
            slot,
            name: name.into_string(),
            industry: req.industry.trim().to_string(),
            yoe_bucket: req.yoe_bucket.trim().to_string(),
            pdf_storage_key: key,
            pdf_size_bytes: document.size_bytes as i64,
            pdf_mime: document.mime_type,
            page_count: document.page_count as i16,
        };

        let mut retries = 0;
        let resume = loop {
            match self.repo.insert(&new).await {
                Ok(row) => break row,
                Err(RepositoryError::SlotTaken { slot }) if retries < SLOT_RACE_RETRIES => {
                    retries += 1;
                    warn!(owner = %owner, slot, "slot taken by a concurrent upload; reallocating");
                    new.slot = find_free_slot(self.repo.as_ref(), owner).await?;
                }
                Err(e) => return Err(insert_failure(owner, e)),
            }
        };

        info!(
            owner = %owner,
            resume_id = %resume.id,
            slot = resume.slot,
            pages = resume.page_count,
            "resume created"
        );

        self.restore_if_overwritten(&resume, &req.upload.bytes).await;

        let (resume, warning) = match self.store_preview(&resume, req.upload.bytes).await {
            Ok(updated) => (updated, None),
            Err(e) => {
                warn!(
                    owner = %owner,
                    resume_id = %resume.id,
                    error = %e,
                    "preview generation failed; resume kept without preview"
                );
                (resume, Some(PREVIEW_PENDING_WARNING.to_string()))
            }
        };

        Ok(CreatedResume { resume, warning })
    }

    /// A concurrent create under the same name may have replaced the document
    /// between this create's put and its insert. The record must describe the
    /// bytes this create validated, so they are written again.
    async fn restore_if_overwritten(&self, row: &ResumeRow, bytes: &Bytes) {
        let expected = bytes.len() as u64;
        let found = match self.documents.head(&row.pdf_storage_key).await {
            Ok(meta) if meta.content_length == expected => return,
            Ok(meta) => meta.content_length,
            Err(e) => {
                warn!(owner = %row.owner_user_id, resume_id = %row.id, error = %e, "could not verify stored document");
                return;
            }
        };

        warn!(
            owner = %row.owner_user_id,
            resume_id = %row.id,
            expected,
            found,
            "document replaced by a concurrent upload; restoring"
        );
        if let Err(e) = self
            .documents
            .put(&row.pdf_storage_key, bytes.clone(), &row.pdf_mime)
            .await
        {
            warn!(owner = %row.owner_user_id, resume_id = %row.id, error = %e, "failed to restore document");
        }
    }

    /// Render, store under a content-addressed prefix, then record the prefix.
    async fn store_preview(&self, row: &ResumeRow, pdf: Bytes) -> Result<ResumeRow, PreviewError> {
        let rendered = self.renderer.render_first_page(pdf).await?;
        let prefix = keys::preview_prefix(
            row.owner_user_id,
            row.id,
            PREVIEW_FORMAT_VERSION,
            &keys::content_hash(&rendered.bytes),
        );

        self.previews
            .put(&keys::preview_key(&prefix), rendered.bytes, rendered.content_type)
            .await?;

        self.repo
            .update_preview(row.id, row.owner_user_id, &prefix, true)
            .await?
            .ok_or(PreviewError::RecordGone)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Rename / Delete / List
    // ────────────────────────────────────────────────────────────────────────

    /// Changes the display name only. The document keeps its original key.
    pub async fn rename(
        &self,
        owner: Uuid,
        id: Uuid,
        new_name: &str,
    ) -> Result<ResumeRow, ResumeError> {
        let name = ResumeName::parse(new_name)?;
        let row = self
            .repo
            .update_name(id, owner, name.as_str())
            .await
            .map_err(|e| store_failure("rename", owner, Some(id), e))?
            .ok_or(ResumeError::NotFound)?;

        info!(owner = %owner, resume_id = %id, name = %name, "resume renamed");
        Ok(row)
    }

    /// Blobs go first: a failure leaves the record, which can still be retried.
    pub async fn delete(&self, owner: Uuid, id: Uuid) -> Result<(), ResumeError> {
        let row = self.fetch(owner, id, "delete").await?;

        self.documents
            .delete_many(std::slice::from_ref(&row.pdf_storage_key))
            .await
            .map_err(|e| store_failure("delete", owner, Some(id), e))?;

        // Whole root: earlier renders whose cleanup failed live beside the current prefix.
        self.previews
            .delete_prefix(&keys::preview_root(owner, id))
            .await
            .map_err(|e| store_failure("delete", owner, Some(id), e))?;

        let removed = self
            .repo
            .delete(id, owner)
            .await
            .map_err(|e| store_failure("delete", owner, Some(id), e))?;
        if !removed {
            return Err(ResumeError::NotFound);
        }

        info!(owner = %owner, resume_id = %id, slot = row.slot, "resume deleted");
        Ok(())
    }

    pub async fn list(&self, owner: Uuid) -> Result<Vec<ResumeRow>, ResumeError> {
        self.repo
            .list(owner, i64::from(MAX_SLOTS), 0)
            .await
            .map_err(|e| store_failure("list", owner, None, e))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Download / Preview refresh
    // ────────────────────────────────────────────────────────────────────────

    pub async fn download(&self, owner: Uuid, id: Uuid) -> Result<ResumeDownload, ResumeError> {
        let row = self.fetch(owner, id, "download").await?;
        let key = &row.pdf_storage_key;

        let meta = self
            .documents
            .head(key)
            .await
            .map_err(|e| store_failure("download", owner, Some(id), e))?;
        debug!(owner = %owner, resume_id = %id, e_tag = ?meta.e_tag, "serving resume");
        let body = self
            .documents
            .get_stream(key)
            .await
            .map_err(|e| store_failure("download", owner, Some(id), e))?;

        Ok(ResumeDownload {
            filename: format!("{}.pdf", row.name),
            content_type: meta.content_type.unwrap_or(row.pdf_mime),
            content_length: meta.content_length,
            body,
        })
    }

    /// Re-render the preview from the stored document and swap the record over
    /// to the new prefix. The superseded prefix is removed best-effort.
    pub async fn refresh_preview(&self, owner: Uuid, id: Uuid) -> Result<ResumeRow, ResumeError> {
        let row = self.fetch(owner, id, "refresh_preview").await?;

        let mut pdf = Vec::with_capacity(row.pdf_size_bytes.max(0) as usize);
        self.documents
            .stream_to(&row.pdf_storage_key, &mut pdf)
            .await
            .map_err(|e| store_failure("refresh_preview", owner, Some(id), e))?;

        let updated = match self.store_preview(&row, Bytes::from(pdf)).await {
            Ok(updated) => updated,
            Err(PreviewError::RecordGone) => return Err(ResumeError::NotFound),
            Err(e @ (PreviewError::Storage(_) | PreviewError::Record(_))) => {
                return Err(store_failure("refresh_preview", owner, Some(id), e))
            }
            Err(e) => {
                warn!(owner = %owner, resume_id = %id, error = %e, "preview render failed");
                return Err(ResumeError::PreviewFailed);
            }
        };

        let previous = row.image_key_prefix;
        if !previous.is_empty() && previous != updated.image_key_prefix {
            if let Err(e) = self.previews.delete_prefix(&previous).await {
                warn!(
                    owner = %owner,
                    resume_id = %id,
                    prefix = %previous,
                    failed = ?e.failed_keys(),
                    error = %e,
                    "failed to remove superseded preview"
                );
            }
        }

        info!(owner = %owner, resume_id = %id, prefix = %updated.image_key_prefix, "preview refreshed");
        Ok(updated)
    }

    async fn fetch(
        &self,
        owner: Uuid,
        id: Uuid,
        operation: &'static str,
    ) -> Result<ResumeRow, ResumeError> {
        self.repo
            .get(id, owner)
            .await
            .map_err(|e| store_failure(operation, owner, Some(id), e))?
            .ok_or(ResumeError::NotFound)
    }
}

fn insert_failure(owner: Uuid, err: RepositoryError) -> ResumeError {
    match err {
        RepositoryError::SlotTaken { .. } => {
            ResumeError::Conflict("another upload claimed the same slot; try again".to_string())
        }
        RepositoryError::StorageKeyTaken => {
            ResumeError::Conflict("a resume with this name already exists".to_string())
        }
        RepositoryError::Database(e) => store_failure("create", owner, None, e),
    }
}

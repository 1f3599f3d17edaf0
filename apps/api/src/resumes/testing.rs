//! Fakes shared by the resume and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use lopdf::{dictionary, Document, Object, Stream};
use uuid::Uuid;

use crate::models::resume::ResumeRow;
use crate::storage::memory::InMemoryBucket;

use super::preview::{PreviewError, PreviewRenderer, RenderedPreview, PREVIEW_CONTENT_TYPE};
use super::repository::{NewResume, RepositoryError, ResumeRepository, INITIAL_BATTLES, INITIAL_ELO};
use super::service::ResumeService;
use super::validation::{DocumentValidator, ValidationLimits};

/// A minimal PDF with `pages` empty pages, plus `padding` bytes of filler stream.
pub fn pdf_with_pages(pages: usize, padding: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(pages);
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    if padding > 0 {
        doc.add_object(Stream::new(dictionary! {}, vec![b' '; padding]));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("serialize test pdf");
    buf
}

// ────────────────────────────────────────────────────────────────────────────
// Repository
// ────────────────────────────────────────────────────────────────────────────

/// Enforces the same unique constraints as the `resumes` table.
#[derive(Default)]
pub struct InMemoryResumeRepository {
    rows: Mutex<Vec<ResumeRow>>,
    stale_slot_reads: AtomicUsize,
}

impl InMemoryResumeRepository {
    /// The next `n` slot lookups see no occupied slots, as a racing request would.
    pub fn serve_stale_slot_reads(&self, n: usize) {
        self.stale_slot_reads.store(n, Ordering::SeqCst);
    }

    pub fn count(&self, owner: Uuid) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_user_id == owner)
            .count()
    }

    fn update<F>(&self, id: Uuid, owner: Uuid, f: F) -> Option<ResumeRow>
    where
        F: FnOnce(&mut ResumeRow),
    {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id && r.owner_user_id == owner)?;
        f(row);
        row.updated_at = Utc::now();
        Some(row.clone())
    }
}

#[async_trait]
impl ResumeRepository for InMemoryResumeRepository {
    async fn occupied_slots(&self, owner: Uuid) -> Result<Vec<i16>, RepositoryError> {
        let stale = self
            .stale_slot_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_user_id == owner)
            .map(|r| r.slot)
            .collect())
    }

    async fn storage_key_in_use(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.pdf_storage_key == key))
    }

    async fn insert(&self, new: &NewResume) -> Result<ResumeRow, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.owner_user_id == new.owner_user_id && r.slot == new.slot)
        {
            return Err(RepositoryError::SlotTaken { slot: new.slot });
        }
        if rows.iter().any(|r| r.pdf_storage_key == new.pdf_storage_key) {
            return Err(RepositoryError::StorageKeyTaken);
        }

        let now = Utc::now();
        let row = ResumeRow {
            id: new.id,
            owner_user_id: new.owner_user_id,
            slot: new.slot,
            name: new.name.clone(),
            industry: new.industry.clone(),
            yoe_bucket: new.yoe_bucket.clone(),
            pdf_storage_key: new.pdf_storage_key.clone(),
            pdf_size_bytes: new.pdf_size_bytes,
            pdf_mime: new.pdf_mime.clone(),
            page_count: new.page_count,
            image_key_prefix: String::new(),
            image_ready: false,
            current_elo_int: INITIAL_ELO,
            battles_count: INITIAL_BATTLES,
            in_flight: false,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn update_name(
        &self,
        id: Uuid,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<ResumeRow>, RepositoryError> {
        Ok(self.update(id, owner, |r| r.name = name.to_string()))
    }

    async fn update_preview(
        &self,
        id: Uuid,
        owner: Uuid,
        prefix: &str,
        ready: bool,
    ) -> Result<Option<ResumeRow>, RepositoryError> {
        Ok(self.update(id, owner, |r| {
            r.image_key_prefix = prefix.to_string();
            r.image_ready = ready;
        }))
    }

    async fn get(&self, id: Uuid, owner: Uuid) -> Result<Option<ResumeRow>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id && r.owner_user_id == owner)
            .cloned())
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.id == id && r.owner_user_id == owner));
        Ok(rows.len() < before)
    }

    async fn list(
        &self,
        owner: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ResumeRow>, RepositoryError> {
        let mut rows: Vec<ResumeRow> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_user_id == owner)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.slot);
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Renderer
// ────────────────────────────────────────────────────────────────────────────

pub struct StubRenderer {
    output: Mutex<Bytes>,
    failing: Mutex<bool>,
}

impl Default for StubRenderer {
    fn default() -> Self {
        Self {
            output: Mutex::new(Bytes::from_static(b"\x89PNG\x0D\x0A\x1A\x0Astub")),
            failing: Mutex::new(false),
        }
    }
}

impl StubRenderer {
    pub fn set_output(&self, bytes: &[u8]) {
        *self.output.lock().unwrap() = Bytes::copy_from_slice(bytes);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl PreviewRenderer for StubRenderer {
    async fn render_first_page(&self, _pdf: Bytes) -> Result<RenderedPreview, PreviewError> {
        if *self.failing.lock().unwrap() {
            return Err(PreviewError::Renderer {
                status: "exit status: 1".to_string(),
                stderr: "Syntax Error: Couldn't read xref table".to_string(),
            });
        }
        Ok(RenderedPreview {
            bytes: self.output.lock().unwrap().clone(),
            content_type: PREVIEW_CONTENT_TYPE,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub service: Arc<ResumeService>,
    pub repo: Arc<InMemoryResumeRepository>,
    pub documents: Arc<InMemoryBucket>,
    pub previews: Arc<InMemoryBucket>,
    pub renderer: Arc<StubRenderer>,
}

impl Harness {
    pub fn new() -> Self {
        let repo = Arc::new(InMemoryResumeRepository::default());
        let documents = Arc::new(InMemoryBucket::new("resumes"));
        let previews = Arc::new(InMemoryBucket::new("previews"));
        let renderer = Arc::new(StubRenderer::default());

        let service = Arc::new(ResumeService::new(
            repo.clone(),
            documents.clone(),
            previews.clone(),
            renderer.clone(),
            DocumentValidator::new(ValidationLimits::default()),
        ));

        Self {
            service,
            repo,
            documents,
            previews,
            renderer,
        }
    }
}

//! First-page raster previews.
//!
//! Production shells out to `pdftoppm` (poppler-utils). The renderer runs inside
//! the request future and is killed if the request is dropped.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::storage::StorageError;

use super::repository::RepositoryError;

pub const PREVIEW_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("renderer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("renderer exited with {status}: {stderr}")]
    Renderer { status: String, stderr: String },

    #[error("renderer produced no image")]
    EmptyOutput,

    #[error("failed to store preview: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to record preview: {0}")]
    Record(#[from] RepositoryError),

    #[error("resume was removed while its preview was rendering")]
    RecordGone,
}

#[derive(Debug, Clone)]
pub struct RenderedPreview {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn render_first_page(&self, pdf: Bytes) -> Result<RenderedPreview, PreviewError>;
}

pub struct PdftoppmRenderer {
    binary: PathBuf,
    width_px: u32,
}

impl PdftoppmRenderer {
    pub fn new(binary: impl Into<PathBuf>, width_px: u32) -> Self {
        Self {
            binary: binary.into(),
            width_px,
        }
    }
}

#[async_trait]
impl PreviewRenderer for PdftoppmRenderer {
    async fn render_first_page(&self, pdf: Bytes) -> Result<RenderedPreview, PreviewError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.pdf");
        let output_base = dir.path().join("preview");
        tokio::fs::write(&input, &pdf).await?;

        let output = Command::new(&self.binary)
            .arg("-png")
            .args(["-f", "1", "-l", "1"])
            .arg("-singlefile")
            .arg("-scale-to-x")
            .arg(self.width_px.to_string())
            .args(["-scale-to-y", "-1"])
            .arg(&input)
            .arg(&output_base)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(PreviewError::Renderer {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let png = tokio::fs::read(output_base.with_extension("png")).await?;
        if png.is_empty() {
            return Err(PreviewError::EmptyOutput);
        }
        debug!(bytes = png.len(), width_px = self.width_px, "rendered preview");

        Ok(RenderedPreview {
            bytes: Bytes::from(png),
            content_type: PREVIEW_CONTENT_TYPE,
        })
    }
}

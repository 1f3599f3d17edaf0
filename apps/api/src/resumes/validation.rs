//! Structural validation of uploaded resume documents.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. declared size within the limit
//! 2. declared content type is `application/pdf`
//! 3. actual byte count within the limit
//! 4. sniffed content type is PDF or opaque binary
//! 5. `%PDF-` signature
//! 6. page count parsed on a blocking worker under a hard deadline
//! 7. page count in `1..=max_pages`
//!
//! Every check is a pure function of the bytes and the declared metadata.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

pub const PDF_MIME: &str = "application/pdf";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

pub const MAX_FILE_SIZE: u64 = 1 << 20;
pub const MAX_PAGES: usize = 2;
pub const PARSE_TIMEOUT: Duration = Duration::from_millis(750);

/// Sniffing looks at no more than this many leading bytes.
const SNIFF_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("only PDF uploads are accepted")]
    WrongType,

    #[error("file is not a PDF document")]
    BadFormat,

    #[error("document took too long to parse")]
    ParseTimeout,

    #[error("document could not be parsed")]
    ParseFailed,

    #[error("document has no pages")]
    EmptyDocument,

    #[error("document has {pages} pages; at most {max} allowed")]
    TooManyPages { pages: usize, max: usize },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::TooLarge { .. } => "TOO_LARGE",
            ValidationError::WrongType => "WRONG_TYPE",
            ValidationError::BadFormat => "BAD_FORMAT",
            ValidationError::ParseTimeout => "PARSE_TIMEOUT",
            ValidationError::ParseFailed => "PARSE_FAILED",
            ValidationError::EmptyDocument => "EMPTY_DOCUMENT",
            ValidationError::TooManyPages { .. } => "TOO_MANY_PAGES",
        }
    }
}

/// An untrusted upload as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub declared_size: u64,
    pub declared_content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedDocument {
    pub size_bytes: u64,
    pub mime_type: String,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_file_size: u64,
    pub max_pages: usize,
    pub parse_timeout: Duration,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_pages: MAX_PAGES,
            parse_timeout: PARSE_TIMEOUT,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page counting
// ────────────────────────────────────────────────────────────────────────────

/// Counts pages in a PDF. Runs on a blocking thread and may panic on hostile input.
pub trait PageCounter: Send + Sync + 'static {
    fn count_pages(&self, bytes: &[u8]) -> anyhow::Result<usize>;
}

pub struct LopdfPageCounter;

impl PageCounter for LopdfPageCounter {
    fn count_pages(&self, bytes: &[u8]) -> anyhow::Result<usize> {
        let doc = lopdf::Document::load_mem(bytes)?;
        Ok(doc.get_pages().len())
    }
}

/// Race the parse against `timeout`. A timed-out worker is abandoned, not joined.
pub async fn count_pages_bounded(
    counter: &Arc<dyn PageCounter>,
    bytes: Bytes,
    timeout: Duration,
) -> Result<usize, ValidationError> {
    let counter = Arc::clone(counter);
    let worker = tokio::task::spawn_blocking(move || counter.count_pages(&bytes));

    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(Ok(pages))) => Ok(pages),
        Ok(Ok(Err(e))) => {
            debug!(error = %e, "pdf parse failed");
            Err(ValidationError::ParseFailed)
        }
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "pdf parser panicked");
            Err(ValidationError::ParseFailed)
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "pdf parse timed out");
            Err(ValidationError::ParseTimeout)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DocumentValidator {
    limits: ValidationLimits,
    counter: Arc<dyn PageCounter>,
}

impl DocumentValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self::with_counter(limits, Arc::new(LopdfPageCounter))
    }

    pub fn with_counter(limits: ValidationLimits, counter: Arc<dyn PageCounter>) -> Self {
        Self { limits, counter }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    pub async fn validate(&self, upload: &Upload) -> Result<ValidatedDocument, ValidationError> {
        let limit = self.limits.max_file_size;

        if upload.declared_size > limit {
            return Err(ValidationError::TooLarge { limit });
        }
        if !is_pdf_content_type(&upload.declared_content_type) {
            return Err(ValidationError::WrongType);
        }
        if upload.bytes.len() as u64 > limit {
            return Err(ValidationError::TooLarge { limit });
        }

        let sniffed = sniff_content_type(&upload.bytes);
        if sniffed != PDF_MIME && sniffed != OCTET_STREAM_MIME {
            return Err(ValidationError::WrongType);
        }
        if !upload.bytes.starts_with(PDF_SIGNATURE) {
            return Err(ValidationError::BadFormat);
        }

        let pages =
            count_pages_bounded(&self.counter, upload.bytes.clone(), self.limits.parse_timeout)
                .await?;
        if pages == 0 {
            return Err(ValidationError::EmptyDocument);
        }
        if pages > self.limits.max_pages {
            return Err(ValidationError::TooManyPages {
                pages,
                max: self.limits.max_pages,
            });
        }

        Ok(ValidatedDocument {
            size_bytes: upload.bytes.len() as u64,
            mime_type: PDF_MIME.to_string(),
            page_count: pages,
        })
    }
}

/// Accepts `application/pdf` with optional parameters, case-insensitively.
fn is_pdf_content_type(declared: &str) -> bool {
    declared
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME))
        .unwrap_or(false)
}

/// Read at most `limit + 1` bytes so callers can tell "exactly at the limit"
/// from "over it" without buffering an unbounded body.
pub async fn read_bounded<R>(reader: R, limit: u64) -> std::io::Result<Bytes>
where
    R: AsyncRead,
{
    tokio::pin!(reader);
    let mut buf = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

// ────────────────────────────────────────────────────────────────────────────
// Content sniffing
// ────────────────────────────────────────────────────────────────────────────

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", PDF_MIME),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
];

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<BODY",
    b"<IFRAME",
    b"<TABLE",
    b"<DIV",
    b"<P",
];

/// Best-guess MIME type from leading bytes, following the WHATWG sniffing table.
/// Anything unrecognised containing binary control bytes is `application/octet-stream`.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| head.starts_with(sig)) {
        return *mime;
    }
    if head.len() >= 14 && &head[..4] == b"RIFF" && &head[8..14] == b"WEBPVP" {
        return "image/webp";
    }

    let text = trim_leading_whitespace(head);
    if HTML_TAGS.iter().any(|tag| starts_with_tag(text, tag)) {
        return "text/html; charset=utf-8";
    }
    if text.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if head.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM_MIME
    } else {
        "text/plain; charset=utf-8"
    }
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Case-insensitive tag match that also requires a tag-terminating byte.
fn starts_with_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

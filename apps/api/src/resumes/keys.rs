//! Object key derivation for both buckets.
//!
//! Documents: `{owner}/resumes/{name}`
//! Previews:  `{owner}/resumes/{resume_id}/{version}-{hash}/{filename}`
//!
//! Owner and resume ids are UUIDs and names never contain `/`, so distinct
//! inputs always give distinct keys.

use std::fmt;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::ResumeError;

pub const RESUME_NAME_MAX_LEN: usize = 40;

/// Bumped whenever the rendering pipeline changes output for the same input.
pub const PREVIEW_FORMAT_VERSION: &str = "v1";
pub const PREVIEW_FILENAME: &str = "preview.png";

/// Number of hash bytes kept in a preview prefix (hex-encoded to twice this).
const PREVIEW_HASH_BYTES: usize = 8;

/// A validated resume name: 1 to 40 ASCII alphanumerics, `-` or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeName(String);

impl ResumeName {
    pub fn parse(raw: &str) -> Result<Self, ResumeError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ResumeError::InvalidName("name is required".to_string()));
        }
        if name.chars().count() > RESUME_NAME_MAX_LEN {
            return Err(ResumeError::InvalidName(format!(
                "name must be at most {RESUME_NAME_MAX_LEN} characters"
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ResumeError::InvalidName(
                "name may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn primary_key(owner: Uuid, name: &ResumeName) -> String {
    format!("{owner}/resumes/{name}")
}

/// Everything ever stored for one resume in the previews bucket lives under this.
pub fn preview_root(owner: Uuid, resume_id: Uuid) -> String {
    format!("{owner}/resumes/{resume_id}/")
}

pub fn preview_prefix(owner: Uuid, resume_id: Uuid, version: &str, hash: &str) -> String {
    debug_assert!(is_segment(version) && is_segment(hash));
    format!("{}{version}-{hash}/", preview_root(owner, resume_id))
}

pub fn preview_key(prefix: &str) -> String {
    format!("{prefix}{PREVIEW_FILENAME}")
}

/// Short content hash of a rendered preview.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..PREVIEW_HASH_BYTES])
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

use thiserror::Error;

/// A single key that a bulk delete could not remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelete {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object too large for a single put: {0}")]
    TooLarge(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to delete {} object(s): {}", .failed.len(), summarize(.failed))]
    PartialDelete { failed: Vec<FailedDelete> },

    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),
}

impl StorageError {
    /// Keys that a bulk delete left behind, if this is a delete failure.
    pub fn failed_keys(&self) -> Vec<&str> {
        match self {
            StorageError::PartialDelete { failed } => failed.iter().map(|f| f.key.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

fn summarize(failed: &[FailedDelete]) -> String {
    const SHOWN: usize = 5;
    let mut parts: Vec<String> = failed
        .iter()
        .take(SHOWN)
        .map(|f| format!("{} ({})", f.key, f.reason))
        .collect();
    if failed.len() > SHOWN {
        parts.push(format!("and {} more", failed.len() - SHOWN));
    }
    parts.join(", ")
}

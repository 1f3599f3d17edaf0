//! Object storage: the capability every bucket handle exposes to the resume lifecycle.
//!
//! Two buckets are wired at startup (documents and previews), each as its own
//! `Arc<dyn ObjectStore>`. Production uses `S3Bucket`; tests use `memory::InMemoryBucket`.

mod error;
#[cfg(test)]
pub mod memory;
pub mod s3;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub use error::{FailedDelete, StorageError};
pub use s3::S3Bucket;

/// The backing object service rejects bulk deletes above this many keys.
pub const MAX_KEYS_PER_DELETE: usize = 1000;

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_length: u64,
    pub e_tag: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket name, for logs.
    fn bucket(&self) -> &str;

    /// Store `body` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn head(&self, key: &str) -> Result<ObjectMetadata, StorageError>;

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError>;

    /// All keys under `prefix`, across every page of results.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// One backend delete call. Callers never pass more than `MAX_KEYS_PER_DELETE` keys.
    /// Absent keys count as deleted.
    async fn delete_batch(&self, keys: &[String]) -> Result<(), StorageError>;

    /// Delete any number of keys, chunked to the backend limit.
    ///
    /// Every chunk is attempted. If any key fails, a single `PartialDelete` carrying
    /// all failed keys is returned.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut failed = Vec::new();

        for chunk in keys.chunks(MAX_KEYS_PER_DELETE) {
            match self.delete_batch(chunk).await {
                Ok(()) => {}
                Err(StorageError::PartialDelete { failed: chunk_failed }) => {
                    failed.extend(chunk_failed)
                }
                Err(e) => {
                    let reason = e.to_string();
                    failed.extend(chunk.iter().map(|key| FailedDelete {
                        key: key.clone(),
                        reason: reason.clone(),
                    }));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::PartialDelete { failed })
        }
    }

    /// Delete everything under `prefix`. An empty prefix is a no-op, never a
    /// whole-bucket wipe. Returns the number of keys removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        if prefix.is_empty() {
            return Ok(0);
        }
        let keys = self.list(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete_many(&keys).await?;
        debug!(bucket = self.bucket(), prefix, removed = keys.len(), "deleted prefix");
        Ok(keys.len())
    }

    /// Copy the object at `key` into `writer`, returning the number of bytes written.
    async fn stream_to(
        &self,
        key: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let mut reader = self.get_stream(key).await?;
        let written = tokio::io::copy(&mut reader, writer).await?;
        writer.flush().await?;
        Ok(written)
    }
}

/// Poll `head` until the object is visible or `within` elapses.
///
/// Read-after-write lag is tolerated: `false` means "not confirmed yet", not "lost".
pub async fn confirm_exists<S>(store: &S, key: &str, within: Duration) -> bool
where
    S: ObjectStore + ?Sized,
{
    let poll = async {
        loop {
            match store.head(key).await {
                Ok(_) => return,
                Err(e) => {
                    debug!(bucket = store.bucket(), key, error = %e, "object not visible yet");
                    tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
                }
            }
        }
    };
    tokio::time::timeout(within, poll).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryBucket;
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("owner/resumes/{i}")).collect()
    }

    #[tokio::test]
    async fn test_delete_many_chunks_at_backend_limit() {
        let bucket = InMemoryBucket::new("previews");
        let keys = keys(2500);
        for key in &keys {
            bucket.insert(key, b"x", "image/png");
        }

        bucket.delete_many(&keys).await.unwrap();

        assert_eq!(bucket.delete_batch_sizes(), vec![1000, 1000, 500]);
        assert_eq!(bucket.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_many_aggregates_failed_keys_across_chunks() {
        let bucket = InMemoryBucket::new("previews");
        let keys = keys(1500);
        for key in &keys {
            bucket.insert(key, b"x", "image/png");
        }
        bucket.fail_delete_of(&keys[10]);
        bucket.fail_delete_of(&keys[1200]);

        let err = bucket.delete_many(&keys).await.unwrap_err();

        assert_eq!(err.failed_keys(), vec![keys[10].as_str(), keys[1200].as_str()]);
        // Every chunk was still attempted.
        assert_eq!(bucket.delete_batch_sizes(), vec![1000, 500]);
        assert_eq!(bucket.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_many_whole_batch_failure_lists_every_key() {
        let bucket = InMemoryBucket::new("documents");
        let keys = keys(3);
        bucket.set_unavailable(true);

        let err = bucket.delete_many(&keys).await.unwrap_err();
        assert_eq!(err.failed_keys().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_of_absent_key_matches_present_key() {
        let bucket = InMemoryBucket::new("documents");
        bucket.insert("a/resumes/present", b"%PDF-", "application/pdf");

        let present = bucket.delete_many(&["a/resumes/present".to_string()]).await;
        let absent = bucket.delete_many(&["a/resumes/absent".to_string()]).await;

        assert!(present.is_ok());
        assert!(absent.is_ok());
    }

    #[tokio::test]
    async fn test_delete_prefix_with_empty_prefix_is_noop() {
        let bucket = InMemoryBucket::new("previews");
        bucket.insert("a/resumes/1/v1-abc/preview.png", b"png", "image/png");

        assert_eq!(bucket.delete_prefix("").await.unwrap(), 0);
        assert_eq!(bucket.len(), 1);
        assert!(bucket.delete_batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_matching_keys() {
        let bucket = InMemoryBucket::new("previews");
        bucket.insert("a/resumes/1/v1-abc/preview.png", b"png", "image/png");
        bucket.insert("a/resumes/1/v1-def/preview.png", b"png", "image/png");
        bucket.insert("a/resumes/2/v1-abc/preview.png", b"png", "image/png");

        let removed = bucket.delete_prefix("a/resumes/1/").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(bucket.keys(), vec!["a/resumes/2/v1-abc/preview.png".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_to_copies_all_bytes() {
        let bucket = InMemoryBucket::new("documents");
        bucket.insert("a/resumes/cv", b"%PDF-1.7 body", "application/pdf");

        let mut sink: Vec<u8> = Vec::new();
        let written = bucket.stream_to("a/resumes/cv", &mut sink).await.unwrap();

        assert_eq!(written, 13);
        assert_eq!(sink, b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn test_stream_to_missing_key_is_not_found() {
        let bucket = InMemoryBucket::new("documents");
        let mut sink: Vec<u8> = Vec::new();
        let err = bucket.stream_to("nope", &mut sink).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_confirm_exists_true_for_visible_object() {
        let bucket = InMemoryBucket::new("documents");
        bucket.insert("k", b"v", "text/plain");
        assert!(confirm_exists(&bucket, "k", Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_exists_gives_up_after_its_own_timeout() {
        let bucket = InMemoryBucket::new("documents");
        let started = tokio::time::Instant::now();

        assert!(!confirm_exists(&bucket, "missing", Duration::from_secs(2)).await);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

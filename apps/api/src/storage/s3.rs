use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, warn};

use super::{confirm_exists, BoxReader, FailedDelete, ObjectMetadata, ObjectStore, StorageError};

/// Cache policy for resume documents: never cached by intermediaries.
pub const PRIVATE_NO_STORE: &str = "private, no-store";
/// Preview images live under content-addressed prefixes, so they never change in place.
pub const PUBLIC_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// One bucket on an S3-compatible service.
#[derive(Clone)]
pub struct S3Bucket {
    client: Client,
    name: String,
    cache_control: Option<String>,
    confirm_timeout: Duration,
}

impl S3Bucket {
    pub fn new(client: Client, name: impl Into<String>, confirm_timeout: Duration) -> Self {
        Self {
            client,
            name: name.into(),
            cache_control: None,
            confirm_timeout,
        }
    }

    pub fn with_cache_control(mut self, value: &str) -> Self {
        self.cache_control = Some(value.to_string());
        self
    }
}

fn unavailable<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Unavailable(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ObjectStore for S3Bucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.name)
            .key(key)
            .content_type(content_type)
            .set_cache_control(self.cache_control.clone())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                if e.code() == Some("EntityTooLarge") {
                    StorageError::TooLarge(key.to_string())
                } else {
                    unavailable(e)
                }
            })?;

        debug!(bucket = %self.name, key, size, "put object");

        // Best-effort: a write the service acknowledged is treated as durable.
        if !confirm_exists(self, key, self.confirm_timeout).await {
            warn!(
                bucket = %self.name,
                key,
                timeout_ms = self.confirm_timeout.as_millis() as u64,
                "object not yet visible after put"
            );
        }
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        let out = self
            .client
            .head_object()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    unavailable(e)
                }
            })?;

        Ok(ObjectMetadata {
            content_type: out.content_type().map(str::to_string),
            content_length: out.content_length().unwrap_or(0).max(0) as u64,
            e_tag: out.e_tag().map(str::to_string),
        })
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        let out = self
            .client
            .get_object()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    unavailable(e)
                }
            })?;

        Ok(Box::new(Box::pin(out.body.into_async_read())))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.name)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(unavailable)?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        Ok(keys)
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(unavailable)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(unavailable)?;

        let out = self
            .client
            .delete_objects()
            .bucket(&self.name)
            .delete(delete)
            .send()
            .await
            .map_err(unavailable)?;

        // Quiet mode: only failures are reported back. Missing keys are not failures.
        let failed: Vec<FailedDelete> = out
            .errors()
            .iter()
            .map(|e| FailedDelete {
                key: e.key().unwrap_or_default().to_string(),
                reason: format!(
                    "{}: {}",
                    e.code().unwrap_or("Unknown"),
                    e.message().unwrap_or_default()
                ),
            })
            .collect();

        if failed.is_empty() {
            debug!(bucket = %self.name, count = keys.len(), "deleted objects");
            Ok(())
        } else {
            Err(StorageError::PartialDelete { failed })
        }
    }
}

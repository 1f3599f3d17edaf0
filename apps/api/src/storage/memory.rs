//! In-process bucket for tests. Records the calls the lifecycle makes so tests can
//! assert on batching and failure handling.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{BoxReader, FailedDelete, ObjectMetadata, ObjectStore, StorageError};

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, (Bytes, String)>,
    put_keys: Vec<String>,
    delete_batches: Vec<usize>,
    fail_puts: bool,
    unavailable: bool,
    fail_delete: HashSet<String>,
    overwrite_after_put: HashMap<String, Bytes>,
}

pub struct InMemoryBucket {
    name: String,
    inner: Mutex<Inner>,
}

impl InMemoryBucket {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn insert(&self, key: &str, body: &[u8], content_type: &str) {
        self.inner.lock().unwrap().objects.insert(
            key.to_string(),
            (Bytes::copy_from_slice(body), content_type.to_string()),
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().objects.contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<(Bytes, String)> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().objects.len()
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().put_keys.clone()
    }

    pub fn delete_batch_sizes(&self) -> Vec<usize> {
        self.inner.lock().unwrap().delete_batches.clone()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_puts = fail;
    }

    /// Every call fails as if the service were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.inner.lock().unwrap().fail_delete.insert(key.to_string());
    }

    pub fn clear_delete_failures(&self) {
        self.inner.lock().unwrap().fail_delete.clear();
    }

    /// The next put of `key` is immediately replaced by `body`, as if another
    /// writer landed right after it.
    pub fn overwrite_after_put(&self, key: &str, body: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .overwrite_after_put
            .insert(key.to_string(), Bytes::copy_from_slice(body));
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.inner.lock().unwrap().unavailable {
            return Err(StorageError::Unavailable(format!("{} is down", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_puts {
            return Err(StorageError::Unavailable(format!("put {key} rejected")));
        }
        inner.put_keys.push(key.to_string());
        let body = inner.overwrite_after_put.remove(key).unwrap_or(body);
        inner
            .objects
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        let (body, content_type) = inner
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMetadata {
            content_type: Some(content_type.clone()),
            content_length: body.len() as u64,
            e_tag: None,
        })
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        self.check_available()?;
        let body = self
            .inner
            .lock()
            .unwrap()
            .objects
            .get(key)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(body)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<(), StorageError> {
        assert!(keys.len() <= super::MAX_KEYS_PER_DELETE, "batch over backend limit");
        self.check_available()?;

        let mut inner = self.inner.lock().unwrap();
        inner.delete_batches.push(keys.len());

        let mut failed = Vec::new();
        for key in keys {
            if inner.fail_delete.contains(key) {
                failed.push(FailedDelete {
                    key: key.clone(),
                    reason: "AccessDenied: injected".to_string(),
                });
            } else {
                inner.objects.remove(key);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::PartialDelete { failed })
        }
    }
}

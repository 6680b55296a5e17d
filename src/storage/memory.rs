//! In-memory object store / 内存对象存储
//!
//! Follows ListObjectsV2 semantics closely enough to exercise pagination and
//! delimiter grouping: keys are kept sorted, common prefixes count as one
//! key each, and the continuation token is the last key or prefix returned.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;

use super::{BodyReader, KeyError, ListPage, ListRequest, ObjectHead, ObjectStore, ObjectSummary};
use crate::error::{FsError, Result};

/// S3 default MaxKeys
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    metadata: HashMap<String, String>,
    last_modified: String,
}

#[derive(Default)]
struct Inner {
    buckets: BTreeSet<String>,
    objects: BTreeMap<String, StoredObject>,
}

/// Single-bucket store kept in memory
pub struct MemoryStore {
    bucket: String,
    page_size: usize,
    inner: RwLock<Inner>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        let mut inner = Inner::default();
        inner.buckets.insert(bucket.to_string());
        Self {
            bucket: bucket.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            inner: RwLock::new(inner),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Cap every listing page at `page_size` keys
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every request touching `key` fail. A listing fails when its
    /// prefix equals `key`.
    pub fn fail_key(&self, key: &str) {
        self.failing.write().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// All physical keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().objects.keys().cloned().collect()
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.read().contains(key) {
            return Err(FsError::Store(format!("injected failure: {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_page(&self, request: ListRequest) -> Result<ListPage> {
        self.check(&request.prefix)?;

        let limit = request.max_keys.unwrap_or(self.page_size).min(self.page_size).max(1);
        let prefix = request.prefix.as_str();
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        let start = match &request.continuation_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        // a token that is a common prefix hides every key below it
        let mut current_prefix = match (&request.continuation_token, delimiter) {
            (Some(token), Some(d)) if token.starts_with(prefix) && token[prefix.len()..].contains(d) => {
                Some(token.clone())
            }
            _ => None,
        };

        let inner = self.inner.read();
        let mut page = ListPage::default();
        let mut last: Option<String> = None;
        let mut count = 0;

        for (key, obj) in inner.objects.range::<String, _>((start, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(cp) = &current_prefix {
                if key.starts_with(cp.as_str()) {
                    continue;
                }
            }

            let rest = &key[prefix.len()..];
            let grouped = delimiter
                .and_then(|d| rest.find(d).map(|pos| format!("{}{}", prefix, &rest[..pos + d.len()])));

            if count == limit {
                page.is_truncated = true;
                break;
            }
            count += 1;

            match grouped {
                Some(cp) => {
                    page.common_prefixes.push(cp.clone());
                    current_prefix = Some(cp.clone());
                    last = Some(cp);
                }
                None => {
                    page.objects.push(ObjectSummary {
                        key: key.clone(),
                        size: obj.data.len() as u64,
                        last_modified: Some(obj.last_modified.clone()),
                    });
                    last = Some(key.clone());
                }
            }
        }

        if page.is_truncated {
            page.next_continuation_token = last;
        }
        Ok(page)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.check(key)?;
        self.inner
            .read()
            .objects
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| FsError::NotFound(key.to_string()))
    }

    async fn put_object(&self, key: &str, body: BodyReader<'_>, content_type: &str) -> Result<()> {
        self.check(key)?;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        self.inner.write().objects.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(data),
                content_type: content_type.to_string(),
                metadata: HashMap::new(),
                last_modified: chrono::Utc::now().to_rfc3339(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.write().objects.remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<KeyError>> {
        let failing = self.failing.read();
        let mut inner = self.inner.write();
        let mut errors = Vec::new();
        for key in keys {
            if failing.contains(key) {
                errors.push(KeyError {
                    key: key.clone(),
                    message: "injected failure".to_string(),
                });
            } else {
                inner.objects.remove(key);
            }
        }
        Ok(errors)
    }

    async fn copy_object(
        &self,
        src_key: &str,
        dest_key: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        self.check(src_key)?;
        self.check(dest_key)?;

        let mut inner = self.inner.write();
        let mut obj = inner
            .objects
            .get(src_key)
            .cloned()
            .ok_or_else(|| FsError::NotFound(src_key.to_string()))?;

        if let Some(metadata) = metadata {
            obj.metadata = metadata.clone();
        }
        obj.last_modified = chrono::Utc::now().to_rfc3339();
        inner.objects.insert(dest_key.to_string(), obj);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead> {
        self.check(key)?;
        let inner = self.inner.read();
        let obj = inner
            .objects
            .get(key)
            .ok_or_else(|| FsError::NotFound(key.to_string()))?;

        Ok(ObjectHead {
            content_length: obj.data.len() as u64,
            content_type: Some(obj.content_type.clone()),
            metadata: obj.metadata.clone(),
            last_modified: Some(obj.last_modified.clone()),
            etag: None,
        })
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        self.inner.write().buckets.insert(name.to_string());
        Ok(())
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().buckets.contains(name))
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.buckets.contains(name) {
            return Err(FsError::NotFound(format!("bucket {}", name)));
        }
        if name == self.bucket && !inner.objects.is_empty() {
            return Err(FsError::Store(format!("bucket {} is not empty", name)));
        }
        inner.buckets.remove(name);
        Ok(())
    }
}

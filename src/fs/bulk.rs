//! Subtree operations / 批量操作
//!
//! A subtree is enumerated with a recursive listing, one page at a time.
//! Every page is finished before the next one is requested; inside a page
//! copies run concurrently up to `FsOptions::concurrency`. Failures are
//! collected from the finished tasks and checked against the failure policy
//! once the page is done.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::config::FailurePolicy;
use crate::error::{BulkOp, FsError, ObjectFailure, Result};
use crate::scope::{ensure_dir, parent_dir};
use crate::storage::ListRequest;

use super::S3Fs;

impl S3Fs {
    /// Delete a file, or a whole subtree when `path` ends in `/` / 删除
    pub async fn delete(&self, path: &str) -> Result<()> {
        if path.ends_with('/') {
            self.delete_bulk(path).await
        } else {
            self.delete_one(path).await
        }
    }

    /// Copy a file, or a whole subtree when `src` ends in `/` / 复制
    pub async fn copy(&self, src: &str, dest: &str, metadata: Option<&HashMap<String, String>>) -> Result<()> {
        if src.ends_with('/') {
            self.copy_bulk(src, dest, metadata).await
        } else {
            self.copy_one(src, dest, metadata).await
        }
    }

    /// Move a file, or a whole subtree when `src` ends in `/` / 移动
    pub async fn move_item(&self, src: &str, dest: &str) -> Result<()> {
        if src.ends_with('/') {
            self.move_bulk(src, dest).await
        } else {
            self.move_one(src, dest).await
        }
    }

    /// Delete every key under `path` / 批量删除
    pub async fn delete_bulk(&self, path: &str) -> Result<()> {
        let prefix = self.key(&ensure_dir(path));
        let mut failures = Vec::new();
        let mut token = None;

        loop {
            let request = ListRequest::recursive(prefix.as_str()).with_token(token);
            let page = match self.store.list_page(request).await {
                Ok(page) => page,
                Err(e) if failures.is_empty() => return Err(e),
                Err(e) => {
                    failures.push(ObjectFailure {
                        path: self.scope.to_virtual_path(&prefix),
                        error: e.to_string(),
                    });
                    break;
                }
            };

            let keys: Vec<String> = page.objects.iter().map(|o| o.key.clone()).collect();
            let before = failures.len();
            if !keys.is_empty() {
                tracing::debug!("bulk delete {}: {} keys", prefix, keys.len());
                match self.store.delete_objects(&keys).await {
                    Ok(errors) => failures.extend(errors.into_iter().map(|e| ObjectFailure {
                        path: self.scope.to_virtual_path(&e.key),
                        error: e.message,
                    })),
                    Err(e) => failures.extend(keys.iter().map(|key| ObjectFailure {
                        path: self.scope.to_virtual_path(key),
                        error: e.to_string(),
                    })),
                }
            }

            if failures.len() > before && self.options.failure_policy == FailurePolicy::FailFast {
                break;
            }
            token = page.next_token();
            if token.is_none() {
                break;
            }
        }

        bulk_result(BulkOp::Delete, failures)
    }

    /// Copy the subtree `src` into the directory `dest` / 批量复制
    ///
    /// The subtree keeps its own name: `/x/a/` copied to `/b/` lands at
    /// `/b/a/`. Directory markers are recreated, implicit directories are not.
    pub async fn copy_bulk(
        &self,
        src: &str,
        dest: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        let src_prefix = self.key(&ensure_dir(src));
        let dest_dir = ensure_dir(dest);
        if self.key(&dest_dir).starts_with(src_prefix.as_str()) {
            return Err(FsError::InvalidPath(format!("cannot copy {} into its own subtree {}", src, dest)));
        }

        let src_virtual = self.scope.to_virtual_path(&src_prefix);
        let base = parent_dir(&src_virtual);
        // every target would be its own source
        if self.key(&dest_dir) == self.key(base) {
            return Err(FsError::InvalidPath(format!("cannot copy {} onto itself in {}", src, dest)));
        }

        let mut failures = Vec::new();
        let mut token = None;
        loop {
            let request = ListRequest::recursive(src_prefix.as_str()).with_token(token);
            let page = match self.store.list_page(request).await {
                Ok(page) => page,
                Err(e) if failures.is_empty() => return Err(e),
                Err(e) => {
                    failures.push(ObjectFailure {
                        path: src_virtual.clone(),
                        error: e.to_string(),
                    });
                    break;
                }
            };

            tracing::debug!("bulk copy {} -> {}: {} keys", src_prefix, dest_dir, page.objects.len());
            let results: Vec<std::result::Result<(), ObjectFailure>> = stream::iter(
                page.objects
                    .iter()
                    .map(|obj| self.copy_entry(&obj.key, base, &dest_dir, metadata)),
            )
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

            let before = failures.len();
            failures.extend(results.into_iter().filter_map(|r| r.err()));

            if failures.len() > before && self.options.failure_policy == FailurePolicy::FailFast {
                break;
            }
            token = page.next_token();
            if token.is_none() {
                break;
            }
        }

        bulk_result(BulkOp::Copy, failures)
    }

    /// Copy a subtree, then delete the source if every copy succeeded / 批量移动
    pub async fn move_bulk(&self, src: &str, dest: &str) -> Result<()> {
        self.copy_bulk(src, dest, None).await?;
        self.delete_bulk(src).await
    }

    async fn copy_entry(
        &self,
        key: &str,
        base: &str,
        dest_dir: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> std::result::Result<(), ObjectFailure> {
        let path = self.scope.to_virtual_path(key);
        let rel = path.strip_prefix(base).unwrap_or(path.as_str());
        let target = format!("{}{}", dest_dir, rel);

        let result = if key.ends_with('/') {
            self.make_directory(&target).await
        } else {
            self.copy_one(&path, &target, metadata).await
        };
        result.map_err(|e| ObjectFailure {
            path,
            error: e.to_string(),
        })
    }
}

fn bulk_result(op: BulkOp, failures: Vec<ObjectFailure>) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        tracing::warn!("bulk {} failed for {}: {}", op, failure.path, failure.error);
    }
    Err(FsError::Bulk { op, failures })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::config::FsOptions;
    use crate::fs::tests::memory_fs;
    use crate::scope::Scope;
    use crate::storage::{BodyReader, KeyError, ListPage, MemoryStore, ObjectHead, ObjectStore};

    fn paged_fs(store: Arc<MemoryStore>, policy: FailurePolicy) -> S3Fs {
        S3Fs::with_store(store, Scope::root(), FsOptions::default().with_failure_policy(policy))
    }

    async fn seed(fs: &S3Fs, paths: &[&str]) {
        for path in paths {
            if path.ends_with('/') {
                fs.make_directory(path).await.unwrap();
            } else {
                fs.put_bytes(path, &b"data"[..], "").await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_copy_nested_subtree() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store.clone());
        seed(&fs, &["/x/a/", "/x/a/f1", "/x/a/sub/f2", "/b/"]).await;

        fs.copy("/x/a/", "/b", None).await.unwrap();
        assert_eq!(
            store.keys(),
            vec!["b/", "b/a/", "b/a/f1", "b/a/sub/f2", "x/a/", "x/a/f1", "x/a/sub/f2"]
        );
    }

    #[tokio::test]
    async fn test_copy_under_scope() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = S3Fs::with_store(store.clone(), Scope::new(Some("ns"), Some("a")), FsOptions::default());
        seed(&fs, &["/a/", "/a/file"]).await;

        fs.copy("/a/", "/b/", None).await.unwrap();
        assert!(store.keys().contains(&"ns/a/b/a/file".to_string()));
        assert!(store.keys().contains(&"ns/a/b/a/".to_string()));
    }

    #[tokio::test]
    async fn test_copy_with_metadata() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store);
        seed(&fs, &["/m/one", "/m/two"]).await;

        let mut metadata = HashMap::new();
        metadata.insert("owner".to_string(), "tester".to_string());
        fs.copy("/m/", "/n/", Some(&metadata)).await.unwrap();

        let info = fs.info("/n/m/two").await.unwrap().unwrap();
        assert_eq!(info.metadata, metadata);
    }

    #[tokio::test]
    async fn test_bulk_across_pages() {
        let store = Arc::new(MemoryStore::new("test").with_page_size(2));
        let fs = memory_fs(store.clone());
        seed(&fs, &["/src/", "/src/1", "/src/2", "/src/3", "/src/4", "/src/5"]).await;

        fs.copy("/src/", "/dst/", None).await.unwrap();
        assert_eq!(fs.list("/dst/src/").await.unwrap().len(), 5);

        fs.delete("/src/").await.unwrap();
        assert!(!fs.path_exists("/src/").await.unwrap());
        assert_eq!(store.keys().len(), 6);
    }

    #[tokio::test]
    async fn test_copy_into_own_subtree_rejected() {
        let fs = memory_fs(Arc::new(MemoryStore::new("test")));
        seed(&fs, &["/a/file"]).await;

        let err = fs.copy("/a/", "/a/b/", None).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
        let err = fs.copy("/", "/b/", None).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
        assert!(fs.copy("/a/", "/ab/", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_copy_fail_fast_stops_after_page() {
        let store = Arc::new(MemoryStore::new("test").with_page_size(2));
        let fs = paged_fs(store.clone(), FailurePolicy::FailFast);
        seed(&fs, &["/s/1", "/s/2", "/s/3", "/s/4", "/s/5", "/s/6"]).await;
        store.fail_key("s/1");

        let err = fs.copy("/s/", "/d/", None).await.unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].path, "/s/1");
        assert!(err.to_string().contains("some files failed"));

        // the rest of the failing page still ran
        assert!(fs.exact_path_exists("/d/s/2").await.unwrap());
        assert!(!fs.exact_path_exists("/d/s/3").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_best_effort_finishes() {
        let store = Arc::new(MemoryStore::new("test").with_page_size(2));
        let fs = paged_fs(store.clone(), FailurePolicy::BestEffort);
        seed(&fs, &["/s/1", "/s/2", "/s/3", "/s/4", "/s/5", "/s/6"]).await;
        store.fail_key("s/1");
        store.fail_key("s/5");

        let err = fs.copy("/s/", "/d/", None).await.unwrap_err();
        let mut paths: Vec<_> = err.failures().iter().map(|f| f.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/s/1", "/s/5"]);
        assert_eq!(fs.list("/d/s/").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_delete_fail_fast_and_best_effort() {
        let store = Arc::new(MemoryStore::new("test").with_page_size(2));
        let fs = paged_fs(store.clone(), FailurePolicy::FailFast);
        seed(&fs, &["/s/1", "/s/2", "/s/3", "/s/4"]).await;
        store.fail_key("s/1");

        let err = fs.delete("/s/").await.unwrap_err();
        assert!(matches!(err, FsError::Bulk { op: BulkOp::Delete, .. }));
        assert_eq!(store.keys(), vec!["s/1", "s/3", "s/4"]);

        let fs = paged_fs(store.clone(), FailurePolicy::BestEffort);
        let err = fs.delete("/s/").await.unwrap_err();
        assert_eq!(err.failures()[0].path, "/s/1");
        assert_eq!(store.keys(), vec!["s/1"]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_returned_directly() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store.clone());
        seed(&fs, &["/s/1"]).await;
        store.fail_key("s/");

        let err = fs.delete("/s/").await.unwrap_err();
        assert!(matches!(err, FsError::Store(_)));
        assert_eq!(store.keys(), vec!["s/1"]);
    }

    #[tokio::test]
    async fn test_move_keeps_source_on_copy_failure() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store.clone());
        seed(&fs, &["/m/", "/m/ok", "/m/bad"]).await;
        store.fail_key("m/bad");

        assert!(fs.move_item("/m/", "/n/").await.is_err());
        let keys = store.keys();
        assert!(keys.contains(&"m/ok".to_string()));
        assert!(keys.contains(&"m/bad".to_string()));

        store.clear_failures();
        fs.move_item("/m/", "/n/").await.unwrap();
        assert!(!fs.path_exists("/m/").await.unwrap());
        assert_eq!(fs.list("/n/m/").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_empty_subtree() {
        let fs = memory_fs(Arc::new(MemoryStore::new("test")));
        fs.delete("/nothing/").await.unwrap();
    }

    #[tokio::test]
    async fn test_move_onto_parent_rejected() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store.clone());
        seed(&fs, &["/x/a/", "/x/a/f", "/top/", "/top/f"]).await;

        let err = fs.move_item("/x/a/", "/x/").await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
        let err = fs.move_item("/x/a/", "x").await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
        let err = fs.copy("/top/", "/", None).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));

        assert_eq!(store.keys(), vec!["top/", "top/f", "x/a/", "x/a/f"]);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_copies() {
        let store = Arc::new(MemoryStore::new("test"));
        let options = FsOptions {
            concurrency: 0,
            ..Default::default()
        };
        let fs = S3Fs::with_store(store.clone(), Scope::root(), options);
        seed(&fs, &["/a/", "/a/f"]).await;

        tokio::time::timeout(Duration::from_secs(2), fs.copy("/a/", "/b/", None))
            .await
            .expect("bulk copy stalled")
            .unwrap();
        assert!(store.keys().contains(&"b/a/f".to_string()));
    }

    /// Records how many copies run at the same time
    struct CountingStore {
        inner: MemoryStore,
        current: AtomicUsize,
        max: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }
        async fn list_page(&self, request: ListRequest) -> Result<ListPage> {
            self.inner.list_page(request).await
        }
        async fn get_object(&self, key: &str) -> Result<Bytes> {
            self.inner.get_object(key).await
        }
        async fn put_object(&self, key: &str, body: BodyReader<'_>, content_type: &str) -> Result<()> {
            self.inner.put_object(key, body, content_type).await
        }
        async fn delete_object(&self, key: &str) -> Result<()> {
            self.inner.delete_object(key).await
        }
        async fn delete_objects(&self, keys: &[String]) -> Result<Vec<KeyError>> {
            self.inner.delete_objects(keys).await
        }
        async fn copy_object(
            &self,
            src_key: &str,
            dest_key: &str,
            metadata: Option<&HashMap<String, String>>,
        ) -> Result<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let result = self.inner.copy_object(src_key, dest_key, metadata).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            result
        }
        async fn head_object(&self, key: &str) -> Result<ObjectHead> {
            self.inner.head_object(key).await
        }
        async fn create_bucket(&self, name: &str) -> Result<()> {
            self.inner.create_bucket(name).await
        }
        async fn bucket_exists(&self, name: &str) -> Result<bool> {
            self.inner.bucket_exists(name).await
        }
        async fn delete_bucket(&self, name: &str) -> Result<()> {
            self.inner.delete_bucket(name).await
        }
    }

    #[tokio::test]
    async fn test_copy_fan_out_is_bounded() {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new("test"),
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
        });
        let fs = S3Fs::with_store(store.clone(), Scope::root(), FsOptions::default().with_concurrency(3));
        for i in 0..10 {
            fs.put_bytes(&format!("/src/{}", i), &b"x"[..], "").await.unwrap();
        }

        fs.copy("/src/", "/dst/", None).await.unwrap();
        assert_eq!(fs.list("/dst/src/").await.unwrap().len(), 10);

        let max = store.max.load(Ordering::SeqCst);
        assert!(max <= 3, "max in-flight copies was {}", max);
        assert!(max > 1, "copies never overlapped");
        assert_eq!(store.current.load(Ordering::SeqCst), 0);
    }
}

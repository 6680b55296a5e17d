use crate::error::Result;
use crate::storage::ListRequest;

use super::S3Fs;

impl S3Fs {
    /// True when any key starts with the mapped path / 路径前缀是否存在
    ///
    /// `/a` matches `/a`, `/a/...` and also `/ab`.
    pub async fn path_exists(&self, path: &str) -> Result<bool> {
        let request = ListRequest::delimited(self.key(path)).with_max_keys(1);
        let page = self.store.list_page(request).await?;
        Ok(page.key_count() > 0)
    }

    /// True only when an object with exactly this key exists / 对象是否精确存在
    pub async fn exact_path_exists(&self, path: &str) -> Result<bool> {
        let key = self.key(path);
        // the exact key sorts first among keys sharing it as a prefix
        let page = self.store.list_page(ListRequest::delimited(key.as_str())).await?;
        Ok(page.objects.iter().any(|o| o.key == key))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::fs::tests::memory_fs;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_prefix_and_exact_existence() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store);
        fs.put_bytes("/ab", &b"x"[..], "").await.unwrap();
        fs.put_bytes("/dir/file", &b"x"[..], "").await.unwrap();

        assert!(fs.path_exists("/a").await.unwrap());
        assert!(!fs.exact_path_exists("/a").await.unwrap());
        assert!(fs.path_exists("/dir").await.unwrap());
        assert!(fs.path_exists("/dir/").await.unwrap());
        assert!(!fs.exact_path_exists("/dir/").await.unwrap());
        assert!(fs.exact_path_exists("/dir/file").await.unwrap());
        assert!(!fs.path_exists("/zzz").await.unwrap());
    }

    #[tokio::test]
    async fn test_exact_key_on_small_pages() {
        let store = Arc::new(MemoryStore::new("test").with_page_size(1));
        let fs = memory_fs(store);
        fs.put_bytes("/k", &b"x"[..], "").await.unwrap();
        fs.put_bytes("/k/1", &b"x"[..], "").await.unwrap();
        fs.put_bytes("/k2", &b"x"[..], "").await.unwrap();

        assert!(fs.exact_path_exists("/k").await.unwrap());
        assert!(!fs.exact_path_exists("/k/").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let store = Arc::new(MemoryStore::new("test"));
        let fs = memory_fs(store.clone());
        store.fail_key("broken");

        assert!(fs.path_exists("/broken").await.is_err());
        assert!(fs.exact_path_exists("/broken").await.is_err());
    }
}

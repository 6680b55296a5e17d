use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::models::ObjectInfo;
use crate::scope::ensure_dir;

use super::S3Fs;

/// Content type stored for directory markers
const MARKER_CONTENT_TYPE: &str = "application/octet-stream";

fn resolve_content_type(path: &str, content_type: &str) -> String {
    if content_type.is_empty() {
        mime_guess::from_path(path).first_or_octet_stream().to_string()
    } else {
        content_type.to_string()
    }
}

impl S3Fs {
    /// Open an object for reading / 读取文件
    ///
    /// The whole body is fetched and buffered in memory before the reader is
    /// returned; use [`S3Fs::get_bytes`] to skip the reader wrapper.
    pub async fn get(&self, path: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        let data = self.get_bytes(path).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Bytes> {
        let key = self.key(path);
        tracing::debug!("get {}", key);
        self.store.get_object(&key).await
    }

    /// Write an object, replacing any existing one / 上传文件
    ///
    /// An empty `content_type` is guessed from the file extension.
    pub async fn put<R>(&self, path: &str, mut reader: R, content_type: &str) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = self.key(path);
        let content_type = resolve_content_type(path, content_type);
        tracing::debug!("put {} ({})", key, content_type);
        self.store.put_object(&key, &mut reader, &content_type).await
    }

    pub async fn put_bytes(&self, path: &str, data: impl Into<Bytes>, content_type: &str) -> Result<()> {
        let data: Bytes = data.into();
        self.put(path, &data[..], content_type).await
    }

    /// Create a directory marker / 创建目录
    pub async fn make_directory(&self, path: &str) -> Result<()> {
        let dir = ensure_dir(path);
        self.put(&dir, &b""[..], MARKER_CONTENT_TYPE).await
    }

    /// Delete one key; a missing key is fine / 删除单个对象
    pub async fn delete_one(&self, path: &str) -> Result<()> {
        let key = self.key(path);
        tracing::debug!("delete {}", key);
        self.store.delete_object(&key).await
    }

    /// Object metadata, `None` when the object does not exist / 获取文件信息
    pub async fn info(&self, path: &str) -> Result<Option<ObjectInfo>> {
        let key = self.key(path);
        let head = match self.store.head_object(&key).await {
            Ok(head) => head,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(ObjectInfo {
            path: self.scope.to_virtual_path(&key),
            size: head.content_length,
            content_type: head.content_type,
            metadata: head.metadata,
            last_modified: head.last_modified,
            etag: head.etag,
        }))
    }

    /// Server-side copy of a single object / 复制单个对象
    ///
    /// `Some(metadata)` replaces the user metadata on the copy.
    pub async fn copy_one(
        &self,
        src: &str,
        dest: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        let src_key = self.key(src);
        let dest_key = self.key(dest);
        tracing::debug!("copy {} -> {}", src_key, dest_key);
        self.store.copy_object(&src_key, &dest_key, metadata).await
    }

    /// Copy then delete; the source survives a failed copy / 移动单个对象
    ///
    /// Moving an object onto its own key does nothing.
    pub async fn move_one(&self, src: &str, dest: &str) -> Result<()> {
        if self.key(src) == self.key(dest) {
            return Ok(());
        }
        self.copy_one(src, dest, None).await?;
        self.delete_one(src).await
    }
}

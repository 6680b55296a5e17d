use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Upload body / 上传数据流
pub type BodyReader<'a> = &'a mut (dyn AsyncRead + Unpin + Send);

/// One ListObjectsV2 request / 列表请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    /// `Some("/")` groups keys into common prefixes, `None` lists recursively
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<usize>,
}

impl ListRequest {
    /// Delimited (one level) listing / 单层列表
    pub fn delimited(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some("/".to_string()),
            ..Default::default()
        }
    }

    /// Recursive listing of every key under the prefix / 递归列表
    pub fn recursive(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }
}

/// Object summary in a listing page / 列表中的对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

/// One page of a listing / 列表分页结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    /// Keys plus common prefixes returned in this page (S3 `KeyCount`)
    pub fn key_count(&self) -> usize {
        self.objects.len() + self.common_prefixes.len()
    }

    /// Token for the next page, `None` when this was the last one
    pub fn next_token(&self) -> Option<String> {
        if self.is_truncated {
            self.next_continuation_token.clone()
        } else {
            None
        }
    }
}

/// Per-key failure in a batch request / 批量请求中单个键的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyError {
    pub key: String,
    pub message: String,
}

/// Head response / Head结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// Object store interface (flat keys, one bucket) / 对象存储接口
///
/// Keys are physical keys; scoping happens above this trait. Implementations
/// must be safe for concurrent use from many tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name / 存储名称
    fn name(&self) -> &str;

    /// List one page / 列出一页
    async fn list_page(&self, request: ListRequest) -> Result<ListPage>;

    /// Read a whole object; `NotFound` when absent / 读取对象
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Write an object, overwriting any existing one / 写入对象
    async fn put_object(&self, key: &str, body: BodyReader<'_>, content_type: &str) -> Result<()>;

    /// Delete one key; a missing key is not an error / 删除对象
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Batch delete / 批量删除
    ///
    /// `Err` means the request as a whole failed; keys that could not be
    /// deleted individually come back in the `Ok` list.
    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<KeyError>>;

    /// Server-side copy. `Some(metadata)` replaces the destination metadata,
    /// `None` keeps the source's / 服务端复制
    async fn copy_object(
        &self,
        src_key: &str,
        dest_key: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()>;

    /// Object metadata; `NotFound` when absent / 获取对象元数据
    async fn head_object(&self, key: &str) -> Result<ObjectHead>;

    async fn create_bucket(&self, name: &str) -> Result<()>;

    async fn bucket_exists(&self, name: &str) -> Result<bool>;

    /// `NotFound` when the bucket does not exist
    async fn delete_bucket(&self, name: &str) -> Result<()>;
}

pub mod memory;

pub use memory::MemoryStore;

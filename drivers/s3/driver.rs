//! S3驱动核心实现
//!
//! 设计原则：
//! - 只提供扁平键上的原语（list_page, get, put, copy, delete, head）
//! - 分片上传，每片8MB，最多2片并发
//! - CopyObject 的源路径做URL编码，其它请求的键原样传递

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, FuturesUnordered, StreamExt};
use s3::bucket::Bucket;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::serde_types::Part;
use s3::Region;
use tokio::io::AsyncReadExt;
use tokio::task::JoinError;

use super::config::S3Config;
use crate::error::{FsError, Result};
use crate::storage::{BodyReader, KeyError, ListPage, ListRequest, ObjectHead, ObjectStore, ObjectSummary};

const CHUNK_SIZE: usize = 8 * 1024 * 1024; // 8MB per chunk (S3最小5MB)
const CONCURRENT_UPLOADS: usize = 2; // 2个并发上传
const BATCH_DELETE_CONCURRENCY: usize = 16;

/// S3对象存储
pub struct S3Store {
    config: S3Config,
    region: Region,
    credentials: Credentials,
    bucket: Box<Bucket>,
}

impl S3Store {
    /// 创建新的S3存储实例
    pub fn new(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(FsError::Config("bucket must not be empty".to_string()));
        }

        let credentials = Self::create_credentials(&config)?;
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.resolved_endpoint(),
        };

        let bucket = Self::open(&config, &config.bucket, region.clone(), credentials.clone())?;

        tracing::debug!(
            "S3 store ready: bucket={}, endpoint={}, path_style={}",
            config.bucket,
            config.resolved_endpoint(),
            config.force_path_style
        );
        Ok(Self {
            config,
            region,
            credentials,
            bucket,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// 创建S3凭证，未开启静态凭证时使用默认凭证链
    fn create_credentials(config: &S3Config) -> Result<Credentials> {
        let credentials = if config.use_static_credentials {
            Credentials::new(
                Some(&config.access_key_id),
                Some(&config.secret_access_key),
                if config.session_token.is_empty() { None } else { Some(&config.session_token) },
                None,
                None,
            )
        } else {
            Credentials::default()
        };
        credentials.map_err(|e| FsError::Config(format!("failed to create S3 credentials: {}", e)))
    }

    fn open(config: &S3Config, name: &str, region: Region, credentials: Credentials) -> Result<Box<Bucket>> {
        let bucket = Bucket::new(name, region, credentials)
            .map_err(|e| FsError::Config(format!("failed to create S3 bucket client: {}", e)))?;

        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };
        Ok(bucket)
    }

    /// 同一连接参数下打开任意存储桶
    fn open_bucket(&self, name: &str) -> Result<Box<Bucket>> {
        Self::open(&self.config, name, self.region.clone(), self.credentials.clone())
    }

    async fn upload_single(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        let resp = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| map_s3_error("put object", key, e))?;
        check_status(resp.status_code(), "put object", key)
    }

    /// 分片上传：首片已读入内存，其余分片边读边传
    async fn upload_multipart(
        &self,
        key: &str,
        first: Vec<u8>,
        body: BodyReader<'_>,
        content_type: &str,
    ) -> Result<()> {
        let init = self
            .bucket
            .initiate_multipart_upload(key, content_type)
            .await
            .map_err(|e| map_s3_error("initiate multipart upload", key, e))?;
        let upload_id = init.upload_id;

        tracing::debug!("S3分片上传开始: key={}, upload_id={}", key, upload_id);

        match self.upload_parts(key, &upload_id, first, body, content_type).await {
            Ok(mut parts) => {
                parts.sort_by_key(|p| p.part_number);
                let resp = self
                    .bucket
                    .complete_multipart_upload(key, &upload_id, parts)
                    .await
                    .map_err(|e| map_s3_error("complete multipart upload", key, e))?;
                check_status(resp.status_code(), "complete multipart upload", key)?;
                tracing::debug!("S3分片上传完成: key={}", key);
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self.bucket.abort_upload(key, &upload_id).await {
                    tracing::warn!("S3分片上传中止失败: key={}, error={}", key, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        body: BodyReader<'_>,
        content_type: &str,
    ) -> Result<Vec<Part>> {
        let bucket = Arc::new(self.bucket.clone());
        let mut pending = FuturesUnordered::new();
        let mut parts = Vec::new();
        let mut part_number: u32 = 1;
        let mut chunk = first;

        while !chunk.is_empty() {
            // 并发数已满，等待一个分片完成，内存最多保留 CONCURRENT_UPLOADS + 1 片
            while pending.len() >= CONCURRENT_UPLOADS {
                if let Some(joined) = pending.next().await {
                    parts.push(join_part(joined)?);
                }
            }

            let bucket = bucket.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            let content_type = content_type.to_string();
            let data = std::mem::take(&mut chunk);

            pending.push(tokio::spawn(async move {
                tracing::debug!("S3上传分片: key={}, part={}, size={}", key, part_number, data.len());
                bucket
                    .put_multipart_chunk(data, &key, part_number, &upload_id, &content_type)
                    .await
                    .map_err(|e| FsError::Store(format!("upload part {} of {} failed: {}", part_number, key, e)))
            }));

            part_number += 1;
            chunk = read_chunk(body).await?;
        }

        while let Some(joined) = pending.next().await {
            parts.push(join_part(joined)?);
        }
        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        "S3"
    }

    async fn list_page(&self, request: ListRequest) -> Result<ListPage> {
        let (result, code) = self
            .bucket
            .list_page(
                request.prefix.clone(),
                request.delimiter.clone(),
                request.continuation_token.clone(),
                None,
                request.max_keys,
            )
            .await
            .map_err(|e| FsError::Store(format!("list objects failed: prefix={}, error={}", request.prefix, e)))?;

        if !(200..300).contains(&code) {
            return Err(FsError::Store(format!(
                "list objects failed: prefix={}, status={}",
                request.prefix, code
            )));
        }

        Ok(ListPage {
            common_prefixes: result
                .common_prefixes
                .unwrap_or_default()
                .into_iter()
                .map(|cp| cp.prefix)
                .collect(),
            objects: result
                .contents
                .into_iter()
                .map(|obj| ObjectSummary {
                    key: obj.key,
                    size: obj.size as u64,
                    last_modified: Some(obj.last_modified),
                })
                .collect(),
            is_truncated: result.is_truncated,
            next_continuation_token: result.next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let resp = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| map_s3_error("get object", key, e))?;
        check_status(resp.status_code(), "get object", key)?;
        Ok(resp.bytes().clone())
    }

    async fn put_object(&self, key: &str, body: BodyReader<'_>, content_type: &str) -> Result<()> {
        let first = read_chunk(&mut *body).await?;
        if first.len() < CHUNK_SIZE {
            return self.upload_single(key, &first, content_type).await;
        }
        self.upload_multipart(key, first, body, content_type).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let resp = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| map_s3_error("delete object", key, e))?;
        match resp.status_code() {
            // 删除不存在的键不算错误
            404 => Ok(()),
            code => check_status(code, "delete object", key),
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<KeyError>> {
        // 逐个删除，限制并发；单个键失败不影响同批其它键
        let errors: Vec<KeyError> = stream::iter(keys.iter().cloned())
            .map(move |key| async move {
                self.delete_object(&key).await.err().map(|e| KeyError {
                    key,
                    message: e.to_string(),
                })
            })
            .buffer_unordered(BATCH_DELETE_CONCURRENCY)
            .filter_map(|res| async move { res })
            .collect()
            .await;
        Ok(errors)
    }

    async fn copy_object(
        &self,
        src_key: &str,
        dest_key: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        // copy_object_internal的from参数需要URL编码（中文、%、&等字符）
        let encoded_src = urlencoding::encode(src_key);

        tracing::debug!("S3 CopyObject: src_key={}, encoded={}, dst_key={}", src_key, encoded_src, dest_key);

        let code = match metadata {
            Some(metadata) => {
                let mut bucket = (*self.bucket).clone();
                bucket.add_header("x-amz-metadata-directive", "REPLACE");
                for (name, value) in metadata {
                    bucket.add_header(&format!("x-amz-meta-{}", name.to_lowercase()), value);
                }
                bucket.copy_object_internal(&*encoded_src, dest_key).await
            }
            None => self.bucket.copy_object_internal(&*encoded_src, dest_key).await,
        }
        .map_err(|e| map_s3_error("copy object", src_key, e))?;

        check_status(code, "copy object", src_key)
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead> {
        let (head, code) = self
            .bucket
            .head_object(key)
            .await
            .map_err(|e| map_s3_error("head object", key, e))?;
        check_status(code, "head object", key)?;

        Ok(ObjectHead {
            content_length: head.content_length.unwrap_or(0).max(0) as u64,
            content_type: head.content_type,
            metadata: head.metadata.unwrap_or_default(),
            last_modified: head.last_modified,
            etag: head.e_tag,
        })
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        let config = BucketConfiguration::default();
        let response = if self.config.force_path_style {
            Bucket::create_with_path_style(name, self.region.clone(), self.credentials.clone(), config).await
        } else {
            Bucket::create(name, self.region.clone(), self.credentials.clone(), config).await
        }
        .map_err(|e| FsError::Store(format!("create bucket {} failed: {}", name, e)))?;

        if !response.success() {
            return Err(FsError::Store(format!(
                "create bucket {} failed: status={}, body={}",
                name, response.response_code, response.response_text
            )));
        }
        tracing::debug!("S3 bucket created: {}", name);
        Ok(())
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        self.open_bucket(name)?
            .exists()
            .await
            .map_err(|e| FsError::Store(format!("head bucket {} failed: {}", name, e)))
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let code = self
            .open_bucket(name)?
            .delete()
            .await
            .map_err(|e| map_s3_error("delete bucket", name, e))?;
        check_status(code, "delete bucket", name)
    }
}

/// 读满一个分片或读到EOF
async fn read_chunk(body: BodyReader<'_>) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0;
    while filled < CHUNK_SIZE {
        let n = body.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

fn join_part(joined: std::result::Result<Result<Part>, JoinError>) -> Result<Part> {
    joined.map_err(|e| FsError::Store(format!("upload task failed: {}", e)))?
}

fn check_status(code: u16, op: &str, key: &str) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        404 => Err(FsError::NotFound(key.to_string())),
        _ => Err(FsError::Store(format!("{} failed: key={}, status={}", op, key, code))),
    }
}

fn map_s3_error(op: &str, key: &str, e: S3Error) -> FsError {
    match e {
        S3Error::HttpFailWithBody(404, _) => FsError::NotFound(key.to_string()),
        other => FsError::Store(format!("{} failed: key={}, error={}", op, key, other)),
    }
}

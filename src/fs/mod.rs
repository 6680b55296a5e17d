//! Scoped filesystem handle / 作用域文件系统
//!
//! `S3Fs` projects a hierarchical virtual namespace onto the flat keys of one
//! bucket. Every handle owns a [`Scope`]; every key it touches is built by
//! that scope, so two handles with different scopes never see each other's
//! objects even when they share the same store client.
//!
//! A trailing `/` on a source path selects the subtree variant of delete,
//! copy and move. Nothing checks the store to decide this.

mod bulk;
mod exists;
mod list;
mod object;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{FsConfig, FsOptions};
use crate::drivers::s3::S3Store;
use crate::error::{FsError, Result};
use crate::scope::Scope;
use crate::storage::ObjectStore;

const BUCKET_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Filesystem view over one bucket and scope / 文件系统句柄
#[derive(Clone)]
pub struct S3Fs {
    store: Arc<dyn ObjectStore>,
    scope: Scope,
    options: FsOptions,
}

impl S3Fs {
    /// Build an S3-backed handle from config / 根据配置连接S3
    pub fn connect(config: &FsConfig) -> Result<Self> {
        config.validate()?;
        let store = S3Store::new(config.s3.clone())?;
        tracing::info!(
            "S3 filesystem ready: bucket={}, scope={:?}",
            config.s3.bucket,
            config.scope().prefix()
        );
        Ok(Self::with_store(Arc::new(store), config.scope(), config.options()))
    }

    pub fn with_store(store: Arc<dyn ObjectStore>, scope: Scope, options: FsOptions) -> Self {
        Self { store, scope, options }
    }

    /// Another tenant on the same client / 共享客户端的另一个作用域
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            store: self.store.clone(),
            scope,
            options: self.options,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    fn key(&self, path: &str) -> String {
        self.scope.to_physical_key(path)
    }

    /// Create a bucket and wait until it is visible / 创建存储桶并等待可用
    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        self.store.create_bucket(name).await?;

        let deadline = tokio::time::Instant::now() + self.options.bucket_wait_timeout;
        loop {
            if self.store.bucket_exists(name).await? {
                tracing::info!("Bucket ready: {}", name);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FsError::Timeout(format!("bucket {} did not appear", name)));
            }
            tokio::time::sleep(BUCKET_POLL_INTERVAL).await;
        }
    }

    /// Delete a bucket; it must be empty / 删除存储桶
    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.store.delete_bucket(name).await?;
        tracing::info!("Bucket deleted: {}", name);
        Ok(())
    }
}

//! Filesystem configuration / 文件系统配置
//!
//! Connection parameters come from the S3 driver config and are flattened
//! into the same JSON object as the scope and bulk-operation settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::drivers::s3::S3Config;
use crate::error::{FsError, Result};
use crate::scope::Scope;

/// What a bulk operation does after a constituent operation fails / 批量操作失败策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop after the page that contained the failure
    #[default]
    FailFast,
    /// Process every page, then report all failures together
    BestEffort,
}

/// Complete configuration / 完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    #[serde(flatten)]
    pub s3: S3Config,
    /// Namespace segment / 命名空间
    #[serde(default, alias = "name_space")]
    pub namespace: String,
    /// Domain segment / 域
    #[serde(default)]
    pub domain: String,
    /// Max in-flight requests per bulk page / 批量操作并发数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// create_bucket waits this long for the bucket to appear / 等待存储桶创建的超时
    #[serde(default = "default_bucket_wait")]
    pub bucket_wait_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    16
}

fn default_bucket_wait() -> u64 {
    300
}

/// Runtime options of one filesystem handle / 运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsOptions {
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub bucket_wait_timeout: Duration,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
            bucket_wait_timeout: Duration::from_secs(default_bucket_wait()),
        }
    }
}

impl FsOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_bucket_wait_timeout(mut self, timeout: Duration) -> Self {
        self.bucket_wait_timeout = timeout;
        self
    }
}

impl FsConfig {
    pub fn new(bucket: &str) -> Self {
        Self {
            s3: S3Config::new(bucket),
            namespace: String::new(),
            domain: String::new(),
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
            bucket_wait_timeout_secs: default_bucket_wait(),
        }
    }

    /// Parse from a JSON object / 从JSON解析配置
    pub fn from_value(value: Value) -> Result<Self> {
        let config: FsConfig =
            serde_json::from_value(value).map_err(|e| FsError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.s3.bucket.is_empty() {
            return Err(FsError::Config("bucket must not be empty".to_string()));
        }
        if self.s3.use_static_credentials
            && (self.s3.access_key_id.is_empty() || self.s3.secret_access_key.is_empty())
        {
            return Err(FsError::Config(
                "static credentials enabled but access key or secret is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scope(&self) -> Scope {
        Scope::new(Some(&self.namespace), Some(&self.domain))
    }

    pub fn options(&self) -> FsOptions {
        FsOptions {
            concurrency: self.concurrency.max(1),
            failure_policy: self.failure_policy,
            bucket_wait_timeout: Duration::from_secs(self.bucket_wait_timeout_secs),
        }
    }
}

//! S3驱动配置

use serde::{Deserialize, Serialize};

/// S3连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// 存储桶名称
    pub bucket: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// S3端点地址，留空则使用AWS区域端点
    /// AWS: https://s3.{region}.amazonaws.com
    /// MinIO: http://localhost:9000
    #[serde(default)]
    pub endpoint: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// MinIO等需要设置为true
    #[serde(default, alias = "enable_minio_compat")]
    pub force_path_style: bool,
    /// 使用下面的静态凭证；关闭时走默认凭证链（环境变量、profile、实例元数据）
    #[serde(default, alias = "enable_iam_auth")]
    pub use_static_credentials: bool,
    /// Access Key ID
    #[serde(default)]
    pub access_key_id: String,
    /// Secret Access Key
    #[serde(default)]
    pub secret_access_key: String,
    /// Session Token（用于临时凭证）
    #[serde(default)]
    pub session_token: String,
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

impl S3Config {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            region: default_region(),
            endpoint: String::new(),
            force_path_style: false,
            use_static_credentials: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
        }
    }

    /// 实际使用的端点
    pub fn resolved_endpoint(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://s3.{}.amazonaws.com", self.region)
        } else {
            self.endpoint.trim_end_matches('/').to_string()
        }
    }
}

//! Error types / 错误类型

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Which bulk operation produced a [`FsError::Bulk`] / 批量操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOp {
    Copy,
    Delete,
}

impl fmt::Display for BulkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkOp::Copy => f.write_str("copy"),
            BulkOp::Delete => f.write_str("delete"),
        }
    }
}

/// One object that failed inside a bulk operation / 批量操作中失败的单个对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFailure {
    /// Virtual path of the source object
    pub path: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("object store error: {0}")]
    Store(String),

    /// Aggregate failure of a bulk copy or delete. The Display form stays
    /// coarse; `failures` lists every object that went wrong.
    #[error("some files failed: bulk {op} had {} failure(s)", failures.len())]
    Bulk {
        op: BulkOp,
        failures: Vec<ObjectFailure>,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    /// Per-object failures of a bulk error, empty for every other variant
    pub fn failures(&self) -> &[ObjectFailure] {
        match self {
            FsError::Bulk { failures, .. } => failures,
            _ => &[],
        }
    }
}

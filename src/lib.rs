pub mod config;
pub mod error;
pub mod fs;
pub mod models;
pub mod scope;
pub mod storage;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use config::{FailurePolicy, FsConfig, FsOptions};
pub use drivers::s3::{S3Config, S3Store};
pub use error::{BulkOp, FsError, ObjectFailure, Result};
pub use fs::S3Fs;
pub use models::{Entry, EntryKind, ObjectInfo};
pub use scope::Scope;
pub use storage::{MemoryStore, ObjectStore};

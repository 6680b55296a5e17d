use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Entry kind / 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// File entry information / 文件条目信息
///
/// `path` is virtual and relative to the handle's scope; it never contains
/// the namespace/domain prefix. Directory paths end in `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    /// Bytes, 0 for directories
    #[serde(default)]
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Object metadata from a head request / 对象元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub content_type: Option<String>,
    /// User metadata (`x-amz-meta-*` without the prefix)
    pub metadata: HashMap<String, String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialize() {
        let entry = Entry {
            name: "b".to_string(),
            path: "/a/b/".to_string(),
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "b", "path": "/a/b/", "kind": "directory", "size": 0 })
        );
        assert!(entry.is_dir());
    }
}

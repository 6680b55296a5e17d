use crate::error::Result;
use crate::models::{Entry, EntryKind};
use crate::scope::entry_name;
use crate::storage::ListRequest;

use super::S3Fs;

impl S3Fs {
    /// List one directory level / 列出目录
    ///
    /// Keys sharing `path` as a prefix are grouped at the next `/`. A path
    /// without a trailing `/` therefore lists whatever begins with it, which
    /// for a directory name is the directory itself.
    pub async fn list(&self, path: &str) -> Result<Vec<Entry>> {
        let prefix = self.key(path);
        let scope_prefix = self.scope.prefix();
        let skip = |key: &str| key == prefix || key == scope_prefix;

        let mut entries = Vec::new();
        let mut token = None;
        loop {
            let request = ListRequest::delimited(prefix.as_str()).with_token(token);
            let page = self.store.list_page(request).await?;

            for cp in page.common_prefixes.iter().filter(|cp| !skip(cp.as_str())) {
                entries.push(Entry {
                    name: entry_name(cp).to_string(),
                    path: self.scope.to_virtual_path(cp),
                    kind: EntryKind::Directory,
                    size: 0,
                    modified: None,
                });
            }

            for obj in page.objects.iter().filter(|o| !skip(o.key.as_str())) {
                entries.push(Entry {
                    name: entry_name(&obj.key).to_string(),
                    path: self.scope.to_virtual_path(&obj.key),
                    kind: EntryKind::File,
                    size: obj.size,
                    modified: obj.last_modified.clone(),
                });
            }

            token = page.next_token();
            if token.is_none() {
                break;
            }
        }

        tracing::debug!("list {} -> {} entries", prefix, entries.len());
        Ok(entries)
    }
}

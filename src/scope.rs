//! Key mapping between virtual paths and physical object keys / 虚拟路径与对象键映射
//!
//! A scope is the `namespace/domain/` prefix that every key of one handle
//! lives under. Virtual paths are passed through untouched apart from a
//! single leading `/`: no `..` folding, no slash collapsing, no percent
//! decoding. S3 keys treat all of those as literal bytes, so nothing a
//! caller passes can address a key outside the prefix.

/// Tenant scope (namespace, domain) / 租户作用域
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    namespace: Option<String>,
    domain: Option<String>,
    prefix: String,
}

impl Scope {
    pub fn new(namespace: Option<&str>, domain: Option<&str>) -> Self {
        let namespace = clean_segment(namespace);
        let domain = clean_segment(domain);

        let mut prefix = String::new();
        if let Some(ns) = &namespace {
            prefix.push_str(ns);
            prefix.push('/');
        }
        if let Some(d) = &domain {
            prefix.push_str(d);
            prefix.push('/');
        }

        Self { namespace, domain, prefix }
    }

    /// Unscoped: keys map 1:1 onto the bucket root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Physical prefix shared by every key of this scope, `""` or ending in `/`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn to_physical_key(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut key = String::with_capacity(self.prefix.len() + path.len());
        key.push_str(&self.prefix);
        key.push_str(path);
        key
    }

    /// Inverse of [`Scope::to_physical_key`]. A key outside the scope is
    /// returned as-is with `/` prepended.
    pub fn to_virtual_path(&self, key: &str) -> String {
        let rel = key.strip_prefix(self.prefix.as_str()).unwrap_or(key);
        format!("/{}", rel)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        key.starts_with(self.prefix.as_str())
    }
}

fn clean_segment(segment: Option<&str>) -> Option<String> {
    segment
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Last segment of a `/`-separated key. Directory keys end in `/`, so their
/// name is the second-to-last segment.
pub(crate) fn entry_name(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent directory of a virtual path, always ending in `/`.
/// `/x/a/` and `/x/a` give `/x/`, `/a/` and `/` give `/`.
pub(crate) fn parent_dir(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[..=pos],
        None => "/",
    }
}

pub(crate) fn ensure_dir(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

//! Mapping between media-relative paths and bucket keys.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Resized-image variant segment generated by the storefront.
static VARIANT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"product/cache/[0-9a-f]{32}/").expect("variant marker regex"));

static DUPLICATE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//+").expect("separator regex"));

/// Collapse repeated separators and drop leading ones.
pub fn normalize(path: &str) -> String {
    DUPLICATE_SEPARATORS
        .replace_all(path, "/")
        .trim_start_matches('/')
        .to_string()
}

/// Whether the path addresses a resized-image variant.
pub fn has_variant_marker(path: &str) -> bool {
    VARIANT_MARKER.is_match(path)
}

/// Remove resized-image variant segments so the path names the original asset.
pub fn strip_variant_marker(path: &str) -> Cow<'_, str> {
    VARIANT_MARKER.replace_all(path, "")
}

/// Whether the final path segment carries a file extension.
pub fn has_extension(path: &str) -> bool {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|name| name.contains('.'))
}

/// Prefix-aware key resolver shared by every remote operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyResolver {
    prefix: Option<String>,
}

impl KeyResolver {
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| normalize(p).trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Bucket key for a media-relative path.
    pub fn to_remote_key(&self, local_path: &str) -> String {
        self.apply_prefix(&strip_variant_marker(local_path))
    }

    /// Prepend the prefix to an already de-marked path, never twice.
    pub fn apply_prefix(&self, path: &str) -> String {
        let path = normalize(path);
        let Some(prefix) = self.prefix.as_deref() else {
            return path;
        };

        let rest = self.strip_prefix(&path);
        if rest.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", prefix, rest)
        }
    }

    /// Remove the prefix from a bucket key, leaving the media-relative path.
    pub fn strip_prefix(&self, key: &str) -> String {
        let mut rest = normalize(key);
        if let Some(prefix) = self.prefix.as_deref() {
            while rest == prefix || rest.starts_with(&format!("{}/", prefix)) {
                rest = rest[prefix.len()..].trim_start_matches('/').to_string();
            }
        }
        rest
    }

    /// Canonical `/prefix/path` form used for display and addressing.
    pub fn to_local_object_path(&self, local_path: &str) -> String {
        let mut parts = vec![""];
        if let Some(prefix) = self.prefix.as_deref() {
            parts.push(prefix.trim_matches('/'));
        }
        parts.push(local_path.trim_matches('/'));
        normalize_display(&parts.join("/"))
    }
}

fn normalize_display(path: &str) -> String {
    DUPLICATE_SEPARATORS.replace_all(path, "/").to_string()
}

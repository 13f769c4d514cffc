//! Slash-delimited object keys

use std::fmt;
use std::path::{Component, Path};

/// A normalized object key: forward slashes only, no leading slash, no
/// empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteKey(String);

impl RemoteKey {
    /// Normalize `raw`, collapsing duplicate and leading slashes and
    /// converting backslashes.
    pub fn new(raw: &str) -> Self {
        let joined = raw
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// `<root>/<partition>/<relative>`
    pub fn from_parts(root: &str, partition: &str, relative: &str) -> Self {
        Self::new(root).join(partition).join(relative)
    }

    /// Key for a local file relative to `base`. Returns `None` if `path` is
    /// not under `base` or is not valid UTF-8.
    pub fn relative_to(base: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(base).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(Self::new(&segments.join("/")))
    }

    /// Append one or more segments
    pub fn join(&self, segment: &str) -> Self {
        Self::new(&format!("{}/{}", self.0, segment))
    }

    /// The key as a listing prefix, with a single trailing slash
    pub fn as_prefix(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("{}/", self.0)
        }
    }

    /// Last segment of the key
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RemoteKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Folder holding the parts of a chunked upload of `key`
pub fn split_parts_folder(key: &RemoteKey) -> RemoteKey {
    RemoteKey::new(&format!("{}-split_parts", key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalizes_slashes() {
        assert_eq!(RemoteKey::new("//backup///2024-01-01/").as_str(), "backup/2024-01-01");
        assert_eq!(RemoteKey::new("a\\b\\c").as_str(), "a/b/c");
        assert!(RemoteKey::new("///").is_empty());
    }

    #[test]
    fn test_from_parts() {
        let key = RemoteKey::from_parts("/backup/", "2024-01-05", "/app-db.tar.gz.cpt");
        assert_eq!(key.as_str(), "backup/2024-01-05/app-db.tar.gz.cpt");
        assert_eq!(key.file_name(), "app-db.tar.gz.cpt");
    }

    #[test]
    fn test_prefix_has_single_trailing_slash() {
        assert_eq!(RemoteKey::new("backup/2024-01-05/").as_prefix(), "backup/2024-01-05/");
        assert_eq!(RemoteKey::new("").as_prefix(), "");
    }

    #[test]
    fn test_relative_to() {
        let base = PathBuf::from("/data/out");
        let key = RemoteKey::relative_to(&base, &base.join("nested/file.bin")).unwrap();
        assert_eq!(key.as_str(), "nested/file.bin");
        assert!(RemoteKey::relative_to(&base, Path::new("/elsewhere/file")).is_none());
    }

    #[test]
    fn test_split_parts_folder() {
        let key = RemoteKey::new("backup/d/vol.tar.gz.cpt");
        assert_eq!(
            split_parts_folder(&key).as_str(),
            "backup/d/vol.tar.gz.cpt-split_parts"
        );
    }
}

//! Views of the current on-disk state.

use rampart_core::ContentHash;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Source of current file checksums.
///
/// Implementations resolve relative paths themselves; the detector passes
/// operation targets through unchanged.
pub trait DiskState: Send + Sync {
    /// Checksum of `path`, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an IO error for failures other than a missing file.
    fn checksum(&self, path: &Path) -> std::io::Result<Option<ContentHash>>;
}

/// Normalize a resource path so `./a/b.txt` and `a/b.txt` compare equal.
#[must_use]
pub fn normalize_resource(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// The real filesystem, with relative targets resolved against a root.
#[derive(Debug, Clone)]
pub struct FsDiskState {
    root: PathBuf,
}

impl FsDiskState {
    /// Resolve relative targets against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `path`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(normalize_resource(path))
        }
    }
}

impl DiskState for FsDiskState {
    fn checksum(&self, path: &Path) -> std::io::Result<Option<ContentHash>> {
        ContentHash::of_file(&self.resolve(path))
    }
}

/// An in-memory disk, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiskState {
    files: HashMap<PathBuf, ContentHash>,
}

impl MemoryDiskState {
    /// Empty disk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with the given content.
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>, content: &[u8]) -> Self {
        self.insert(path, content);
        self
    }

    /// Write a file.
    pub fn insert(&mut self, path: impl AsRef<Path>, content: &[u8]) {
        self.files
            .insert(normalize_resource(path.as_ref()), ContentHash::hash(content));
    }

    /// Delete a file.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        self.files.remove(&normalize_resource(path.as_ref()));
    }
}

impl DiskState for MemoryDiskState {
    fn checksum(&self, path: &Path) -> std::io::Result<Option<ContentHash>> {
        Ok(self.files.get(&normalize_resource(path)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_cur_dir() {
        assert_eq!(
            normalize_resource(Path::new("./src/./main.rs")),
            PathBuf::from("src/main.rs")
        );
    }

    #[test]
    fn test_memory_disk() {
        let mut disk = MemoryDiskState::new().with_file("./a.txt", b"x");
        assert_eq!(
            disk.checksum(Path::new("a.txt")).unwrap(),
            Some(ContentHash::hash(b"x"))
        );
        disk.remove("a.txt");
        assert!(disk.checksum(Path::new("a.txt")).unwrap().is_none());
    }

    #[test]
    fn test_fs_disk_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), b"a: 1\n").unwrap();
        let disk = FsDiskState::new(dir.path());
        assert_eq!(
            disk.checksum(Path::new("./config.yaml")).unwrap(),
            Some(ContentHash::hash(b"a: 1\n"))
        );
        assert!(disk.checksum(Path::new("missing.yaml")).unwrap().is_none());
        assert_eq!(disk.root(), dir.path());
    }
}

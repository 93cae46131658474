//! Source-tree enumeration for directory frames
//!
//! A tree is walked exactly once into a snapshot; the snapshot supplies the
//! header totals and is then streamed verbatim, so files appearing or
//! vanishing mid-transfer cannot skew the declared entry count.

use crate::error::{Result, TransferError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One regular file inside a tree, addressed by its forward-slash relative
/// path from the tree base.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
}

/// Snapshot of a source tree taken before streaming starts.
#[derive(Debug)]
pub struct TreeSnapshot {
    pub entries: Vec<TreeEntry>,
    pub total_size: u64,
}

impl TreeSnapshot {
    pub fn total_files(&self) -> u64 {
        self.entries.len() as u64
    }
}

/// Walk `root` depth-first and collect every regular file. Symlinks,
/// sockets, and other non-regular entries are skipped silently; empty
/// directories contribute nothing.
pub fn snapshot_tree(root: &Path) -> Result<TreeSnapshot> {
    let mut entries = Vec::new();
    let mut total_size = 0u64;

    for item in WalkDir::new(root).follow_links(false) {
        let item = item.map_err(|e| TransferError::File(e.into()))?;
        if !item.file_type().is_file() {
            continue;
        }
        let meta = item.metadata().map_err(|e| TransferError::File(e.into()))?;
        let rel = item
            .path()
            .strip_prefix(root)
            .expect("walkdir yields paths under its root");
        let rel_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        total_size += meta.len();
        entries.push(TreeEntry {
            rel_path,
            abs_path: item.path().to_path_buf(),
            size: meta.len(),
        });
    }

    Ok(TreeSnapshot {
        entries,
        total_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn snapshot_counts_regular_files_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("x"), b"ab").unwrap();
        fs::create_dir_all(tmp.path().join("d/e")).unwrap();
        fs::write(tmp.path().join("d/y"), b"").unwrap();
        fs::write(tmp.path().join("d/e/z"), b"abc").unwrap();

        let snap = snapshot_tree(tmp.path()).unwrap();
        assert_eq!(snap.total_files(), 3);
        assert_eq!(snap.total_size, 5);

        let mut rels: Vec<_> = snap.entries.iter().map(|e| e.rel_path.clone()).collect();
        rels.sort();
        assert_eq!(rels, ["d/e/z", "d/y", "x"]);
    }

    #[test]
    fn snapshot_skips_empty_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("hollow/inner")).unwrap();
        fs::write(tmp.path().join("only"), b"1").unwrap();

        let snap = snapshot_tree(tmp.path()).unwrap();
        assert_eq!(snap.total_files(), 1);
        assert_eq!(snap.entries[0].rel_path, "only");
    }

    #[cfg(unix)]
    #[test]
    fn snapshot_skips_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("real"), b"data").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();

        let snap = snapshot_tree(tmp.path()).unwrap();
        assert_eq!(snap.total_files(), 1);
        assert_eq!(snap.entries[0].rel_path, "real");
    }
}

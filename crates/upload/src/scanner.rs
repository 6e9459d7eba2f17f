//! Local folder scanning for tree uploads.
//!
//! Recursively walks a directory and produces one [`TreeEntry`] per regular
//! file, with relative paths normalized to forward slashes.

use std::path::Path;

use crate::error::UploadError;
use crate::types::TreeEntry;

/// Scans `root` recursively.
///
/// Relative paths use `/` as separator (even on Windows) and do not include
/// `root` itself. Entries are sorted by relative path, so parents come
/// before their children and batches are reproducible. Returns the entries
/// and their total size in bytes. Symlinks are skipped.
pub fn scan_tree(root: &Path) -> Result<(Vec<TreeEntry>, u64), UploadError> {
    let mut entries = Vec::new();
    let mut total_size = 0;

    walk_dir(root, root, &mut entries, &mut total_size)?;
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok((entries, total_size))
}

fn walk_dir(
    root: &Path,
    current: &Path,
    entries: &mut Vec<TreeEntry>,
    total_size: &mut u64,
) -> Result<(), UploadError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, entries, total_size)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");

            *total_size += metadata.len();
            entries.push(TreeEntry::from_disk(rel_str, path));
        }
    }

    Ok(())
}

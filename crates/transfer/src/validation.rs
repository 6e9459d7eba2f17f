use crate::TransferError;

/// A validated `dir/dir/file` path from a folder upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePath {
    /// Directory segments, outermost first. Empty for top-level files.
    pub dirs: Vec<String>,
    pub file_name: String,
}

impl RelativePath {
    /// Directory prefix joined with `/` (empty for top-level files).
    pub fn dir_prefix(&self) -> String {
        self.dirs.join("/")
    }
}

/// Splits a relative upload path into directory segments and a file name.
///
/// Backslashes are treated as separators and empty or `.` segments are
/// dropped. Rejects:
/// - empty paths and paths without a file name
/// - absolute paths (leading `/` or a drive prefix such as `C:`)
/// - parent directory traversal (`..`)
pub fn split_relative_path(file_path: &str) -> Result<RelativePath, TransferError> {
    let normalized = file_path.trim().replace('\\', "/");
    if normalized.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }
    if normalized.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    let mut segments = Vec::new();
    for (i, segment) in normalized.split('/').enumerate() {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {file_path}"
                )));
            }
            s if i == 0 && is_drive_prefix(s) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {file_path}"
                )));
            }
            s => segments.push(s.to_string()),
        }
    }

    let Some(file_name) = segments.pop() else {
        return Err(TransferError::InvalidPath(format!(
            "no file name in path: {file_path}"
        )));
    };
    if normalized.ends_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "path names a directory: {file_path}"
        )));
    }

    Ok(RelativePath {
        dirs: segments,
        file_name,
    })
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

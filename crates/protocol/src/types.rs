use serde::{Deserialize, Serialize};

use crate::constants::ROOT_FOLDER_ID;

/// A file or folder stored on the server.
///
/// Ids are always server-assigned. Decoding goes through [`FileRecordWire`]
/// so the server's alternate spellings collapse into one shape:
/// - a missing `parent_id` means the root folder,
/// - the digest may arrive as `hash` or nested as `object.Hash`,
/// - zero-valued fields may be omitted entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FileRecordWire")]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
    pub parent_id: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    pub is_dir: bool,
}

/// Raw server representation of a [`FileRecord`].
#[derive(Debug, Clone, Default, Deserialize)]
struct FileRecordWire {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parent_id: Option<u64>,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    object: Option<StoredObjectWire>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoredObjectWire {
    #[serde(default, alias = "Hash")]
    hash: String,
}

impl From<FileRecordWire> for FileRecord {
    fn from(w: FileRecordWire) -> Self {
        let hash = w
            .hash
            .filter(|h| !h.is_empty())
            .or_else(|| w.object.map(|o| o.hash))
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self {
            id: w.id,
            name: w.name,
            parent_id: w.parent_id.unwrap_or(ROOT_FOLDER_ID),
            size: w.size.max(0) as u64,
            hash,
            is_dir: w.is_dir,
        }
    }
}

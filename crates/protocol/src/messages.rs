use serde::{Deserialize, Serialize};

use crate::constants::{LIST_ORDER_BY, LIST_PAGE_SIZE};
use crate::types::FileRecord;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks the server to materialize a file from content it already stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadByHashRequest {
    /// Always `0`: the server assigns ids.
    pub file_id: u64,
    pub file_name: String,
    pub size: u64,
    pub hash: String,
    pub parent_id: u64,
    pub is_dir: bool,
}

/// Opens (or resumes) a chunked upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipartInitRequest {
    pub user_id: u64,
    pub file_id: u64,
    pub file_name: String,
    pub size: u64,
    pub hash: String,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub parent_id: u64,
}

/// Asks the server to assemble the uploaded chunks into a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipartCompleteRequest {
    pub file_id: u64,
    pub file_hash: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub parent_id: u64,
    pub is_dir: bool,
}

/// Lists the direct children of a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileListRequest {
    pub parent_id: u64,
    pub page: u32,
    pub page_size: u32,
    pub order_by: String,
    pub order_desc: bool,
}

impl FileListRequest {
    /// Request that fetches a whole directory in one page, oldest first.
    pub fn whole_directory(parent_id: u64) -> Self {
        Self {
            parent_id,
            page: 1,
            page_size: LIST_PAGE_SIZE,
            order_by: LIST_ORDER_BY.into(),
            order_desc: false,
        }
    }
}

/// Creates a folder under a parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    pub parent_id: u64,
    pub name: String,
}

/// One chunk of a multipart session, sent as a multipart form.
///
/// Not JSON: the HTTP layer maps these fields onto form parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: u32,
    /// File name attached to the binary part.
    pub file_name: String,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Answer to an [`UploadByHashRequest`].
///
/// Every field is optional on the wire; a malformed answer decodes into
/// defaults and is judged by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastUploadResponse {
    #[serde(default)]
    pub instant: bool,
    #[serde(default)]
    pub file_id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub need_upload: bool,
}

/// Answer to a [`MultipartInitRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultipartInitResponse {
    #[serde(default)]
    pub instant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploaded: Vec<i64>,
}

/// Answer to a [`MultipartCompleteRequest`].
///
/// The reference server only answers `{"msg": "upload completed"}`; richer
/// deployments return the created record directly or under `file`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MultipartCompleteResponse {
    #[serde(default)]
    pub file: Option<FileRecord>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub msg: String,
}

impl MultipartCompleteResponse {
    /// Extracts the materialized record, if the server sent one.
    pub fn into_record(self, raw: &serde_json::Value) -> Option<FileRecord> {
        if let Some(file) = self.file {
            return Some(file);
        }
        match self.id {
            Some(id) if id > 0 => serde_json::from_value(raw.clone()).ok(),
            _ => None,
        }
    }
}

/// Answer to a [`FileListRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

fn is_false(v: &bool) -> bool {
    !*v
}

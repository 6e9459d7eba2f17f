//! Upload error types.

use skyvault_protocol::Endpoint;

/// Errors produced by the upload core.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} answered {status}: {message}")]
    Api {
        endpoint: Endpoint,
        status: u16,
        message: String,
    },

    #[error("{endpoint} reported a conflict ({status}): {message}")]
    Conflict {
        endpoint: Endpoint,
        status: u16,
        message: String,
    },

    #[error("folder {segment:?} not found under folder {parent_id}")]
    PathNotFound { segment: String, parent_id: u64 },

    #[error("folder {name:?} is still missing under folder {parent_id} after creation")]
    InconsistentState { name: String, parent_id: u64 },

    #[error("folder {segment:?} under folder {parent_id}: {source}")]
    FolderFailed {
        segment: String,
        parent_id: u64,
        #[source]
        source: Box<UploadError>,
    },

    #[error("server opened no upload session for {file_name:?}")]
    MissingUploadId { file_name: String },

    #[error("chunk {index} of {total} failed: {source}")]
    ChunkFailed {
        index: u32,
        total: u32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("upload of {path} failed: {source}")]
    FileFailed {
        path: String,
        #[source]
        source: Box<UploadError>,
    },

    #[error("authentication required: {0}")]
    Auth(String),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] skyvault_transfer::TransferError),
}

impl UploadError {
    /// Whether repeating the same request may succeed.
    ///
    /// True for transport failures, timeouts, `429` and `5xx` answers.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            UploadError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Status code of a server-side rejection, if any, looking through
    /// the context wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Api { status, .. } | UploadError::Conflict { status, .. } => {
                Some(*status)
            }
            UploadError::FolderFailed { source, .. }
            | UploadError::ChunkFailed { source, .. }
            | UploadError::FileFailed { source, .. } => source.status(),
            UploadError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

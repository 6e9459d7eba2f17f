/// Folder id of the storage root.
pub const ROOT_FOLDER_ID: u64 = 0;

/// Literal path token that always resolves to the root folder.
pub const ROOT_KEYWORD: &str = "root";

/// Page size used when listing a directory to fill the folder cache.
///
/// Large enough to fetch a whole directory in one call.
pub const LIST_PAGE_SIZE: u32 = 2000;

/// Sort column for cache-filling listings.
pub const LIST_ORDER_BY: &str = "created_at";

/// Multipart form field names of the chunk endpoint.
pub const FORM_CHUNK_INDEX: &str = "chunk_index";
pub const FORM_UPLOAD_ID: &str = "upload_id";
pub const FORM_CHUNK: &str = "chunk";

/// Storage API endpoints used by the upload core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    UploadByHash,
    MultipartInit,
    MultipartChunk,
    MultipartComplete,
    ListFiles,
    CreateFolder,
}

impl Endpoint {
    /// Path relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::UploadByHash => "/file/upload/hash",
            Endpoint::MultipartInit => "/file/upload/multipart/init",
            Endpoint::MultipartChunk => "/file/upload/multipart/chunk",
            Endpoint::MultipartComplete => "/file/upload/multipart/complete",
            Endpoint::ListFiles => "/file/list",
            Endpoint::CreateFolder => "/file/folder",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

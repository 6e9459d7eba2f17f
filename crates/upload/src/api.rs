//! Storage API seam.
//!
//! Every server call made by the upload core goes through [`StorageApi`].
//! [`crate::HttpStorageApi`] implements it over HTTP; tests use an in-memory
//! fake.

use std::future::Future;
use std::pin::Pin;

use skyvault_protocol::FileRecord;
use skyvault_protocol::messages::{
    ChunkUpload, CreateFolderRequest, FastUploadResponse, FileListRequest, FileListResponse,
    MultipartCompleteRequest, MultipartInitRequest, MultipartInitResponse, UploadByHashRequest,
};

use crate::error::UploadError;

/// Boxed future returned by [`StorageApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Abstract connection to the storage service, one method per endpoint.
///
/// Responses are already unwrapped from the server envelope. A non-success
/// status surfaces as [`UploadError::Api`] or [`UploadError::Conflict`].
pub trait StorageApi: Send + Sync {
    /// `POST /file/upload/hash`: dedup probe.
    fn upload_by_hash(&self, req: UploadByHashRequest) -> ApiFuture<'_, FastUploadResponse>;

    /// `POST /file/upload/multipart/init`: open or resume a session.
    fn multipart_init(&self, req: MultipartInitRequest) -> ApiFuture<'_, MultipartInitResponse>;

    /// `POST /file/upload/multipart/chunk`: send one chunk.
    fn upload_chunk(&self, chunk: ChunkUpload) -> ApiFuture<'_, ()>;

    /// `POST /file/upload/multipart/complete`: assemble the file.
    ///
    /// Returns the created record when the server includes one.
    fn multipart_complete(
        &self,
        req: MultipartCompleteRequest,
    ) -> ApiFuture<'_, Option<FileRecord>>;

    /// `POST /file/list`: one page of a folder's children.
    fn list_files(&self, req: FileListRequest) -> ApiFuture<'_, FileListResponse>;

    /// `POST /file/folder`: create a folder.
    fn create_folder(&self, req: CreateFolderRequest) -> ApiFuture<'_, ()>;
}

//! HTTP implementation of [`StorageApi`].
//!
//! Async client using `reqwest` with Bearer token authentication.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use skyvault_protocol::constants::{FORM_CHUNK, FORM_CHUNK_INDEX, FORM_UPLOAD_ID};
use skyvault_protocol::envelope::decode_value;
use skyvault_protocol::messages::{
    ChunkUpload, CreateFolderRequest, FastUploadResponse, FileListRequest, FileListResponse,
    MultipartCompleteRequest, MultipartCompleteResponse, MultipartInitRequest,
    MultipartInitResponse, UploadByHashRequest,
};
use skyvault_protocol::{Endpoint, FileRecord, decode_data, error_message};
use tracing::debug;

use crate::api::{ApiFuture, StorageApi};
use crate::config::ClientConfig;
use crate::error::UploadError;

/// Storage API client over HTTP/JSON.
pub struct HttpStorageApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStorageApi {
    /// Creates a client for `base_url`.
    ///
    /// Every request carries `Accept: application/json` and, when a token is
    /// given, `Authorization: Bearer <token>`.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| UploadError::Auth("token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, UploadError> {
        Self::new(
            &config.api_base,
            config.token.as_deref(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Performs a JSON POST and returns the raw success body.
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        body: &B,
    ) -> Result<Vec<u8>, UploadError> {
        let resp = self.http.post(self.url(endpoint)).json(body).send().await?;
        read_body(endpoint, resp).await
    }
}

async fn read_body(endpoint: Endpoint, resp: reqwest::Response) -> Result<Vec<u8>, UploadError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.bytes().await.unwrap_or_default();
        return Err(classify_failure(endpoint, status.as_u16(), &body));
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Maps a non-success answer to [`UploadError::Conflict`] or
/// [`UploadError::Api`].
///
/// A conflict is status `409` or a message saying the item "already exists";
/// the reference server reports duplicate folders as a `500` with that text.
pub(crate) fn classify_failure(endpoint: Endpoint, status: u16, body: &[u8]) -> UploadError {
    let message = error_message(body);
    if status == 409 || message.to_ascii_lowercase().contains("already exists") {
        UploadError::Conflict {
            endpoint,
            status,
            message,
        }
    } else {
        UploadError::Api {
            endpoint,
            status,
            message,
        }
    }
}

impl StorageApi for HttpStorageApi {
    fn upload_by_hash(&self, req: UploadByHashRequest) -> ApiFuture<'_, FastUploadResponse> {
        Box::pin(async move {
            let body = self.post_json(Endpoint::UploadByHash, &req).await?;
            Ok(decode_data(&body)?)
        })
    }

    fn multipart_init(&self, req: MultipartInitRequest) -> ApiFuture<'_, MultipartInitResponse> {
        Box::pin(async move {
            let body = self.post_json(Endpoint::MultipartInit, &req).await?;
            Ok(decode_data(&body)?)
        })
    }

    fn upload_chunk(&self, chunk: ChunkUpload) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let ChunkUpload {
                upload_id,
                chunk_index,
                file_name,
                data,
            } = chunk;
            let len = data.len();
            let form = Form::new()
                .text(FORM_CHUNK_INDEX, chunk_index.to_string())
                .text(FORM_UPLOAD_ID, upload_id)
                .part(
                    FORM_CHUNK,
                    Part::bytes(data)
                        .file_name(file_name)
                        .mime_str("application/octet-stream")?,
                );

            let resp = self
                .http
                .post(self.url(Endpoint::MultipartChunk))
                .multipart(form)
                .send()
                .await?;
            read_body(Endpoint::MultipartChunk, resp).await?;
            debug!(chunk_index, bytes = len, "chunk accepted");
            Ok(())
        })
    }

    fn multipart_complete(
        &self,
        req: MultipartCompleteRequest,
    ) -> ApiFuture<'_, Option<FileRecord>> {
        Box::pin(async move {
            let body = self.post_json(Endpoint::MultipartComplete, &req).await?;
            let value = decode_value(&body)?;
            if value.is_null() {
                return Ok(None);
            }
            let record = serde_json::from_value::<MultipartCompleteResponse>(value.clone())
                .ok()
                .and_then(|resp| resp.into_record(&value))
                .filter(|r| r.id > 0);
            Ok(record)
        })
    }

    fn list_files(&self, req: FileListRequest) -> ApiFuture<'_, FileListResponse> {
        Box::pin(async move {
            let body = self.post_json(Endpoint::ListFiles, &req).await?;
            let value = decode_value(&body)?;
            if value.is_null() {
                return Ok(FileListResponse::default());
            }
            Ok(serde_json::from_value(value)?)
        })
    }

    fn create_folder(&self, req: CreateFolderRequest) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            self.post_json(Endpoint::CreateFolder, &req).await?;
            Ok(())
        })
    }
}

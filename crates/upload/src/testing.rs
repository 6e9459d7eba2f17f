//! In-memory storage server for unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use skyvault_protocol::messages::{
    ChunkUpload, CreateFolderRequest, FastUploadResponse, FileListRequest, FileListResponse,
    MultipartCompleteRequest, MultipartInitRequest, MultipartInitResponse, UploadByHashRequest,
};
use skyvault_protocol::{Endpoint, FileRecord};

use crate::api::{ApiFuture, StorageApi};
use crate::error::UploadError;
use crate::http::classify_failure;

/// A recorded storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Probe { name: String, parent_id: u64 },
    Init { name: String, parent_id: u64, total_chunks: u32, user_id: u64 },
    Chunk { upload_id: String, index: u32, len: usize },
    Complete { name: String, parent_id: u64 },
    List { parent_id: u64 },
    CreateFolder { parent_id: u64, name: String },
}

pub(crate) struct FakeSession {
    pub upload_id: String,
    pub total_chunks: u32,
    pub received: BTreeSet<u32>,
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub next_id: u64,
    pub entries: Vec<FileRecord>,
    /// Stored content: hash → size.
    pub contents: HashMap<String, u64>,
    /// Open sessions by content hash.
    pub sessions: HashMap<String, FakeSession>,
    pub session_counter: u32,
    pub calls: Vec<Call>,
    /// Answer every probe with this instead of consulting `contents`.
    pub probe_override: Option<FastUploadResponse>,
    /// Answer every probe with this error status.
    pub probe_status: Option<u16>,
    /// Answer every probe with a body that does not decode.
    pub probe_garbled: bool,
    /// Fail every probe before it reaches the server.
    pub probe_unreachable: bool,
    /// Answer every listing with this error status.
    pub list_status: Option<u16>,
    /// Chunk indices the next new session already holds.
    pub resume_uploaded: Vec<u32>,
    /// Chunk index → (failures left, status).
    pub chunk_failures: HashMap<u32, (u32, u16)>,
    /// Answer init with a non-instant response lacking `upload_id`.
    pub init_without_id: bool,
    pub complete_returns_record: bool,
    /// Fail every folder creation with (status, message), creating nothing.
    pub create_failure: Option<(u16, &'static str)>,
}

pub(crate) struct FakeStorage {
    state: Mutex<FakeState>,
    /// Yield to the scheduler before each call takes effect.
    interleave: bool,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..Default::default()
            }),
            interleave: false,
        }
    }

    pub fn interleaved() -> Self {
        Self {
            interleave: true,
            ..Self::new()
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_folder(&self, parent_id: u64, name: &str) -> u64 {
        self.with(|s| s.insert(parent_id, name, true, 0, ""))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn chunk_indices(&self) -> Vec<u32> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Chunk { index, .. } => Some(*index),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn creations(&self) -> Vec<(u64, String)> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    Call::CreateFolder { parent_id, name } => Some((*parent_id, name.clone())),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn lists(&self) -> Vec<u64> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    Call::List { parent_id } => Some(*parent_id),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn folder_id(&self, parent_id: u64, name: &str) -> Option<u64> {
        self.with(|s| s.find(parent_id, name, true).map(|r| r.id))
    }

    pub fn files_in(&self, parent_id: u64) -> Vec<FileRecord> {
        self.with(|s| {
            s.entries
                .iter()
                .filter(|r| r.parent_id == parent_id && !r.is_dir)
                .cloned()
                .collect()
        })
    }

    async fn pause(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }
}

impl FakeState {
    fn insert(&mut self, parent_id: u64, name: &str, is_dir: bool, size: u64, hash: &str) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(FileRecord {
            id,
            name: name.into(),
            parent_id,
            size,
            hash: hash.into(),
            is_dir,
        });
        id
    }

    fn find(&self, parent_id: u64, name: &str, is_dir: bool) -> Option<&FileRecord> {
        self.entries
            .iter()
            .find(|r| r.parent_id == parent_id && r.name == name && r.is_dir == is_dir)
    }
}

fn api_error(endpoint: Endpoint, status: u16, message: &str) -> UploadError {
    UploadError::Api {
        endpoint,
        status,
        message: message.into(),
    }
}

impl StorageApi for FakeStorage {
    fn upload_by_hash(&self, req: UploadByHashRequest) -> ApiFuture<'_, FastUploadResponse> {
        Box::pin(async move {
            self.pause().await;
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Probe {
                name: req.file_name.clone(),
                parent_id: req.parent_id,
            });
            if let Some(status) = s.probe_status {
                return Err(api_error(Endpoint::UploadByHash, status, "probe rejected"));
            }
            if s.probe_unreachable {
                return Err(UploadError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            if s.probe_garbled {
                let err = serde_json::from_slice::<FastUploadResponse>(b"<html>bad gateway</html>")
                    .unwrap_err();
                return Err(UploadError::Json(err));
            }
            if let Some(resp) = s.probe_override.clone() {
                return Ok(resp);
            }
            match s.contents.get(&req.hash).copied() {
                Some(size) if size == req.size => {
                    let id = s.insert(req.parent_id, &req.file_name, false, req.size, &req.hash);
                    Ok(FastUploadResponse {
                        instant: true,
                        file_id: id,
                        ..Default::default()
                    })
                }
                Some(_) => Ok(FastUploadResponse {
                    reason: "size_mismatch".into(),
                    need_upload: true,
                    ..Default::default()
                }),
                None => Ok(FastUploadResponse {
                    need_upload: true,
                    ..Default::default()
                }),
            }
        })
    }

    fn multipart_init(&self, req: MultipartInitRequest) -> ApiFuture<'_, MultipartInitResponse> {
        Box::pin(async move {
            self.pause().await;
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Init {
                name: req.file_name.clone(),
                parent_id: req.parent_id,
                total_chunks: req.total_chunks,
                user_id: req.user_id,
            });
            if s.contents.get(&req.hash) == Some(&req.size) {
                s.insert(req.parent_id, &req.file_name, false, req.size, &req.hash);
                return Ok(MultipartInitResponse {
                    instant: true,
                    ..Default::default()
                });
            }
            if s.init_without_id {
                return Ok(MultipartInitResponse::default());
            }
            if !s.sessions.contains_key(&req.hash) {
                s.session_counter += 1;
                let upload_id = format!("up-{}", s.session_counter);
                let received = std::mem::take(&mut s.resume_uploaded).into_iter().collect();
                s.sessions.insert(
                    req.hash.clone(),
                    FakeSession {
                        upload_id,
                        total_chunks: req.total_chunks,
                        received,
                    },
                );
            }
            let session = &s.sessions[&req.hash];
            Ok(MultipartInitResponse {
                instant: false,
                upload_id: Some(session.upload_id.clone()),
                uploaded: session.received.iter().map(|&i| i as i64).collect(),
            })
        })
    }

    fn upload_chunk(&self, chunk: ChunkUpload) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            self.pause().await;
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Chunk {
                upload_id: chunk.upload_id.clone(),
                index: chunk.chunk_index,
                len: chunk.data.len(),
            });
            if let Some((left, status)) = s.chunk_failures.get_mut(&chunk.chunk_index)
                && *left > 0
            {
                *left -= 1;
                let status = *status;
                return Err(api_error(Endpoint::MultipartChunk, status, "chunk rejected"));
            }
            let Some(session) = s
                .sessions
                .values_mut()
                .find(|sess| sess.upload_id == chunk.upload_id)
            else {
                return Err(api_error(Endpoint::MultipartChunk, 404, "no such session"));
            };
            session.received.insert(chunk.chunk_index);
            Ok(())
        })
    }

    fn multipart_complete(
        &self,
        req: MultipartCompleteRequest,
    ) -> ApiFuture<'_, Option<FileRecord>> {
        Box::pin(async move {
            self.pause().await;
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Complete {
                name: req.file_name.clone(),
                parent_id: req.parent_id,
            });
            let Some(session) = s.sessions.get(&req.file_hash) else {
                return Err(api_error(Endpoint::MultipartComplete, 404, "no such session"));
            };
            if session.received.len() as u32 != session.total_chunks {
                return Err(api_error(Endpoint::MultipartComplete, 400, "missing chunks"));
            }
            s.sessions.remove(&req.file_hash);
            s.contents.insert(req.file_hash.clone(), req.file_size);
            let id = s.insert(
                req.parent_id,
                &req.file_name,
                false,
                req.file_size,
                &req.file_hash,
            );
            if s.complete_returns_record {
                Ok(s.entries.iter().find(|r| r.id == id).cloned())
            } else {
                Ok(None)
            }
        })
    }

    fn list_files(&self, req: FileListRequest) -> ApiFuture<'_, FileListResponse> {
        Box::pin(async move {
            self.pause().await;
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::List {
                parent_id: req.parent_id,
            });
            if let Some(status) = s.list_status {
                return Err(api_error(Endpoint::ListFiles, status, "listing denied"));
            }
            let files: Vec<FileRecord> = s
                .entries
                .iter()
                .filter(|r| r.parent_id == req.parent_id)
                .cloned()
                .collect();
            Ok(FileListResponse {
                total: files.len() as u64,
                files,
                page: req.page,
                page_size: req.page_size,
            })
        })
    }

    fn create_folder(&self, req: CreateFolderRequest) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            self.pause().await;
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::CreateFolder {
                parent_id: req.parent_id,
                name: req.name.clone(),
            });
            if let Some((status, message)) = s.create_failure {
                let body = serde_json::json!({ "error": message }).to_string();
                return Err(classify_failure(Endpoint::CreateFolder, status, body.as_bytes()));
            }
            if s.find(req.parent_id, &req.name, true).is_some() {
                return Err(classify_failure(
                    Endpoint::CreateFolder,
                    500,
                    br#"{"error":"create folder failed: folder already exists"}"#,
                ));
            }
            s.insert(req.parent_id, &req.name, true, 0, "");
            Ok(())
        })
    }
}

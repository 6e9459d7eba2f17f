//! Resumable chunked upload session.
//!
//! ```text
//! Init ─┬─> Negotiating ──> Uploading ──> Completing ──> Done
//!       │        └──> InstantSkip ─────────────────────────┘
//!       └─ any non-terminal state ──> Failed (restartable)
//! ```

use std::sync::Arc;

use skyvault_protocol::FileRecord;
use skyvault_protocol::messages::{
    ChunkUpload, FileListRequest, MultipartCompleteRequest, MultipartInitRequest,
    MultipartInitResponse,
};
use skyvault_transfer::{ChunkPlan, DEFAULT_CHUNK_SIZE, ThroughputMeter, UploadTask, hash_content};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::StorageApi;
use crate::error::UploadError;
use crate::retry::RetryPolicy;
use crate::types::{ProgressSink, UploadEvent, UploadPhase, UploadSource};

/// Lifecycle state of an [`UploadSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Negotiating,
    /// The server already had the content; no chunks are sent.
    InstantSkip,
    Uploading,
    Completing,
    Done,
    Failed,
}

/// Parameters shared by every session of an orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    /// Owner identity sent with the init call.
    pub user_id: u64,
    pub chunk_size: u64,
    pub confirm_materialization: bool,
    pub retry: RetryPolicy,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            user_id: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            confirm_materialization: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Negotiation found the content already stored.
    Instant { record: Option<FileRecord> },
    Transferred {
        record: Option<FileRecord>,
        chunks_sent: u32,
        chunks_skipped: u32,
    },
}

impl SessionOutcome {
    pub fn record(&self) -> Option<&FileRecord> {
        match self {
            SessionOutcome::Instant { record } | SessionOutcome::Transferred { record, .. } => {
                record.as_ref()
            }
        }
    }
}

/// Upload of one file into one folder.
///
/// If [`run`](Self::run) fails, calling it again re-negotiates with the
/// server and only sends the chunks it still lacks.
pub struct UploadSession<'a> {
    api: &'a dyn StorageApi,
    source: UploadSource,
    parent_id: u64,
    params: SessionParams,
    plan: ChunkPlan,
    digest: Option<String>,
    task: Option<UploadTask>,
    state: SessionState,
    last_error: Option<String>,
    events: ProgressSink,
    cancel: Option<CancellationToken>,
    meter: ThroughputMeter,
}

impl<'a> UploadSession<'a> {
    pub fn new(
        api: &'a dyn StorageApi,
        source: UploadSource,
        parent_id: u64,
        params: SessionParams,
    ) -> Result<Self, UploadError> {
        validate_file_name(&source.name)?;
        let plan = ChunkPlan::new(source.size(), params.chunk_size)?;

        Ok(Self {
            api,
            source,
            parent_id,
            params,
            plan,
            digest: None,
            task: None,
            state: SessionState::Init,
            last_error: None,
            events: ProgressSink::none(),
            cancel: None,
            meter: ThroughputMeter::default(),
        })
    }

    /// Reuses a digest computed earlier (e.g. for a dedup probe).
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_events(mut self, events: ProgressSink) -> Self {
        self.events = events;
        self
    }

    /// Checked before each chunk.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Resume bookkeeping, once a session id was negotiated.
    pub fn task(&self) -> Option<&UploadTask> {
        self.task.as_ref()
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Message of the error that moved the session to `Failed`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn source(&self) -> &UploadSource {
        &self.source
    }

    /// Drives the session to `Done`.
    pub async fn run(&mut self) -> Result<SessionOutcome, UploadError> {
        if self.state == SessionState::Done {
            return Err(UploadError::Validation(format!(
                "upload of {} already finished",
                self.source.name
            )));
        }
        self.state = SessionState::Init;
        self.last_error = None;

        match self.drive().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(
                    file = %self.source.name,
                    state = ?self.state,
                    error = %e,
                    "upload session failed"
                );
                self.state = SessionState::Failed;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<SessionOutcome, UploadError> {
        let digest = self.ensure_digest().await?;

        self.enter(SessionState::Negotiating, UploadPhase::Negotiating)
            .await;
        let init = self.negotiate(&digest).await?;

        if init.instant {
            self.state = SessionState::InstantSkip;
            info!(file = %self.source.name, parent_id = self.parent_id, "content already stored, skipping transfer");
            let record = self.confirm(&digest).await;
            self.enter(SessionState::Done, UploadPhase::Done).await;
            return Ok(SessionOutcome::Instant { record });
        }

        let upload_id = init
            .upload_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| UploadError::MissingUploadId {
                file_name: self.source.name.clone(),
            })?;
        let plan = self.plan;
        let task = self
            .task
            .get_or_insert_with(|| UploadTask::new(upload_id.clone(), plan));
        task.rebind(&upload_id);
        let rejected = task.merge_server_uploaded(&init.uploaded);
        if !rejected.is_empty() {
            warn!(upload_id = %upload_id, ?rejected, "ignoring out-of-range chunk indices from server");
        }
        debug!(
            upload_id = %upload_id,
            uploaded = task.uploaded_count(),
            total = task.total_chunks(),
            "session negotiated"
        );

        self.enter(SessionState::Uploading, UploadPhase::Uploading)
            .await;
        let (chunks_sent, chunks_skipped) = self.upload_chunks().await?;

        self.enter(SessionState::Completing, UploadPhase::Completing)
            .await;
        let record = self.complete(&digest).await?;

        self.enter(SessionState::Done, UploadPhase::Done).await;
        info!(
            file = %self.source.name,
            parent_id = self.parent_id,
            bytes = self.plan.size(),
            chunks_sent,
            chunks_skipped,
            "upload completed"
        );
        Ok(SessionOutcome::Transferred {
            record,
            chunks_sent,
            chunks_skipped,
        })
    }

    async fn ensure_digest(&mut self) -> Result<String, UploadError> {
        if let Some(digest) = &self.digest {
            return Ok(digest.clone());
        }
        self.events
            .phase(&self.source.name, UploadPhase::Hashing)
            .await;
        let digest = hash_content(Arc::clone(&self.source.data)).await?;
        self.digest = Some(digest.clone());
        Ok(digest)
    }

    async fn negotiate(&self, digest: &str) -> Result<MultipartInitResponse, UploadError> {
        let req = MultipartInitRequest {
            user_id: self.params.user_id,
            file_id: 0,
            file_name: self.source.name.clone(),
            size: self.plan.size(),
            hash: digest.to_string(),
            chunk_size: self.plan.chunk_size(),
            total_chunks: self.plan.total_chunks(),
            parent_id: self.parent_id,
        };
        let api = self.api;
        self.params
            .retry
            .run("multipart init", move || api.multipart_init(req.clone()))
            .await
    }

    /// Sends every chunk the server lacks, in ascending order.
    async fn upload_chunks(&mut self) -> Result<(u32, u32), UploadError> {
        let api = self.api;
        let Some(task) = self.task.as_mut() else {
            return Err(UploadError::MissingUploadId {
                file_name: self.source.name.clone(),
            });
        };
        let total = task.total_chunks();
        let upload_id = task.upload_id().to_string();
        // Time spent failing between runs must not drag the rate down.
        self.meter.reset();
        let (mut sent, mut skipped) = (0u32, 0u32);

        for index in 0..total {
            if task.is_uploaded(index) {
                skipped += 1;
                self.events
                    .emit(UploadEvent::Chunk {
                        file: self.source.name.clone(),
                        index,
                        total,
                        bytes_sent: task.bytes_uploaded(),
                        skipped: true,
                        bytes_per_second: 0.0,
                        eta: None,
                    })
                    .await;
                continue;
            }

            if let Some(cancel) = &self.cancel
                && cancel.is_cancelled()
            {
                return Err(UploadError::Cancelled);
            }

            let data = self
                .plan
                .slice(&self.source.data, index)
                .ok_or_else(|| {
                    UploadError::Validation(format!(
                        "content of {} does not match its chunk plan",
                        self.source.name
                    ))
                })?
                .to_vec();
            let len = data.len() as u64;
            let chunk = ChunkUpload {
                upload_id: upload_id.clone(),
                chunk_index: index,
                file_name: self.source.name.clone(),
                data,
            };

            self.params
                .retry
                .run("upload chunk", move || api.upload_chunk(chunk.clone()))
                .await
                .map_err(|e| UploadError::ChunkFailed {
                    index,
                    total,
                    source: Box::new(e),
                })?;

            task.record_uploaded(index);
            self.meter.record(len);
            sent += 1;
            debug!(upload_id = %upload_id, index, total, bytes = len, "chunk sent");

            self.events
                .emit(UploadEvent::Chunk {
                    file: self.source.name.clone(),
                    index,
                    total,
                    bytes_sent: task.bytes_uploaded(),
                    skipped: false,
                    bytes_per_second: self.meter.bytes_per_second(),
                    eta: self
                        .meter
                        .eta(self.plan.size().saturating_sub(task.bytes_uploaded())),
                })
                .await;
        }

        Ok((sent, skipped))
    }

    async fn complete(&self, digest: &str) -> Result<Option<FileRecord>, UploadError> {
        let req = MultipartCompleteRequest {
            file_id: 0,
            file_hash: digest.to_string(),
            file_name: self.source.name.clone(),
            file_size: self.plan.size(),
            total_chunks: self.plan.total_chunks(),
            parent_id: self.parent_id,
            is_dir: false,
        };
        let api = self.api;
        let record = self
            .params
            .retry
            .run("complete upload", move || api.multipart_complete(req.clone()))
            .await?;

        match record {
            Some(record) => Ok(Some(record)),
            None => Ok(self.confirm(digest).await),
        }
    }

    /// Looks the uploaded file up in its parent folder.
    ///
    /// The server already confirmed success, so a failed listing only costs
    /// the record.
    async fn confirm(&self, digest: &str) -> Option<FileRecord> {
        if !self.params.confirm_materialization {
            return None;
        }
        let api = self.api;
        let parent_id = self.parent_id;
        let listing = self
            .params
            .retry
            .run("confirm upload", move || {
                api.list_files(FileListRequest::whole_directory(parent_id))
            })
            .await;
        match listing {
            Ok(listing) => {
                let record = find_materialized(&listing.files, &self.source.name, digest);
                if record.is_none() {
                    debug!(file = %self.source.name, parent_id, "uploaded file not listed yet");
                }
                record
            }
            Err(e) => {
                warn!(file = %self.source.name, error = %e, "could not list parent to confirm upload");
                None
            }
        }
    }

    async fn enter(&mut self, state: SessionState, phase: UploadPhase) {
        self.state = state;
        self.events.phase(&self.source.name, phase).await;
    }
}

/// Rejects names the server cannot store as a single file.
pub(crate) fn validate_file_name(name: &str) -> Result<(), UploadError> {
    if name.trim().is_empty() {
        return Err(UploadError::Validation("file name is empty".into()));
    }
    if name.contains(['/', '\\']) {
        return Err(UploadError::Validation(format!(
            "file name contains a path separator: {name:?}"
        )));
    }
    Ok(())
}

/// Newest non-folder entry named `name` whose hash is unknown or equals
/// `digest`.
pub(crate) fn find_materialized(
    files: &[FileRecord],
    name: &str,
    digest: &str,
) -> Option<FileRecord> {
    files
        .iter()
        .rev()
        .filter(|r| !r.is_dir && r.name == name)
        .find(|r| r.hash.is_empty() || r.hash.eq_ignore_ascii_case(digest))
        .cloned()
}

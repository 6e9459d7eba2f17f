//! Upload orchestrator.
//!
//! Composes path resolution, hashing, the dedup probe and chunked sessions
//! for a single file or a whole folder tree.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use skyvault_protocol::FileRecord;
use skyvault_transfer::{RelativePath, hash_content, split_relative_path};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::StorageApi;
use crate::auth::TokenClaims;
use crate::config::ClientConfig;
use crate::dedup::{DedupOutcome, DedupReason, DedupResolver};
use crate::error::UploadError;
use crate::http::HttpStorageApi;
use crate::path::{PathResolver, ResolveOptions};
use crate::scanner::scan_tree;
use crate::session::{SessionOutcome, SessionParams, UploadSession, validate_file_name};
use crate::types::{
    FileUploadReport, OutcomeKind, ProgressSink, TreeEntry, UploadEvent, UploadPhase,
    UploadSource,
};

/// Destination folder of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadTarget {
    /// Virtual folder path; empty means `base_id` itself.
    pub path: String,
    /// Folder relative paths start from.
    pub base_id: u64,
    /// Create missing folders along `path`.
    pub create_missing: bool,
}

impl UploadTarget {
    /// The root folder.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_base(mut self, base_id: u64) -> Self {
        self.base_id = base_id;
        self
    }

    pub fn creating(mut self) -> Self {
        self.create_missing = true;
        self
    }

    fn options(&self) -> ResolveOptions {
        ResolveOptions {
            base_id: self.base_id,
            create_missing: self.create_missing,
        }
    }
}

/// Runs uploads against one storage service.
pub struct UploadOrchestrator {
    api: Arc<dyn StorageApi>,
    resolver: Arc<PathResolver>,
    params: SessionParams,
    events: ProgressSink,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    /// Creates an orchestrator with its own [`PathResolver`].
    pub fn new(api: Arc<dyn StorageApi>, params: SessionParams) -> Self {
        let resolver =
            Arc::new(PathResolver::new(Arc::clone(&api)).with_retry(params.retry.clone()));
        Self {
            api,
            resolver,
            params,
            events: ProgressSink::none(),
            cancel: CancellationToken::new(),
        }
    }

    /// Builds an HTTP-backed orchestrator.
    ///
    /// Fails with [`UploadError::Auth`] when no usable token is configured.
    pub fn from_config(config: &ClientConfig) -> Result<Self, UploadError> {
        let user_id = TokenClaims::user_id(config.token.as_deref())?;
        let api: Arc<dyn StorageApi> = Arc::new(HttpStorageApi::from_config(config)?);
        let params = SessionParams {
            user_id,
            chunk_size: config.chunk_size_bytes(),
            confirm_materialization: config.confirm_materialization,
            retry: config.retry.clone(),
        };
        Ok(Self::new(api, params))
    }

    /// Shares a resolver (and its folder cache) with other orchestrators.
    pub fn with_resolver(mut self, resolver: Arc<PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_events(mut self, events: ProgressSink) -> Self {
        self.events = events;
        self
    }

    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Returns a cancellation token for uploads run by this orchestrator.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves (and optionally creates) the target folder.
    pub async fn resolve_target(&self, target: &UploadTarget) -> Result<u64, UploadError> {
        self.resolver.resolve(&target.path, target.options()).await
    }

    /// Uploads one file into `target`.
    pub async fn upload_file(
        &self,
        source: UploadSource,
        target: &UploadTarget,
    ) -> Result<FileUploadReport, UploadError> {
        validate_file_name(&source.name)?;
        self.check_cancelled()?;
        self.events
            .phase(&source.name, UploadPhase::ResolvingTarget)
            .await;
        let parent_id = self.resolve_target(target).await?;
        self.upload_into(source, parent_id).await
    }

    /// Uploads one file into a known folder: hash, probe, then transfer if
    /// the probe misses.
    pub async fn upload_into(
        &self,
        source: UploadSource,
        parent_id: u64,
    ) -> Result<FileUploadReport, UploadError> {
        validate_file_name(&source.name)?;
        self.check_cancelled()?;

        self.events.phase(&source.name, UploadPhase::Hashing).await;
        let digest = hash_content(Arc::clone(&source.data)).await?;

        self.events.phase(&source.name, UploadPhase::Probing).await;
        let probe = DedupResolver::new(&*self.api)
            .with_retry(self.params.retry.clone())
            .try_instant(&source.name, source.size(), &digest, parent_id)
            .await?;

        match probe {
            DedupOutcome::Hit { file_id } => {
                self.events.phase(&source.name, UploadPhase::Done).await;
                info!(file = %source.name, file_id, parent_id, "instant upload");
                let size = source.size();
                let record = FileRecord {
                    id: file_id,
                    name: source.name.clone(),
                    parent_id,
                    size,
                    hash: digest.clone(),
                    is_dir: false,
                };
                Ok(FileUploadReport {
                    name: source.name,
                    parent_id,
                    size,
                    hash: digest,
                    kind: OutcomeKind::InstantProbe,
                    record: Some(record),
                    probe_fallback: None,
                })
            }
            DedupOutcome::Fallback { reason } => {
                self.events
                    .emit(UploadEvent::DedupFallback {
                        file: source.name.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                self.transfer(source, parent_id, Some(digest), Some(reason))
                    .await
            }
        }
    }

    /// Uploads a batch of files tagged with relative paths below `target`.
    ///
    /// Every relative path is validated first. Each distinct folder is
    /// materialized once, then files go up one at a time through the chunked
    /// session flow, without a separate probe. The batch stops at the first
    /// failing file; running it again resumes.
    pub async fn upload_tree(
        &self,
        entries: Vec<TreeEntry>,
        target: &UploadTarget,
    ) -> Result<Vec<FileUploadReport>, UploadError> {
        let mut planned: Vec<(TreeEntry, RelativePath)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let rel = split_relative_path(&entry.relative_path)
                .map_err(|e| UploadError::Validation(e.to_string()))?;
            planned.push((entry, rel));
        }
        self.check_cancelled()?;

        let base_id = self.resolve_target(target).await?;
        let mut folders: BTreeMap<String, u64> = BTreeMap::new();
        let distinct: BTreeMap<String, &[String]> = planned
            .iter()
            .map(|(_, rel)| (rel.dir_prefix(), rel.dirs.as_slice()))
            .collect();
        for (prefix, dirs) in distinct {
            let id = self.resolver.ensure_folder_path(base_id, dirs).await?;
            debug!(prefix = %prefix, folder_id = id, "folder ready");
            folders.insert(prefix, id);
        }

        let total = planned.len();
        let mut reports = Vec::with_capacity(total);
        for (index, (entry, rel)) in planned.into_iter().enumerate() {
            let path = entry.relative_path.clone();
            self.events
                .emit(UploadEvent::FileStarted {
                    index,
                    total,
                    path: path.clone(),
                })
                .await;

            let parent_id = folders.get(&rel.dir_prefix()).copied().unwrap_or(base_id);
            let result: Result<FileUploadReport, UploadError> = async {
                self.check_cancelled()?;
                let source = entry.load(&rel.file_name).await?;
                self.transfer(source, parent_id, None, None).await
            }
            .await;

            match result {
                Ok(report) => {
                    self.events
                        .emit(UploadEvent::FileFinished {
                            index,
                            total,
                            path,
                            kind: report.kind,
                        })
                        .await;
                    reports.push(report);
                }
                Err(e) => {
                    error!(path = %path, status = ?e.status(), error = %e, "folder upload stopped");
                    return Err(UploadError::FileFailed {
                        path,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!(files = reports.len(), base_id, "folder upload completed");
        Ok(reports)
    }

    /// Uploads a local directory, recreating it (by name) below `target`.
    pub async fn upload_directory(
        &self,
        root: &Path,
        target: &UploadTarget,
    ) -> Result<Vec<FileUploadReport>, UploadError> {
        let (entries, total_size) = scan_tree(root)?;
        info!(root = %root.display(), files = entries.len(), total_bytes = total_size, "scan complete");

        let entries = match root.file_name() {
            Some(name) => {
                let name = name.to_string_lossy();
                entries
                    .into_iter()
                    .map(|mut e| {
                        e.relative_path = format!("{name}/{}", e.relative_path);
                        e
                    })
                    .collect()
            }
            None => entries,
        };
        self.upload_tree(entries, target).await
    }

    async fn transfer(
        &self,
        source: UploadSource,
        parent_id: u64,
        digest: Option<String>,
        probe_fallback: Option<DedupReason>,
    ) -> Result<FileUploadReport, UploadError> {
        let name = source.name.clone();
        let size = source.size();

        let mut session = UploadSession::new(&*self.api, source, parent_id, self.params.clone())?
            .with_events(self.events.clone())
            .with_cancel(self.cancel.clone());
        if let Some(digest) = digest {
            session = session.with_digest(digest);
        }
        let outcome = session.run().await?;
        let hash = session.digest().unwrap_or_default().to_string();

        let (kind, record) = match outcome {
            SessionOutcome::Instant { record } => (OutcomeKind::InstantSession, record),
            SessionOutcome::Transferred {
                record,
                chunks_sent,
                chunks_skipped,
            } => (
                OutcomeKind::Transferred {
                    chunks_sent,
                    chunks_skipped,
                },
                record,
            ),
        };
        Ok(FileUploadReport {
            name,
            parent_id,
            size,
            hash,
            kind,
            record,
            probe_fallback,
        })
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

//! Instant-upload probe.
//!
//! Asks the server whether it already stores content with a given digest and
//! size. Anything other than an unambiguous hit means "transfer the bytes".

use std::fmt;

use skyvault_protocol::messages::{FastUploadResponse, UploadByHashRequest};
use tracing::{debug, warn};

use crate::api::StorageApi;
use crate::error::UploadError;
use crate::retry::RetryPolicy;

/// Why a probe did not produce an instant hit. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupReason {
    /// The server does not know the digest.
    NotFound,
    /// The digest is indexed but its stored object is gone.
    ObjectMissing,
    /// The digest is known with a different size.
    SizeMismatch,
    /// Claimed a hit without a usable file id, or sent an undecodable body.
    Ambiguous,
    /// The probe was answered with a non-success status.
    Rejected { status: u16 },
    Other(String),
}

impl DedupReason {
    /// Maps the server's `reason` field.
    pub fn from_wire(reason: &str) -> Self {
        match reason.trim() {
            "" | "hash_not_found" => DedupReason::NotFound,
            "object_missing" => DedupReason::ObjectMissing,
            "size_mismatch" => DedupReason::SizeMismatch,
            other => DedupReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DedupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupReason::NotFound => f.write_str("content not stored"),
            DedupReason::ObjectMissing => f.write_str("stored object missing"),
            DedupReason::SizeMismatch => f.write_str("size mismatch"),
            DedupReason::Ambiguous => f.write_str("ambiguous answer"),
            DedupReason::Rejected { status } => write!(f, "probe rejected with {status}"),
            DedupReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// Result of a dedup probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// The file is already materialized at the target under `file_id`.
    Hit { file_id: u64 },
    /// The bytes have to be transferred.
    Fallback { reason: DedupReason },
}

impl DedupOutcome {
    /// Classifies a probe answer.
    pub fn from_response(resp: &FastUploadResponse) -> Self {
        if resp.instant && resp.file_id > 0 {
            return DedupOutcome::Hit {
                file_id: resp.file_id,
            };
        }
        let reason = if resp.instant && resp.reason.trim().is_empty() {
            DedupReason::Ambiguous
        } else {
            DedupReason::from_wire(&resp.reason)
        };
        DedupOutcome::Fallback { reason }
    }
}

/// Sends dedup probes.
pub struct DedupResolver<'a> {
    api: &'a dyn StorageApi,
    retry: RetryPolicy,
}

impl<'a> DedupResolver<'a> {
    pub fn new(api: &'a dyn StorageApi) -> Self {
        Self {
            api,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Probes for `digest`/`size` and, on a hit, lets the server materialize
    /// `name` under `parent_id`.
    ///
    /// Error statuses and undecodable answers become fallbacks. Only a
    /// probe that never got an answer fails.
    pub async fn try_instant(
        &self,
        name: &str,
        size: u64,
        digest: &str,
        parent_id: u64,
    ) -> Result<DedupOutcome, UploadError> {
        let req = UploadByHashRequest {
            file_id: 0,
            file_name: name.to_string(),
            size,
            hash: digest.to_string(),
            parent_id,
            is_dir: false,
        };

        let api = self.api;
        let answer = self
            .retry
            .run("dedup probe", move || api.upload_by_hash(req.clone()))
            .await;
        let outcome = match answer {
            Ok(resp) => DedupOutcome::from_response(&resp),
            Err(UploadError::Api { status, message, .. })
            | Err(UploadError::Conflict { status, message, .. }) => {
                warn!(file = name, status, %message, "dedup probe rejected, falling back");
                DedupOutcome::Fallback {
                    reason: DedupReason::Rejected { status },
                }
            }
            Err(UploadError::Json(e)) => {
                warn!(file = name, error = %e, "undecodable dedup answer, falling back");
                DedupOutcome::Fallback {
                    reason: DedupReason::Ambiguous,
                }
            }
            Err(e) => return Err(e),
        };

        match &outcome {
            DedupOutcome::Hit { file_id } => debug!(file = name, file_id, "instant upload hit"),
            DedupOutcome::Fallback { reason } => {
                debug!(file = name, %reason, "instant upload miss")
            }
        }
        Ok(outcome)
    }
}

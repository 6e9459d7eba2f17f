//! Data types for the upload flow.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use skyvault_protocol::FileRecord;
use tokio::sync::mpsc;

use crate::dedup::DedupReason;
use crate::error::UploadError;

/// File content to upload, read in full before any transfer decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    /// Name the file gets on the server.
    pub name: String,
    pub data: Arc<[u8]>,
}

impl UploadSource {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Reads a local file; the server-side name is the file's own name.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                UploadError::Validation(format!("{} has no file name", path.display()))
            })?;
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Where a batch entry's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    Memory(Arc<[u8]>),
    /// Read lazily, when the entry's turn comes.
    Disk(PathBuf),
}

/// One file of a folder upload, tagged with its path relative to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// `dir/dir/name`, `/`-separated.
    pub relative_path: String,
    pub content: EntryContent,
}

impl TreeEntry {
    pub fn from_bytes(relative_path: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: EntryContent::Memory(data.into()),
        }
    }

    pub fn from_disk(relative_path: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: EntryContent::Disk(path.into()),
        }
    }

    /// Loads the bytes as an [`UploadSource`] named `file_name`.
    pub async fn load(&self, file_name: &str) -> Result<UploadSource, UploadError> {
        let data: Arc<[u8]> = match &self.content {
            EntryContent::Memory(data) => Arc::clone(data),
            EntryContent::Disk(path) => tokio::fs::read(path).await?.into(),
        };
        Ok(UploadSource::from_bytes(file_name, data))
    }
}

/// Step of a single-file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    ResolvingTarget,
    Hashing,
    Probing,
    Negotiating,
    Uploading,
    Completing,
    Done,
}

/// How a file ended up on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The dedup probe found the content.
    InstantProbe,
    /// Session negotiation found the content; no chunks were sent.
    InstantSession,
    /// Chunks were transferred and assembled.
    Transferred { chunks_sent: u32, chunks_skipped: u32 },
}

impl OutcomeKind {
    pub fn is_instant(&self) -> bool {
        !matches!(self, OutcomeKind::Transferred { .. })
    }
}

/// Result of uploading one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUploadReport {
    pub name: String,
    pub parent_id: u64,
    pub size: u64,
    pub hash: String,
    pub kind: OutcomeKind,
    /// The materialized record, when the server returned or listed one.
    pub record: Option<FileRecord>,
    /// Why the probe fell back, when a probe was made and missed.
    pub probe_fallback: Option<DedupReason>,
}

/// Progress notification emitted during uploads.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Phase {
        file: String,
        phase: UploadPhase,
    },
    DedupFallback {
        file: String,
        reason: DedupReason,
    },
    Chunk {
        file: String,
        index: u32,
        total: u32,
        /// Bytes the server holds for this file so far.
        bytes_sent: u64,
        /// The server already had this chunk.
        skipped: bool,
        bytes_per_second: f64,
        /// Estimated time left for this file, once a rate is known.
        eta: Option<Duration>,
    },
    FileStarted {
        index: usize,
        total: usize,
        path: String,
    },
    FileFinished {
        index: usize,
        total: usize,
        path: String,
        kind: OutcomeKind,
    },
}

/// Optional destination for [`UploadEvent`]s.
///
/// Sending never fails the upload: a closed or absent receiver just drops
/// events. A live receiver applies backpressure, so it must be drained.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink(Option<mpsc::Sender<UploadEvent>>);

impl ProgressSink {
    /// A sink that drops everything.
    pub fn none() -> Self {
        Self(None)
    }

    /// Creates a sink and its receiver.
    ///
    /// The channel is bounded: once `capacity` events are queued, the upload
    /// waits for the receiver before emitting the next one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UploadEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self(Some(tx)), rx)
    }

    pub async fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event).await;
        }
    }

    pub(crate) async fn phase(&self, file: &str, phase: UploadPhase) {
        self.emit(UploadEvent::Phase {
            file: file.to_string(),
            phase,
        })
        .await;
    }
}

impl From<mpsc::Sender<UploadEvent>> for ProgressSink {
    fn from(tx: mpsc::Sender<UploadEvent>) -> Self {
        Self(Some(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn source_from_path_uses_file_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let source = UploadSource::from_path(&path).await.unwrap();
        assert_eq!(source.name, "notes.txt");
        assert_eq!(source.size(), 5);
        assert_eq!(&source.data[..], b"hello");
    }

    #[tokio::test]
    async fn source_from_missing_path_is_io_error() {
        let result = UploadSource::from_path(Path::new("/nonexistent/x.bin")).await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }

    #[tokio::test]
    async fn tree_entry_loads_lazily_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();

        let entry = TreeEntry::from_disk("sub/a.bin", &path);
        std::fs::write(&path, b"abcd").unwrap();
        let source = entry.load("a.bin").await.unwrap();
        assert_eq!(source.size(), 4);
    }

    #[tokio::test]
    async fn sink_without_receiver_drops_events() {
        let (sink, rx) = ProgressSink::channel(1);
        drop(rx);
        sink.phase("f", UploadPhase::Hashing).await;
        ProgressSink::none().phase("f", UploadPhase::Done).await;
    }

    #[tokio::test]
    async fn sink_delivers_events() {
        let (sink, mut rx) = ProgressSink::channel(4);
        sink.phase("f", UploadPhase::Probing).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            UploadEvent::Phase {
                file: "f".into(),
                phase: UploadPhase::Probing
            }
        );
    }

    #[test]
    fn instant_kinds() {
        assert!(OutcomeKind::InstantProbe.is_instant());
        assert!(OutcomeKind::InstantSession.is_instant());
        assert!(
            !OutcomeKind::Transferred {
                chunks_sent: 1,
                chunks_skipped: 0
            }
            .is_instant()
        );
    }
}

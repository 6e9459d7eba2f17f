use tokio::sync::mpsc;
use tracing::{debug, info};

use skyvault_upload::UploadEvent;

/// Logs upload events until every sender is gone.
pub async fn log_events(mut rx: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            UploadEvent::Phase { file, phase } => debug!(%file, ?phase, "phase"),
            UploadEvent::DedupFallback { file, reason } => {
                info!(%file, %reason, "not deduplicated, uploading")
            }
            UploadEvent::Chunk {
                file,
                index,
                total,
                bytes_sent,
                skipped,
                bytes_per_second,
                eta,
            } => {
                if skipped {
                    debug!(%file, index, total, "chunk already on server");
                } else {
                    info!(
                        %file,
                        chunk = index + 1,
                        total,
                        bytes_sent,
                        kib_per_sec = (bytes_per_second / 1024.0) as u64,
                        eta_secs = eta.map(|d| d.as_secs()),
                        "chunk sent"
                    );
                }
            }
            UploadEvent::FileStarted { index, total, path } => {
                info!("[{}/{}] {path}", index + 1, total)
            }
            UploadEvent::FileFinished { path, kind, .. } => {
                if kind.is_instant() {
                    info!(%path, "instant");
                } else {
                    info!(%path, ?kind, "uploaded");
                }
            }
        }
    }
}

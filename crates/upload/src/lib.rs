//! Client upload core for a content-addressed file store.
//!
//! Files are identified by their SHA-256 digest. Before any bytes move the
//! client asks the server whether it already holds the content; only on a
//! miss does it negotiate a resumable chunked session.
//!
//! # Pipeline
//!
//! 1. **Resolve** the virtual target folder, creating it on demand
//! 2. **Hash** the content
//! 3. **Probe** for an instant (dedup) upload
//! 4. **Negotiate** a session and learn which chunks the server has
//! 5. **Upload** the missing chunks
//! 6. **Complete** and confirm the file exists
//!
//! The [`StorageApi`] trait is the transport seam; [`HttpStorageApi`] is
//! the production implementation.

pub mod api;
pub mod auth;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod path;
pub mod retry;
pub mod scanner;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{ApiFuture, StorageApi};
pub use auth::TokenClaims;
pub use config::ClientConfig;
pub use dedup::{DedupOutcome, DedupReason, DedupResolver};
pub use error::UploadError;
pub use http::HttpStorageApi;
pub use orchestrator::{UploadOrchestrator, UploadTarget};
pub use path::{FolderCache, PathResolver, ResolveOptions, VirtualPath};
pub use retry::RetryPolicy;
pub use scanner::scan_tree;
pub use session::{SessionOutcome, SessionParams, SessionState, UploadSession};
pub use types::{
    EntryContent, FileUploadReport, OutcomeKind, ProgressSink, TreeEntry, UploadEvent,
    UploadPhase, UploadSource,
};

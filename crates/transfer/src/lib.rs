//! Content hashing, chunk planning and resume bookkeeping.
//!
//! Everything here is transport-agnostic: the upload core feeds bytes in and
//! gets digests, byte ranges and "what is still missing" answers back.

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{
    ChunkPlan, calculate_file_checksum, checksum_bytes, hash_content, total_chunks,
};
pub use progress::ThroughputMeter;
pub use types::UploadTask;
pub use validation::{RelativePath, split_relative_path};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// One mebibyte, the unit chunk sizes are configured in.
pub const MIB: u64 = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("file of {size} bytes needs more than {max} chunks of {chunk_size} bytes", max = u32::MAX)]
    TooManyChunks { size: u64, chunk_size: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

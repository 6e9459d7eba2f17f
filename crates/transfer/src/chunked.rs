use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::TransferError;

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the lowercase hex digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hashes file content on the blocking pool.
///
/// Large files keep a core busy for a while; running the digest inline
/// would stall every other task on the runtime thread.
pub async fn hash_content(data: Arc<[u8]>) -> Result<String, TransferError> {
    let digest = tokio::task::spawn_blocking(move || checksum_bytes(&data)).await?;
    Ok(digest)
}

// ---------------------------------------------------------------------------
// Chunk planning
// ---------------------------------------------------------------------------

/// Number of chunks needed for `size` bytes: `max(1, ceil(size / chunk_size))`.
///
/// An empty file still occupies one (empty) chunk.
pub fn total_chunks(size: u64, chunk_size: u64) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    let n = size.div_ceil(chunk_size).max(1);
    u32::try_from(n).map_err(|_| TransferError::TooManyChunks { size, chunk_size })
}

/// Splits a file of known size into fixed-size, indexed byte ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
    total_chunks: u32,
}

impl ChunkPlan {
    /// Plans chunks of `chunk_size` bytes over a file of `size` bytes.
    pub fn new(size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        let total_chunks = total_chunks(size, chunk_size)?;
        Ok(Self {
            size,
            chunk_size,
            total_chunks,
        })
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Byte range of chunk `index`: `[index*c, min(size, (index+1)*c))`.
    ///
    /// Returns `None` for indices outside `[0, total_chunks)`.
    pub fn span(&self, index: u32) -> Option<Range<u64>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = (index as u64 * self.chunk_size).min(self.size);
        let end = start.saturating_add(self.chunk_size).min(self.size);
        Some(start..end)
    }

    /// Length in bytes of chunk `index`.
    pub fn chunk_len(&self, index: u32) -> Option<u64> {
        self.span(index).map(|r| r.end - r.start)
    }

    /// Borrows the bytes of chunk `index` out of the full file content.
    ///
    /// `data` must be the content the plan was built for.
    pub fn slice<'a>(&self, data: &'a [u8], index: u32) -> Option<&'a [u8]> {
        if data.len() as u64 != self.size {
            return None;
        }
        let span = self.span(index)?;
        data.get(span.start as usize..span.end as usize)
    }

    /// Iterates `(index, span)` in ascending index order.
    pub fn spans(&self) -> impl Iterator<Item = (u32, Range<u64>)> + '_ {
        (0..self.total_chunks).filter_map(move |i| self.span(i).map(|r| (i, r)))
    }
}

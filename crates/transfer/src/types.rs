use std::collections::BTreeSet;

use crate::chunked::ChunkPlan;

/// Client-side view of a server upload session.
///
/// Tracks which chunk indices the server holds. The set only grows while
/// the session id stays the same, so a failed transfer can be resumed from
/// whatever was already accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    upload_id: String,
    plan: ChunkPlan,
    uploaded: BTreeSet<u32>,
}

impl UploadTask {
    /// Creates a task for a freshly negotiated session.
    pub fn new(upload_id: impl Into<String>, plan: ChunkPlan) -> Self {
        Self {
            upload_id: upload_id.into(),
            plan,
            uploaded: BTreeSet::new(),
        }
    }

    /// Server-issued session id.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn total_chunks(&self) -> u32 {
        self.plan.total_chunks()
    }

    /// Adopts the session id from a new negotiation.
    ///
    /// A different id is a different server session, so the local record of
    /// accepted chunks no longer applies and is cleared.
    pub fn rebind(&mut self, upload_id: &str) {
        if self.upload_id != upload_id {
            self.upload_id = upload_id.to_string();
            self.uploaded.clear();
        }
    }

    /// Merges the indices the server reports as already stored.
    ///
    /// Returns the reported indices that fall outside `[0, total_chunks)`;
    /// those are dropped rather than trusted.
    pub fn merge_server_uploaded(&mut self, reported: &[i64]) -> Vec<i64> {
        let total = self.plan.total_chunks() as i64;
        let mut rejected = Vec::new();
        for &index in reported {
            if (0..total).contains(&index) {
                self.uploaded.insert(index as u32);
            } else {
                rejected.push(index);
            }
        }
        rejected
    }

    /// Records a chunk the server accepted.
    pub fn record_uploaded(&mut self, index: u32) {
        if index < self.plan.total_chunks() {
            self.uploaded.insert(index);
        }
    }

    pub fn is_uploaded(&self, index: u32) -> bool {
        self.uploaded.contains(&index)
    }

    /// Indices still missing, ascending.
    pub fn pending(&self) -> Vec<u32> {
        (0..self.plan.total_chunks())
            .filter(|i| !self.uploaded.contains(i))
            .collect()
    }

    pub fn uploaded_count(&self) -> u32 {
        self.uploaded.len() as u32
    }

    /// Returns `true` once every index in `[0, total_chunks)` is stored.
    pub fn is_complete(&self) -> bool {
        self.uploaded.len() as u32 == self.plan.total_chunks()
    }

    /// Bytes covered by the chunks already stored.
    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded
            .iter()
            .filter_map(|&i| self.plan.chunk_len(i))
            .sum()
    }
}

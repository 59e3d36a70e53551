//! The contact-graph boundary used by discovery and review.
//!
//! ContactGraph is implemented by ContactGraphSync over any GraphStore, and by
//! MemoryContactGraph (test-support) for deterministic tests without Neo4j.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rapport_common::{Contact, SimilarityEdge};

use crate::store::{GraphError, WriteSummary};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Result of a single contact upsert. Failures are values, never errors, so
/// callers may fire and forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub orphans_reclaimed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub contact_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSyncReport {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<SyncFailure>,
}

/// Two contacts sharing tags, as returned by the aggregate overlap query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagOverlap {
    pub source_id: String,
    pub target_id: String,
    pub shared_tags: Vec<String>,
    pub source_tag_count: usize,
    pub target_tag_count: usize,
}

impl TagOverlap {
    pub fn shared_count(&self) -> usize {
        self.shared_tags.len()
    }

    /// Shared tags over the union of both tag sets.
    pub fn jaccard(&self) -> f64 {
        let shared = self.shared_tags.len();
        let union = (self.source_tag_count + self.target_tag_count).saturating_sub(shared);
        if union == 0 {
            return 0.0;
        }
        shared as f64 / union as f64
    }
}

// ---------------------------------------------------------------------------
// BatchProgress
// ---------------------------------------------------------------------------

/// Receives `(processed, total)` after each bulk-sync batch.
#[async_trait]
pub trait BatchProgress: Send + Sync {
    async fn batch_done(&self, processed: usize, total: usize);
}

pub struct NoProgress;

#[async_trait]
impl BatchProgress for NoProgress {
    async fn batch_done(&self, _processed: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// ContactGraph
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContactGraph: Send + Sync {
    async fn ping(&self) -> Result<(), GraphError>;

    /// Idempotent merge of a contact plus its derived company and tag edges.
    async fn upsert_contact(&self, tenant: &str, contact: &Contact) -> SyncOutcome;

    /// Detach-delete a contact, then reclaim orphaned Company/Tag nodes.
    async fn delete_contact(&self, tenant: &str, contact_id: &str)
        -> Result<DeleteOutcome, GraphError>;

    /// Delete Company/Tag nodes no contact references any more.
    async fn reclaim_orphans(&self, tenant: &str) -> Result<u64, GraphError>;

    async fn get_contact(&self, tenant: &str, contact_id: &str)
        -> Result<Option<Contact>, GraphError>;

    /// Idempotent merge of an undirected SIMILARITY edge.
    async fn write_similarity_edge(
        &self,
        tenant: &str,
        edge: &SimilarityEdge,
    ) -> Result<WriteSummary, GraphError>;

    /// All contact pairs sharing at least `min_shared` tags.
    async fn find_tag_overlaps(
        &self,
        tenant: &str,
        min_shared: usize,
    ) -> Result<Vec<TagOverlap>, GraphError>;

    /// Persisted SIMILARITY edges touching a contact, oriented from it.
    async fn similar_contacts(
        &self,
        tenant: &str,
        contact_id: &str,
    ) -> Result<Vec<SimilarityEdge>, GraphError>;

    /// Sync contacts in fixed-size batches. Upserts within a batch run
    /// concurrently; individual failures are collected, never fatal. Returns
    /// `Err` only when the graph is unreachable before the first batch.
    async fn bulk_sync(
        &self,
        tenant: &str,
        contacts: &[Contact],
        batch_size: usize,
        progress: &dyn BatchProgress,
    ) -> Result<BulkSyncReport, GraphError> {
        self.ping().await?;

        let total = contacts.len();
        let mut report = BulkSyncReport::default();
        let mut processed = 0usize;

        for batch in contacts.chunks(batch_size.max(1)) {
            let outcomes = join_all(batch.iter().map(|c| self.upsert_contact(tenant, c))).await;

            for (contact, outcome) in batch.iter().zip(outcomes) {
                if outcome.success {
                    report.synced += 1;
                } else {
                    let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                    warn!(tenant, contact_id = contact.id.as_str(), error = error.as_str(), "Contact sync failed");
                    report.failed += 1;
                    report.errors.push(SyncFailure {
                        contact_id: contact.id.clone(),
                        error,
                    });
                }
            }

            processed += batch.len();
            progress.batch_done(processed, total).await;
        }

        info!(tenant, synced = report.synced, failed = report.failed, "Bulk sync complete");
        Ok(report)
    }
}

//! Relationship discovery pipeline.
//!
//! Four sequential phases, each owning a band of overall progress:
//!
//! | Phase   | Band    | Writes to graph            |
//! |---------|---------|----------------------------|
//! | sync    | 0-30%   | contacts, companies, tags  |
//! | company | 30-40%  | nothing (stats only)       |
//! | vector  | 40-90%  | HIGH-tier SIMILARITY edges |
//! | tags    | 90-100% | HIGH-tier SIMILARITY edges |
//!
//! MEDIUM and LOW candidates are only returned, never written; they become
//! edges through the review workflow.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rapport_common::{
    pair_key, CompanyGroup, ConfidenceTier, Contact, DiscoveryStats, PairKey, PendingRelationship,
    RelationshipBuckets, RelationshipCounts, ReviewStatus, SimilarityMethod,
};
use rapport_graph::{derive_company, BatchProgress, ContactGraph};

use crate::classify::{classify_score, classify_shared_tags, TAGS_LOW_THRESHOLD};
use crate::error::DiscoveryError;
use crate::vector::VectorIndex;

type Band = (u8, u8);

const SYNC_BAND: Band = (0, 30);
const COMPANY_BAND: Band = (30, 40);
const VECTOR_BAND: Band = (40, 90);
const TAGS_BAND: Band = (90, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Neighbors considered per contact, not counting the contact itself.
    pub top_k: usize,
    pub sync_batch_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            sync_batch_size: 50,
        }
    }
}

/// Receives `(percent, step)` as the pipeline advances. Percentages never
/// decrease within a run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8, step: &str);
}

pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _percent: u8, _step: &str) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub relationships: RelationshipBuckets,
    pub counts: RelationshipCounts,
    pub stats: DiscoveryStats,
}

/// Position `done/total` inside a progress band.
fn band_percent(band: Band, done: usize, total: usize) -> u8 {
    let (start, end) = band;
    if total == 0 {
        return end;
    }
    let span = (end - start) as usize;
    start + (span * done.min(total) / total) as u8
}

/// Maps bulk-sync batch callbacks into the sync band.
struct SyncProgress<'a> {
    sink: &'a dyn ProgressSink,
}

#[async_trait]
impl<'a> BatchProgress for SyncProgress<'a> {
    async fn batch_done(&self, processed: usize, total: usize) {
        self.sink
            .report(
                band_percent(SYNC_BAND, processed, total),
                &format!("Synced {processed}/{total} contacts to graph"),
            )
            .await;
    }
}

/// State carried across phases of a single run.
#[derive(Default)]
struct Run {
    seen: HashSet<PairKey>,
    buckets: RelationshipBuckets,
    stats: DiscoveryStats,
}

pub struct RelationshipDiscoveryEngine {
    graph: Arc<dyn ContactGraph>,
    vectors: Arc<dyn VectorIndex>,
    config: DiscoveryConfig,
}

impl RelationshipDiscoveryEngine {
    pub fn new(graph: Arc<dyn ContactGraph>, vectors: Arc<dyn VectorIndex>, config: DiscoveryConfig) -> Self {
        Self { graph, vectors, config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run the full pipeline for one tenant.
    pub async fn discover_all(
        &self,
        tenant: &str,
        contacts: &[Contact],
        progress: &dyn ProgressSink,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        info!(tenant, contacts = contacts.len(), "Relationship discovery starting");
        let mut run = Run::default();

        // Phase 1: sync
        progress.report(SYNC_BAND.0, "Syncing contacts to graph").await;
        let report = self
            .graph
            .bulk_sync(tenant, contacts, self.config.sync_batch_size, &SyncProgress { sink: progress })
            .await
            .map_err(|e| DiscoveryError::Fatal(e.to_string()))?;
        if report.synced == 0 && report.failed > 0 {
            let first = report.errors.first().map(|f| f.error.as_str()).unwrap_or("unknown error");
            return Err(DiscoveryError::Fatal(format!(
                "all {} contacts failed to sync (first error: {first})",
                report.failed
            )));
        }
        run.stats.contacts_synced = report.synced;
        run.stats.contacts_failed = report.failed;

        // Phase 2: company groups
        progress.report(COMPANY_BAND.0, "Grouping contacts by company").await;
        run.stats.company_groups = group_by_company(contacts);
        progress
            .report(
                COMPANY_BAND.1,
                &format!("Found {} companies with multiple contacts", run.stats.company_groups.len()),
            )
            .await;

        // Phase 3: vector similarity
        self.vector_phase(tenant, contacts, &mut run, progress).await;

        // Phase 4: shared tags
        progress.report(TAGS_BAND.0, "Finding contacts with shared tags").await;
        self.tag_phase(tenant, &mut run).await;

        let counts = run.buckets.counts();
        progress
            .report(
                TAGS_BAND.1,
                &format!("Discovery complete: {} relationships found", counts.total),
            )
            .await;

        info!(
            tenant,
            high = counts.high,
            medium = counts.medium,
            low = counts.low,
            edges_written = run.stats.edges_written,
            vector_skipped = run.stats.vector_skipped,
            "Relationship discovery complete"
        );

        Ok(DiscoveryResult {
            relationships: run.buckets,
            counts,
            stats: run.stats,
        })
    }

    async fn vector_phase(&self, tenant: &str, contacts: &[Contact], run: &mut Run, progress: &dyn ProgressSink) {
        let total = contacts.len();
        progress.report(VECTOR_BAND.0, "Analyzing contact similarity").await;

        for (i, contact) in contacts.iter().enumerate() {
            match self.similar_to(tenant, contact, run).await {
                Ok(true) => run.stats.vector_processed += 1,
                Ok(false) => {
                    debug!(tenant, contact_id = contact.id.as_str(), "No embedding, skipping");
                    run.stats.vector_skipped += 1;
                }
                Err(e) => {
                    warn!(tenant, contact_id = contact.id.as_str(), error = %e, "Similarity lookup failed, skipping");
                    run.stats.vector_skipped += 1;
                }
            }

            progress
                .report(
                    band_percent(VECTOR_BAND, i + 1, total),
                    &format!("Analyzed {}/{} contacts", i + 1, total),
                )
                .await;
        }
    }

    /// Classify one contact's nearest neighbors. `Ok(false)` when the contact
    /// has no embedding.
    async fn similar_to(&self, tenant: &str, contact: &Contact, run: &mut Run) -> anyhow::Result<bool> {
        let embeddings = self.vectors.fetch(tenant, std::slice::from_ref(&contact.id)).await?;
        let Some(embedding) = embeddings.get(&contact.id).filter(|v| !v.is_empty()) else {
            return Ok(false);
        };

        // One extra slot since the contact usually matches itself.
        let matches = self.vectors.query(tenant, embedding, self.config.top_k + 1).await?;

        for neighbor in matches {
            if neighbor.id == contact.id {
                continue;
            }
            let Some(tier) = classify_score(neighbor.score) else {
                continue;
            };
            if !run.seen.insert(pair_key(&contact.id, &neighbor.id)) {
                continue;
            }

            let relationship = PendingRelationship {
                source_id: contact.id.clone(),
                target_id: neighbor.id,
                method: SimilarityMethod::Vector,
                score: neighbor.score,
                tier,
                review_status: ReviewStatus::Pending,
                shared_tags: Vec::new(),
                llm_assessment: None,
            };
            self.record(tenant, relationship, run).await;
        }
        Ok(true)
    }

    async fn tag_phase(&self, tenant: &str, run: &mut Run) {
        let overlaps = match self.graph.find_tag_overlaps(tenant, TAGS_LOW_THRESHOLD).await {
            Ok(overlaps) => overlaps,
            Err(e) => {
                warn!(tenant, error = %e, "Tag overlap query failed, skipping tag phase");
                return;
            }
        };

        for overlap in overlaps {
            let Some(tier) = classify_shared_tags(overlap.shared_count()) else {
                continue;
            };
            if !run.seen.insert(pair_key(&overlap.source_id, &overlap.target_id)) {
                continue;
            }

            let score = overlap.jaccard();
            let relationship = PendingRelationship {
                source_id: overlap.source_id,
                target_id: overlap.target_id,
                method: SimilarityMethod::Tags,
                score,
                tier,
                review_status: ReviewStatus::Pending,
                shared_tags: overlap.shared_tags,
                llm_assessment: None,
            };
            self.record(tenant, relationship, run).await;
        }
    }

    /// Bucket a new relationship, persisting it first when HIGH. A HIGH edge
    /// whose write fails stays pending so a reviewer can still approve it.
    async fn record(&self, tenant: &str, mut relationship: PendingRelationship, run: &mut Run) {
        if relationship.tier == ConfidenceTier::High {
            let edge = relationship.to_edge(ReviewStatus::AutoApproved);
            match self.graph.write_similarity_edge(tenant, &edge).await {
                Ok(summary) => {
                    relationship.review_status = ReviewStatus::AutoApproved;
                    run.stats.edges_written += 1;
                    debug!(
                        tenant,
                        source_id = edge.source_id.as_str(),
                        target_id = edge.target_id.as_str(),
                        method = edge.method.as_str(),
                        created = summary.relationships_created,
                        "Auto-approved similarity edge"
                    );
                }
                Err(e) => {
                    warn!(
                        tenant,
                        source_id = edge.source_id.as_str(),
                        target_id = edge.target_id.as_str(),
                        error = %e,
                        "Failed to write HIGH-tier edge, leaving it for review"
                    );
                }
            }
        }
        run.buckets.push(relationship);
    }
}

/// Companies with at least two contacts, keyed by normalized name.
fn group_by_company(contacts: &[Contact]) -> Vec<CompanyGroup> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for contact in contacts {
        if let Some(company) = derive_company(contact) {
            groups.entry(company.key).or_default().push(contact.id.clone());
        }
    }
    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() >= 2)
        .map(|(company, contact_ids)| CompanyGroup { company, contact_ids })
        .collect()
}

//! Discovery job tracking.
//!
//! A job moves `started -> completed | failed` and never leaves a terminal
//! state. Jobs live in a [`JobStore`] so several service instances can share
//! them; jobs older than the TTL are swept whenever a new job is created.
//! Sweeping a job discards any relationships still awaiting review. Edges
//! already approved live in the graph and are unaffected.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use rapport_common::{
    ConfidenceTier, DiscoveryJob, DiscoveryStats, JobStatus, LlmAssessment, PendingRelationship,
    RelationshipBuckets, RelationshipCounts, ReviewStatus,
};

use crate::engine::DiscoveryResult;

pub const DEFAULT_JOB_TTL_SECS: i64 = 3600;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Discovery job not found: {0}")]
    NotFound(String),

    #[error("Discovery job {job_id} is already {status}")]
    Terminal { job_id: String, status: JobStatus },

    #[error("Relationship {source_id} <-> {target_id} not found in job {job_id}")]
    RelationshipNotFound {
        job_id: String,
        source_id: String,
        target_id: String,
    },

    #[error("Relationship {source_id} <-> {target_id} was already {status}")]
    AlreadyReviewed {
        source_id: String,
        target_id: String,
        status: ReviewStatus,
    },

    #[error("Job store error: {0}")]
    Store(String),
}

/// A review state change applied by [`DiscoveryJobRegistry::mark_reviewed`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTransition {
    /// State the relationship was in before the call.
    pub previous: ReviewStatus,
    pub entry: PendingRelationship,
}

/// Mutation applied atomically to a stored job.
pub type JobMutation<'a> = &'a mut (dyn FnMut(&mut DiscoveryJob) -> Result<(), JobError> + Send);

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<Option<DiscoveryJob>, JobError>;

    async fn put(&self, job: &DiscoveryJob) -> Result<(), JobError>;

    /// Apply `mutate` to the stored job and persist the result. Nothing is
    /// written when `mutate` fails.
    async fn update(&self, job_id: &str, mutate: JobMutation<'_>) -> Result<DiscoveryJob, JobError>;

    async fn delete(&self, job_id: &str) -> Result<bool, JobError>;

    /// Delete every job created before `cutoff`; returns how many.
    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError>;
}

// ---------------------------------------------------------------------------
// MemoryJobStore
// ---------------------------------------------------------------------------

/// Process-local store. Jobs do not survive a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, DiscoveryJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<DiscoveryJob>, JobError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn put(&self, job: &DiscoveryJob) -> Result<(), JobError> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update(&self, job_id: &str, mutate: JobMutation<'_>) -> Result<DiscoveryJob, JobError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let mut updated = stored.clone();
        mutate(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, job_id: &str) -> Result<bool, JobError> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }

    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.created_at >= cutoff);
        Ok(before - jobs.len())
    }
}

// ---------------------------------------------------------------------------
// Status view
// ---------------------------------------------------------------------------

/// What a polling client sees. `result` is present once the job completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub result: Option<JobResultView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResultView {
    pub relationships: RelationshipBuckets,
    pub counts: RelationshipCounts,
    pub stats: DiscoveryStats,
}

impl From<&DiscoveryJob> for JobStatusView {
    fn from(job: &DiscoveryJob) -> Self {
        let result = (job.status == JobStatus::Completed).then(|| JobResultView {
            relationships: job.relationships.clone(),
            counts: job.counts,
            stats: job.stats.clone().unwrap_or_default(),
        });
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            current_step: job.current_step.clone(),
            result,
            error: job.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// DiscoveryJobRegistry
// ---------------------------------------------------------------------------

pub struct DiscoveryJobRegistry {
    store: Arc<dyn JobStore>,
    ttl: Duration,
}

impl DiscoveryJobRegistry {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            ttl: Duration::seconds(DEFAULT_JOB_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start tracking a new job. Expired jobs are swept first; a failed sweep
    /// does not prevent job creation.
    pub async fn create_job(&self, tenant: &str) -> Result<DiscoveryJob, JobError> {
        if let Err(e) = self.sweep_expired().await {
            warn!(error = %e, "Job sweep failed");
        }

        let job = DiscoveryJob::new(Uuid::new_v4().to_string(), tenant, Utc::now());
        self.store.put(&job).await?;
        info!(job_id = job.id.as_str(), tenant, "Discovery job created");
        Ok(job)
    }

    /// Record progress. Percentages are clamped to 100 and never move backwards.
    pub async fn update_progress(&self, job_id: &str, percent: u8, step: &str) -> Result<(), JobError> {
        self.store
            .update(job_id, &mut |job| {
                ensure_running(job)?;
                job.progress = job.progress.max(percent.min(100));
                job.current_step = step.to_string();
                job.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn complete_job(&self, job_id: &str, result: DiscoveryResult) -> Result<(), JobError> {
        let mut result = Some(result);
        let job = self
            .store
            .update(job_id, &mut |job| {
                ensure_running(job)?;
                if let Some(result) = result.take() {
                    job.relationships = result.relationships;
                    job.counts = result.counts;
                    job.stats = Some(result.stats);
                }
                let now = Utc::now();
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.current_step = "Discovery complete".to_string();
                job.updated_at = now;
                job.completed_at = Some(now);
                Ok(())
            })
            .await?;
        info!(job_id, total = job.counts.total, "Discovery job completed");
        Ok(())
    }

    pub async fn fail_job(&self, job_id: &str, error: &str) -> Result<(), JobError> {
        self.store
            .update(job_id, &mut |job| {
                ensure_running(job)?;
                let now = Utc::now();
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.current_step = "Discovery failed".to_string();
                job.updated_at = now;
                job.completed_at = Some(now);
                Ok(())
            })
            .await?;
        warn!(job_id, error, "Discovery job failed");
        Ok(())
    }

    /// The job if it exists and belongs to `tenant`. Foreign and missing jobs
    /// are indistinguishable.
    pub async fn get_job_for_user(&self, job_id: &str, tenant: &str) -> Result<Option<DiscoveryJob>, JobError> {
        Ok(self.store.get(job_id).await?.filter(|job| job.tenant_id == tenant))
    }

    pub async fn job_status(&self, job_id: &str, tenant: &str) -> Result<Option<JobStatusView>, JobError> {
        Ok(self
            .get_job_for_user(job_id, tenant)
            .await?
            .map(|job| JobStatusView::from(&job)))
    }

    /// All relationships of one tier, regardless of review state.
    pub async fn relationships_for_user(
        &self,
        job_id: &str,
        tenant: &str,
        tier: ConfidenceTier,
    ) -> Result<Option<Vec<PendingRelationship>>, JobError> {
        Ok(self
            .get_job_for_user(job_id, tenant)
            .await?
            .map(|job| job.relationships.bucket(tier).clone()))
    }

    /// Move one relationship to `status`, checked and applied in a single
    /// store update so concurrent reviewers cannot overwrite each other.
    ///
    /// A pending relationship takes any state. Repeating the current state,
    /// or approving an auto-approved one, leaves it as is. Anything else
    /// fails with [`JobError::AlreadyReviewed`].
    pub async fn mark_reviewed(
        &self,
        job_id: &str,
        source_id: &str,
        target_id: &str,
        status: ReviewStatus,
    ) -> Result<ReviewTransition, JobError> {
        let mut previous = ReviewStatus::Pending;
        let job = self
            .store
            .update(job_id, &mut |job| {
                let entry = find_entry(job, source_id, target_id)?;
                let next = review_transition(entry.review_status, status).ok_or_else(|| {
                    JobError::AlreadyReviewed {
                        source_id: entry.source_id.clone(),
                        target_id: entry.target_id.clone(),
                        status: entry.review_status,
                    }
                })?;
                previous = entry.review_status;
                if next != entry.review_status {
                    entry.review_status = next;
                    job.updated_at = Utc::now();
                }
                Ok(())
            })
            .await?;
        let entry = job
            .relationships
            .find(source_id, target_id)
            .cloned()
            .ok_or_else(|| relationship_not_found(job_id, source_id, target_id))?;
        Ok(ReviewTransition { previous, entry })
    }

    /// Put a relationship back to `pending` if it is still in state `from`.
    /// Returns whether it was reopened.
    pub async fn reopen_review(
        &self,
        job_id: &str,
        source_id: &str,
        target_id: &str,
        from: ReviewStatus,
    ) -> Result<bool, JobError> {
        let mut reopened = false;
        self.store
            .update(job_id, &mut |job| {
                let entry = find_entry(job, source_id, target_id)?;
                reopened = entry.review_status == from;
                if reopened {
                    entry.review_status = ReviewStatus::Pending;
                    job.updated_at = Utc::now();
                }
                Ok(())
            })
            .await?;
        Ok(reopened)
    }

    pub async fn store_assessment(
        &self,
        job_id: &str,
        source_id: &str,
        target_id: &str,
        assessment: &LlmAssessment,
    ) -> Result<(), JobError> {
        self.store
            .update(job_id, &mut |job| {
                let entry = find_entry(job, source_id, target_id)?;
                entry.llm_assessment = Some(assessment.clone());
                job.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete jobs older than the TTL.
    pub async fn sweep_expired(&self) -> Result<usize, JobError> {
        let swept = self.store.sweep_older_than(Utc::now() - self.ttl).await?;
        if swept > 0 {
            info!(swept, "Swept expired discovery jobs");
        }
        Ok(swept)
    }
}

fn ensure_running(job: &DiscoveryJob) -> Result<(), JobError> {
    if job.status.is_terminal() {
        return Err(JobError::Terminal {
            job_id: job.id.clone(),
            status: job.status,
        });
    }
    Ok(())
}

/// The state a relationship in `current` ends up in when `requested` is
/// asked for, or None when that would overturn an earlier decision.
fn review_transition(current: ReviewStatus, requested: ReviewStatus) -> Option<ReviewStatus> {
    match (current, requested) {
        (ReviewStatus::Pending, next) => Some(next),
        (current, next) if current == next => Some(current),
        (ReviewStatus::AutoApproved, ReviewStatus::Approved) => Some(ReviewStatus::AutoApproved),
        _ => None,
    }
}

fn find_entry<'a>(
    job: &'a mut DiscoveryJob,
    source_id: &str,
    target_id: &str,
) -> Result<&'a mut PendingRelationship, JobError> {
    let job_id = job.id.clone();
    job.relationships
        .find_mut(source_id, target_id)
        .ok_or_else(|| relationship_not_found(&job_id, source_id, target_id))
}

fn relationship_not_found(job_id: &str, source_id: &str, target_id: &str) -> JobError {
    JobError::RelationshipNotFound {
        job_id: job_id.to_string(),
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapport_common::SimilarityMethod;

    fn registry() -> (Arc<MemoryJobStore>, DiscoveryJobRegistry) {
        let store = Arc::new(MemoryJobStore::new());
        (store.clone(), DiscoveryJobRegistry::new(store))
    }

    fn result_with(a: &str, b: &str, tier: ConfidenceTier) -> DiscoveryResult {
        let mut relationships = RelationshipBuckets::default();
        relationships.push(PendingRelationship {
            source_id: a.into(),
            target_id: b.into(),
            method: SimilarityMethod::Vector,
            score: 0.4,
            tier,
            review_status: ReviewStatus::Pending,
            shared_tags: vec![],
            llm_assessment: None,
        });
        DiscoveryResult {
            counts: relationships.counts(),
            relationships,
            stats: DiscoveryStats::default(),
        }
    }

    #[tokio::test]
    async fn lifecycle_started_to_completed() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        assert_eq!(job.status, JobStatus::Started);
        assert_eq!(job.progress, 0);

        registry.update_progress(&job.id, 45, "Analyzed 1/10 contacts").await.unwrap();
        let view = registry.job_status(&job.id, "t1").await.unwrap().unwrap();
        assert_eq!(view.progress, 45);
        assert_eq!(view.current_step, "Analyzed 1/10 contacts");
        assert!(view.result.is_none());

        registry
            .complete_job(&job.id, result_with("a", "b", ConfidenceTier::Medium))
            .await
            .unwrap();
        let view = registry.job_status(&job.id, "t1").await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress, 100);
        assert_eq!(view.result.unwrap().counts.total, 1);
    }

    #[tokio::test]
    async fn progress_never_moves_backwards() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        registry.update_progress(&job.id, 60, "later").await.unwrap();
        registry.update_progress(&job.id, 35, "earlier").await.unwrap();
        registry.update_progress(&job.id, 250, "overshoot").await.unwrap();
        let job = registry.get_job_for_user(&job.id, "t1").await.unwrap().unwrap();
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_transitions() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        registry.fail_job(&job.id, "graph unreachable").await.unwrap();

        let err = registry.update_progress(&job.id, 50, "x").await.unwrap_err();
        assert!(matches!(err, JobError::Terminal { status: JobStatus::Failed, .. }));
        let err = registry
            .complete_job(&job.id, DiscoveryResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Terminal { .. }));

        let view = registry.job_status(&job.id, "t1").await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("graph unreachable"));
    }

    #[tokio::test]
    async fn foreign_tenant_sees_nothing() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        assert!(registry.get_job_for_user(&job.id, "t2").await.unwrap().is_none());
        assert!(registry.job_status("missing", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_jobs_are_swept_on_create() {
        let (store, registry) = registry();
        let mut stale = DiscoveryJob::new("old", "t1", Utc::now() - Duration::hours(2));
        stale.status = JobStatus::Completed;
        store.put(&stale).await.unwrap();
        assert!(registry.get_job_for_user("old", "t1").await.unwrap().is_some());

        registry.create_job("t1").await.unwrap();

        assert!(registry.get_job_for_user("old", "t1").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn fresh_jobs_survive_sweep() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        assert_eq!(registry.sweep_expired().await.unwrap(), 0);
        assert!(registry.get_job_for_user(&job.id, "t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_reviewed_and_store_assessment_touch_one_entry() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        registry
            .complete_job(&job.id, result_with("a", "b", ConfidenceTier::Low))
            .await
            .unwrap();

        let updated = registry
            .mark_reviewed(&job.id, "b", "a", ReviewStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(updated.previous, ReviewStatus::Pending);
        assert_eq!(updated.entry.review_status, ReviewStatus::Rejected);

        let err = registry
            .mark_reviewed(&job.id, "a", "zzz", ReviewStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::RelationshipNotFound { .. }));

        let low = registry
            .relationships_for_user(&job.id, "t1", ConfidenceTier::Low)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].review_status, ReviewStatus::Rejected);
    }

    #[tokio::test]
    async fn review_decisions_never_cross() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        registry
            .complete_job(&job.id, result_with("a", "b", ConfidenceTier::Medium))
            .await
            .unwrap();

        registry
            .mark_reviewed(&job.id, "a", "b", ReviewStatus::Approved)
            .await
            .unwrap();
        let again = registry
            .mark_reviewed(&job.id, "a", "b", ReviewStatus::Approved)
            .await
            .unwrap();
        assert_eq!(again.previous, ReviewStatus::Approved);

        let err = registry
            .mark_reviewed(&job.id, "a", "b", ReviewStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::AlreadyReviewed {
                status: ReviewStatus::Approved,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn approving_auto_approved_keeps_provenance() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        let mut result = result_with("a", "b", ConfidenceTier::High);
        result.relationships.high[0].review_status = ReviewStatus::AutoApproved;
        registry.complete_job(&job.id, result).await.unwrap();

        let transition = registry
            .mark_reviewed(&job.id, "a", "b", ReviewStatus::Approved)
            .await
            .unwrap();
        assert_eq!(transition.previous, ReviewStatus::AutoApproved);
        assert_eq!(transition.entry.review_status, ReviewStatus::AutoApproved);
    }

    #[tokio::test]
    async fn reopen_only_undoes_the_expected_state() {
        let (_store, registry) = registry();
        let job = registry.create_job("t1").await.unwrap();
        registry
            .complete_job(&job.id, result_with("a", "b", ConfidenceTier::Low))
            .await
            .unwrap();
        registry
            .mark_reviewed(&job.id, "a", "b", ReviewStatus::Rejected)
            .await
            .unwrap();

        assert!(!registry
            .reopen_review(&job.id, "a", "b", ReviewStatus::Approved)
            .await
            .unwrap());
        assert!(registry
            .reopen_review(&job.id, "a", "b", ReviewStatus::Rejected)
            .await
            .unwrap());
        let low = registry
            .relationships_for_user(&job.id, "t1", ConfidenceTier::Low)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(low[0].review_status, ReviewStatus::Pending);
    }
}

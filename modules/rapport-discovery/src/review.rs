//! Human review of discovered relationships.
//!
//! Review state policy:
//! - `pending` may move to `approved` or `rejected`.
//! - Approving an approved or auto-approved relationship re-issues the
//!   idempotent graph merge, keeps its state and reports no new edges.
//! - Rejecting a rejected relationship is a no-op.
//! - Approved and rejected never cross; that returns
//!   [`ReviewError::AlreadyReviewed`].
//!
//! The decision is claimed on the job before the graph is touched, so of two
//! concurrent approve/reject calls exactly one wins. A failed graph write
//! returns the relationship to `pending`.
//!
//! Relationship data written to the graph always comes from the job, so a
//! caller can identify a relationship by its endpoints alone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rapport_common::{
    ConfidenceTier, DiscoveryJob, JobStatus, LlmAssessment, PendingRelationship, ReviewStatus,
};
use rapport_graph::ContactGraph;

use crate::assess::{AssessmentRequest, RelationshipAssessor};
use crate::error::{AssessmentError, ReviewError};
use crate::jobs::{DiscoveryJobRegistry, JobError};

/// Still-pending relationships of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPage {
    pub relationships: Vec<PendingRelationship>,
    /// Entries of this tier that are no longer pending.
    pub reviewed_count: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOutcome {
    pub edges_created: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub relationship: PendingRelationship,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchApproval {
    pub approved: usize,
    pub failed: usize,
    pub errors: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRejection {
    pub rejected: usize,
    pub failed: usize,
    pub errors: Vec<BatchFailure>,
}

pub struct RelationshipReviewWorkflow {
    graph: Arc<dyn ContactGraph>,
    registry: Arc<DiscoveryJobRegistry>,
    assessor: Option<Arc<dyn RelationshipAssessor>>,
}

impl RelationshipReviewWorkflow {
    pub fn new(graph: Arc<dyn ContactGraph>, registry: Arc<DiscoveryJobRegistry>) -> Self {
        Self {
            graph,
            registry,
            assessor: None,
        }
    }

    pub fn with_assessor(mut self, assessor: Arc<dyn RelationshipAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub async fn pending_relationships(
        &self,
        tenant: &str,
        job_id: &str,
        tier: ConfidenceTier,
    ) -> Result<PendingPage, ReviewError> {
        let entries = self
            .registry
            .relationships_for_user(job_id, tenant, tier)
            .await?
            .ok_or_else(|| ReviewError::NotFound(job_id.to_string()))?;

        let total = entries.len();
        let relationships: Vec<PendingRelationship> = entries
            .into_iter()
            .filter(|r| r.review_status == ReviewStatus::Pending)
            .collect();

        Ok(PendingPage {
            reviewed_count: total - relationships.len(),
            relationships,
            total,
        })
    }

    /// Persist a relationship as an approved SIMILARITY edge.
    pub async fn approve(
        &self,
        tenant: &str,
        relationship: &PendingRelationship,
        job_id: &str,
    ) -> Result<ApproveOutcome, ReviewError> {
        let job = self.reviewable_job(tenant, job_id).await?;
        let entry = job_entry(&job, relationship)?;

        let transition = self
            .registry
            .mark_reviewed(job_id, &entry.source_id, &entry.target_id, ReviewStatus::Approved)
            .await
            .map_err(review_error)?;
        let approved = &transition.entry;

        let summary = match self
            .graph
            .write_similarity_edge(tenant, &approved.to_edge(approved.review_status))
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                if transition.previous == ReviewStatus::Pending {
                    self.reopen(job_id, approved).await;
                }
                return Err(e.into());
            }
        };

        info!(
            tenant,
            job_id,
            source_id = approved.source_id.as_str(),
            target_id = approved.target_id.as_str(),
            status = approved.review_status.as_str(),
            edges_created = summary.relationships_created,
            "Relationship approved"
        );
        Ok(ApproveOutcome {
            edges_created: summary.relationships_created,
        })
    }

    /// Mark a relationship rejected. Never writes to the graph.
    pub async fn reject(
        &self,
        tenant: &str,
        relationship: &PendingRelationship,
        job_id: &str,
    ) -> Result<(), ReviewError> {
        let job = self.reviewable_job(tenant, job_id).await?;
        let entry = job_entry(&job, relationship)?;

        let transition = self
            .registry
            .mark_reviewed(job_id, &entry.source_id, &entry.target_id, ReviewStatus::Rejected)
            .await
            .map_err(review_error)?;

        if transition.previous == ReviewStatus::Pending {
            info!(
                tenant,
                job_id,
                source_id = entry.source_id.as_str(),
                target_id = entry.target_id.as_str(),
                "Relationship rejected"
            );
        }
        Ok(())
    }

    /// Approve each relationship in order. Failures are collected and do not
    /// stop the batch.
    pub async fn batch_approve(
        &self,
        tenant: &str,
        relationships: &[PendingRelationship],
        job_id: &str,
    ) -> BatchApproval {
        let mut outcome = BatchApproval::default();
        for relationship in relationships {
            match self.approve(tenant, relationship, job_id).await {
                Ok(_) => outcome.approved += 1,
                Err(e) => {
                    warn!(
                        tenant,
                        job_id,
                        source_id = relationship.source_id.as_str(),
                        target_id = relationship.target_id.as_str(),
                        error = %e,
                        "Batch approve item failed"
                    );
                    outcome.failed += 1;
                    outcome.errors.push(BatchFailure {
                        relationship: relationship.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    pub async fn batch_reject(
        &self,
        tenant: &str,
        relationships: &[PendingRelationship],
        job_id: &str,
    ) -> BatchRejection {
        let mut outcome = BatchRejection::default();
        for relationship in relationships {
            match self.reject(tenant, relationship, job_id).await {
                Ok(()) => outcome.rejected += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(BatchFailure {
                        relationship: relationship.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// LLM opinion on a relationship, cached on the job after the first call.
    /// Failures leave the relationship untouched.
    pub async fn assess_relationship(
        &self,
        tenant: &str,
        source_id: &str,
        target_id: &str,
        job_id: &str,
    ) -> Result<LlmAssessment, AssessmentError> {
        let job = self
            .registry
            .get_job_for_user(job_id, tenant)
            .await?
            .ok_or_else(|| AssessmentError::NotFound(job_id.to_string()))?;
        let entry = job.relationships.find(source_id, target_id).ok_or_else(|| {
            AssessmentError::RelationshipNotFound {
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
            }
        })?;

        if let Some(cached) = &entry.llm_assessment {
            return Ok(cached.clone());
        }

        let assessor = self.assessor.as_ref().ok_or(AssessmentError::Unavailable)?;

        let source = self
            .graph
            .get_contact(tenant, &entry.source_id)
            .await?
            .ok_or_else(|| AssessmentError::ContactMissing(entry.source_id.clone()))?;
        let target = self
            .graph
            .get_contact(tenant, &entry.target_id)
            .await?
            .ok_or_else(|| AssessmentError::ContactMissing(entry.target_id.clone()))?;

        let request = AssessmentRequest {
            source,
            target,
            relationship: entry.clone(),
        };
        let assessment = assessor.assess(&request).await?;

        self.registry
            .store_assessment(job_id, &entry.source_id, &entry.target_id, &assessment)
            .await?;
        Ok(assessment)
    }

    /// Undo a claimed approval whose graph write failed.
    async fn reopen(&self, job_id: &str, relationship: &PendingRelationship) {
        let reopened = self
            .registry
            .reopen_review(
                job_id,
                &relationship.source_id,
                &relationship.target_id,
                ReviewStatus::Approved,
            )
            .await;
        if let Err(e) = reopened {
            warn!(
                job_id,
                source_id = relationship.source_id.as_str(),
                target_id = relationship.target_id.as_str(),
                error = %e,
                "Could not return relationship to pending after failed approval"
            );
        }
    }

    async fn reviewable_job(&self, tenant: &str, job_id: &str) -> Result<DiscoveryJob, ReviewError> {
        let job = self
            .registry
            .get_job_for_user(job_id, tenant)
            .await?
            .ok_or_else(|| ReviewError::NotFound(job_id.to_string()))?;
        if job.status != JobStatus::Completed {
            return Err(ReviewError::NotReviewable { status: job.status });
        }
        Ok(job)
    }
}

fn job_entry<'a>(
    job: &'a DiscoveryJob,
    relationship: &PendingRelationship,
) -> Result<&'a PendingRelationship, ReviewError> {
    job.relationships
        .find(&relationship.source_id, &relationship.target_id)
        .ok_or_else(|| ReviewError::RelationshipNotFound {
            source_id: relationship.source_id.clone(),
            target_id: relationship.target_id.clone(),
        })
}

fn review_error(e: JobError) -> ReviewError {
    match e {
        JobError::AlreadyReviewed { status, .. } => ReviewError::AlreadyReviewed { status },
        other => ReviewError::Job(other),
    }
}

use rapport_common::{JobStatus, ReviewStatus};
use rapport_graph::GraphError;
use thiserror::Error;

use crate::jobs::JobError;

/// Discovery aborts only when contacts cannot reach the graph at all. Every
/// other failure is absorbed per contact or per phase.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Contact sync failed: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Discovery job not found: {0}")]
    NotFound(String),

    #[error("Relationship {source_id} <-> {target_id} is not part of this job")]
    RelationshipNotFound { source_id: String, target_id: String },

    #[error("Relationship was already {status}")]
    AlreadyReviewed { status: ReviewStatus },

    #[error("Job is {status}, relationships are not reviewable yet")]
    NotReviewable { status: JobStatus },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Job(#[from] JobError),
}

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Discovery job not found: {0}")]
    NotFound(String),

    #[error("Relationship {source_id} <-> {target_id} is not part of this job")]
    RelationshipNotFound { source_id: String, target_id: String },

    #[error("Contact not found in graph: {0}")]
    ContactMissing(String),

    #[error("No relationship assessor configured")]
    Unavailable,

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Malformed assessment response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Job(#[from] JobError),
}

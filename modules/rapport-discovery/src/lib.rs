pub mod assess;
pub mod classify;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod pg_store;
pub mod review;
pub mod runner;
pub mod vector;

#[cfg(feature = "test-support")]
pub mod testing;

pub use assess::{AssessmentRequest, ClaudeAssessor, RelationshipAssessor};
pub use classify::{classify_score, classify_shared_tags};
pub use engine::{DiscoveryConfig, DiscoveryResult, NoopProgress, ProgressSink, RelationshipDiscoveryEngine};
pub use error::{AssessmentError, DiscoveryError, ReviewError};
pub use jobs::{
    DiscoveryJobRegistry, JobError, JobStatusView, JobStore, MemoryJobStore, ReviewTransition,
};
pub use pg_store::PgJobStore;
pub use review::{ApproveOutcome, BatchApproval, BatchFailure, BatchRejection, PendingPage, RelationshipReviewWorkflow};
pub use runner::{DiscoveryRunner, DiscoverySubmission};
pub use vector::{PineconeIndex, VectorIndex, VectorMatch};

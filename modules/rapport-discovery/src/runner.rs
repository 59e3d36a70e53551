use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rapport_common::{Contact, JobStatus};

use crate::engine::{ProgressSink, RelationshipDiscoveryEngine};
use crate::jobs::{DiscoveryJobRegistry, JobError};

/// Forwards engine progress into a tracked job.
struct JobProgress<'a> {
    registry: &'a DiscoveryJobRegistry,
    job_id: &'a str,
}

#[async_trait]
impl<'a> ProgressSink for JobProgress<'a> {
    async fn report(&self, percent: u8, step: &str) {
        if let Err(e) = self.registry.update_progress(self.job_id, percent, step).await {
            warn!(job_id = self.job_id, error = %e, "Failed to record job progress");
        }
    }
}

/// A submitted discovery run. Poll the registry with `job_id`, or await
/// `handle` for the terminal status.
pub struct DiscoverySubmission {
    pub job_id: String,
    pub handle: JoinHandle<JobStatus>,
}

/// Runs discovery jobs on background tasks.
#[derive(Clone)]
pub struct DiscoveryRunner {
    engine: Arc<RelationshipDiscoveryEngine>,
    registry: Arc<DiscoveryJobRegistry>,
}

impl DiscoveryRunner {
    pub fn new(engine: Arc<RelationshipDiscoveryEngine>, registry: Arc<DiscoveryJobRegistry>) -> Self {
        Self { engine, registry }
    }

    pub fn registry(&self) -> &Arc<DiscoveryJobRegistry> {
        &self.registry
    }

    /// Create a job and start the pipeline without waiting for it.
    pub async fn submit(&self, tenant: &str, contacts: Vec<Contact>) -> Result<DiscoverySubmission, JobError> {
        let job = self.registry.create_job(tenant).await?;
        let job_id = job.id.clone();

        let runner = self.clone();
        let tenant = tenant.to_string();
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(async move { runner.run(&task_job_id, &tenant, &contacts).await });

        Ok(DiscoverySubmission { job_id, handle })
    }

    /// Drive an existing job to a terminal state.
    pub async fn run(&self, job_id: &str, tenant: &str, contacts: &[Contact]) -> JobStatus {
        let progress = JobProgress {
            registry: &self.registry,
            job_id,
        };

        let outcome = match self.engine.discover_all(tenant, contacts, &progress).await {
            Ok(result) => self.registry.complete_job(job_id, result).await.map(|_| JobStatus::Completed),
            Err(e) => {
                error!(job_id, tenant, error = %e, "Discovery run failed");
                self.registry
                    .fail_job(job_id, &e.to_string())
                    .await
                    .map(|_| JobStatus::Failed)
            }
        };

        match outcome {
            Ok(status) => {
                info!(job_id, tenant, %status, "Discovery job finished");
                status
            }
            Err(e) => {
                // The job may have been swept or the store is down; the run
                // itself is over either way.
                error!(job_id, error = %e, "Failed to record job outcome");
                JobStatus::Failed
            }
        }
    }
}

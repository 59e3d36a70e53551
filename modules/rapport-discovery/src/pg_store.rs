use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use rapport_common::DiscoveryJob;

use crate::jobs::{JobError, JobMutation, JobStore};

/// Postgres-backed job store. Jobs are kept whole as JSONB; updates lock the
/// row so concurrent reviewers of one job never lose each other's writes.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), JobError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS discovery_jobs (
                 id          TEXT         PRIMARY KEY,
                 tenant_id   TEXT         NOT NULL,
                 created_at  TIMESTAMPTZ  NOT NULL,
                 job         JSONB        NOT NULL
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS discovery_jobs_created_at_idx ON discovery_jobs (created_at)")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(())
    }
}

fn store_error(e: sqlx::Error) -> JobError {
    JobError::Store(e.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<DiscoveryJob>, JobError> {
        let row = sqlx::query_as::<_, (Json<DiscoveryJob>,)>("SELECT job FROM discovery_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(|(Json(job),)| job))
    }

    async fn put(&self, job: &DiscoveryJob) -> Result<(), JobError> {
        sqlx::query(
            "INSERT INTO discovery_jobs (id, tenant_id, created_at, job)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET job = EXCLUDED.job",
        )
        .bind(&job.id)
        .bind(&job.tenant_id)
        .bind(job.created_at)
        .bind(Json(job))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn update(&self, job_id: &str, mutate: JobMutation<'_>) -> Result<DiscoveryJob, JobError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let row = sqlx::query_as::<_, (Json<DiscoveryJob>,)>(
            "SELECT job FROM discovery_jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;
        let Some((Json(mut job),)) = row else {
            return Err(JobError::NotFound(job_id.to_string()));
        };

        // Dropping `tx` on error rolls back and releases the row lock.
        mutate(&mut job)?;

        sqlx::query("UPDATE discovery_jobs SET job = $2 WHERE id = $1")
            .bind(job_id)
            .bind(Json(&job))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;

        Ok(job)
    }

    async fn delete(&self, job_id: &str) -> Result<bool, JobError> {
        let result = sqlx::query("DELETE FROM discovery_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError> {
        let result = sqlx::query("DELETE FROM discovery_jobs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() as usize)
    }
}

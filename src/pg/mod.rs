//! Postgres-backed job queue and outcome log.

mod schema;
mod storage;

pub use self::schema::{BackgroundJob, CloneOutcomeRow};

use crate::errors::StorageError;
use crate::models::{CloneJob, JobId, QueuedJob};
use crate::outcome::{OutcomeLog, OutcomeQuery, OutcomeRecord};
use crate::queue::{JobQueue, PendingFilter};
use sqlx::PgPool;
use std::time::Duration;
use tracing::instrument;

/// Create the queue and outcome tables if they do not exist.
pub async fn setup_database(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Clone jobs stored in the `background_jobs` table.
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers, in any
/// number of processes, can share one table.
#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    /// Create a queue over `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl JobQueue for PgJobQueue {
    #[instrument(name = "cloner.enqueue", skip_all, fields(course.id = %job.course_id))]
    async fn enqueue(&self, job: &CloneJob) -> Result<JobId, StorageError> {
        let data = serde_json::to_value(job)?;
        let id = storage::insert_job(&self.pool, CloneJob::JOB_TYPE, data).await?;
        Ok(JobId(id))
    }

    async fn list_pending(&self, filter: &PendingFilter) -> Result<Vec<QueuedJob>, StorageError> {
        storage::find_pending_jobs(
            &self.pool,
            CloneJob::JOB_TYPE,
            filter.destination_category_id.map(|id| id.0),
            filter.batch_id.as_ref().map(|id| id.as_str()),
        )
        .await?
        .into_iter()
        .map(QueuedJob::try_from)
        .collect()
    }

    async fn claim_next(&self, lease: Duration) -> Result<Option<QueuedJob>, StorageError> {
        storage::claim_next_job(&self.pool, CloneJob::JOB_TYPE, lease.as_secs_f64())
            .await?
            .map(QueuedJob::try_from)
            .transpose()
    }

    async fn complete(&self, id: JobId) -> Result<(), StorageError> {
        storage::delete_job(&self.pool, id.0).await?;
        Ok(())
    }
}

/// Outcome records stored in the insert-only `clone_outcomes` table.
#[derive(Debug, Clone)]
pub struct PgOutcomeLog {
    pool: PgPool,
}

impl PgOutcomeLog {
    /// Create a log over `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OutcomeLog for PgOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<(), StorageError> {
        let payload = serde_json::to_value(record)?;
        storage::insert_outcome(&self.pool, record.timestamp, record.success, payload).await?;
        Ok(())
    }

    async fn query(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeRecord>, StorageError> {
        let limit = query.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
        storage::find_outcomes(
            &self.pool,
            query.batch_id.as_ref().map(|id| id.as_str()),
            query.since,
            query.until,
            limit,
        )
        .await?
        .into_iter()
        .map(OutcomeRecord::try_from)
        .collect()
    }
}

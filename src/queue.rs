use crate::errors::{CloneError, StorageError};
use crate::models::{BatchId, Category, CategoryId, CloneBatch, CloneJob, JobId, QueuedJob};
use crate::store::CourseStore;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Selects pending jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingFilter {
    /// Only jobs whose serialized payload contains this batch id.
    pub batch_id: Option<BatchId>,
    /// Only jobs targeting this destination category.
    pub destination_category_id: Option<CategoryId>,
}

impl PendingFilter {
    /// Jobs of one batch.
    pub fn batch(batch_id: BatchId) -> Self {
        Self {
            batch_id: Some(batch_id),
            ..Self::default()
        }
    }

    /// Jobs cloning into one destination category.
    pub fn destination(category_id: CategoryId) -> Self {
        Self {
            destination_category_id: Some(category_id),
            ..Self::default()
        }
    }

    /// Whether `job` passes this filter.
    pub fn matches(&self, job: &CloneJob) -> bool {
        if self
            .destination_category_id
            .is_some_and(|id| id != job.destination_category_id)
        {
            return false;
        }
        match &self.batch_id {
            Some(batch_id) => payload_contains(job, batch_id.as_str()),
            None => true,
        }
    }
}

/// Free-text containment on the serialized payload, the way the durable
/// backends filter.
pub(crate) fn payload_contains(payload: &impl Serialize, needle: &str) -> bool {
    serde_json::to_string(payload).is_ok_and(|text| text.contains(needle))
}

/// A durable, at-least-once queue of clone jobs.
///
/// Duplicate payloads are always accepted; idempotence is the executor's job.
pub trait JobQueue: Clone + Send + Sync + 'static {
    /// Store a job for asynchronous execution.
    fn enqueue(&self, job: &CloneJob) -> impl Future<Output = Result<JobId, StorageError>> + Send;

    /// Jobs still in the queue, oldest first.
    fn list_pending(
        &self,
        filter: &PendingFilter,
    ) -> impl Future<Output = Result<Vec<QueuedJob>, StorageError>> + Send;

    /// Claim the oldest job that is either unstarted or was started longer
    /// than `lease` ago, stamping its `started_at`.
    fn claim_next(
        &self,
        lease: Duration,
    ) -> impl Future<Output = Result<Option<QueuedJob>, StorageError>> + Send;

    /// Remove a job whose execution returned.
    fn complete(&self, id: JobId) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Expands a category-level clone into one queued job per course.
#[derive(Debug, Clone)]
pub struct CloneJobQueue<S, Q> {
    store: S,
    queue: Q,
}

impl<S: CourseStore, Q: JobQueue> CloneJobQueue<S, Q> {
    /// Create a batch queue reading courses from `store`.
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Enqueue a job for every immediate course of the source category.
    ///
    /// An empty source category queues nothing. Submission does not wait for
    /// or order the executions.
    #[instrument(
        name = "cloner.submit_batch",
        skip_all,
        fields(batch.id = %batch.id, source.id = %source.id, destination.id = %destination.id)
    )]
    pub async fn submit_batch(
        &self,
        source: &Category,
        destination: &Category,
        batch: &CloneBatch,
    ) -> Result<Vec<JobId>, CloneError> {
        let courses = self
            .store
            .list_courses(source.id, false)
            .await
            .map_err(CloneError::Store)?;

        if courses.is_empty() {
            debug!("Source category has no courses, nothing to queue");
            return Ok(Vec::new());
        }

        let mut job_ids = Vec::with_capacity(courses.len());
        for course in &courses {
            let job = batch.job_for(course.id);
            let job_id = self.queue.enqueue(&job).await?;
            debug!(course.id = %course.id, job.id = %job_id, "Queued clone job");
            job_ids.push(job_id);
        }

        info!(jobs = job_ids.len(), "Queued clone batch");
        Ok(job_ids)
    }

    /// The underlying job queue.
    pub fn queue(&self) -> &Q {
        &self.queue
    }
}

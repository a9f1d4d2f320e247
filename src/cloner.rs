use crate::errors::{CloneError, ValidationErrors};
use crate::models::{BatchId, Category, CategoryId, CloneBatch, JobId, NewChildCategory};
use crate::preparer::CategoryPreparer;
use crate::queue::{CloneJobQueue, JobQueue};
use crate::store::CourseStore;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

/// What an administrator asks for: clone every course of `source` into
/// `destination`, optionally inside a new sub-category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    /// The category whose courses are cloned.
    pub source: CategoryId,
    /// [`CategoryId::TOP`] is only allowed together with `new_child`.
    pub destination: CategoryId,
    /// Sub-category to create (or reuse) under `destination`.
    pub new_child: Option<NewChildCategory>,
    /// Start date given to every clone.
    pub start_date: DateTime<Utc>,
    /// End date given to every clone.
    pub end_date: DateTime<Utc>,
}

impl CloneRequest {
    /// Check the request on its own, without looking anything up.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.destination.is_top() && self.new_child.is_none() {
            errors.push(
                "destination",
                "Destination cannot be Top when not adding a new category",
            );
        }

        if self.end_date <= self.start_date {
            errors.push("end_date", "The end date must occur after the start date");
        }

        if let Some(child) = &self.new_child {
            if child.name.trim().is_empty() {
                errors.push("new_child.name", "A new category needs a name");
            }
            if child.tag.trim().is_empty() {
                errors.push("new_child.tag", "A new category needs an idnumber");
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// A queued clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedClone {
    /// The batch every job belongs to.
    pub batch: CloneBatch,
    /// The resolved source category.
    pub source: Category,
    /// The category the clones land in.
    pub destination: Category,
    /// One job per source course, all tagged with `batch.id`.
    pub jobs: Vec<JobId>,
}

/// Caller-facing entry point: prepares the categories, then queues the jobs.
#[derive(Debug, Clone)]
pub struct Cloner<S, Q> {
    preparer: CategoryPreparer<S>,
    jobs: CloneJobQueue<S, Q>,
}

impl<S: CourseStore, Q: JobQueue> Cloner<S, Q> {
    /// Create a cloner over `store`, queueing into `queue`.
    pub fn new(store: S, queue: Q) -> Self {
        Self {
            preparer: CategoryPreparer::new(store.clone()),
            jobs: CloneJobQueue::new(store, queue),
        }
    }

    /// Validate, prepare and queue a clone under a freshly generated batch id.
    ///
    /// Any error here aborts the whole submission before a job is queued.
    #[instrument(
        name = "cloner.submit_clone",
        skip_all,
        fields(source.id = %request.source, destination.id = %request.destination)
    )]
    pub async fn submit_clone(&self, request: &CloneRequest) -> Result<SubmittedClone, CloneError> {
        request.validate().map_err(CloneError::InvalidRequest)?;

        let (source, destination) = self
            .preparer
            .prepare(request.source, request.destination, request.new_child.as_ref())
            .await?;

        let batch = CloneBatch {
            id: BatchId::generate(),
            source_category_id: source.id,
            destination_category_id: destination.id,
            start_date: request.start_date,
            end_date: request.end_date,
        };

        let jobs = self.jobs.submit_batch(&source, &destination, &batch).await?;
        info!(batch.id = %batch.id, jobs = jobs.len(), "Clone submitted");

        Ok(SubmittedClone {
            batch,
            source,
            destination,
            jobs,
        })
    }
}

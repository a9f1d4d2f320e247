use crate::errors::CloneError;
use crate::models::{Category, CategoryId, Course, QueuedJob};
use crate::naming::derive_short_identifier;
use crate::queue::{JobQueue, PendingFilter};
use crate::store::CourseStore;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::instrument;

/// Live clone state of one source course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneState {
    /// The destination course exists. Wins over whatever the queue says.
    Succeeded,
    /// A job is queued but no worker has picked it up.
    NotStarted {
        /// When the job was enqueued.
        submitted_at: DateTime<Utc>,
    },
    /// A worker is executing the job.
    Running {
        /// When the worker claimed the job.
        started_at: DateTime<Utc>,
        /// Time spent running so far.
        elapsed: TimeDelta,
    },
    /// Neither a destination course nor a pending job. Either never
    /// submitted, or finished without creating a course; the outcome log
    /// tells which.
    Unknown,
}

/// One row of the per-category status view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCloneStatus {
    /// The source course.
    pub source: Course,
    /// Short identifier the clone has (or will have).
    pub destination_short_identifier: String,
    /// The clone, once it exists.
    pub destination: Option<Course>,
    /// Where the clone stands.
    pub state: CloneState,
}

/// Works out, at display time, where each course of a clone stands.
///
/// Reads the queue and the destination category independently; it never
/// talks to executing workers.
#[derive(Debug, Clone)]
pub struct StatusReconciler<S, Q> {
    store: S,
    queue: Q,
}

impl<S: CourseStore, Q: JobQueue> StatusReconciler<S, Q> {
    /// Create a reconciler over `store` and `queue`.
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Status of every immediate course of `source_id` cloned into `destination_id`.
    #[instrument(name = "cloner.category_status", skip(self))]
    pub async fn category_status(
        &self,
        source_id: CategoryId,
        destination_id: CategoryId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CourseCloneStatus>, CloneError> {
        let destination = self
            .store
            .get_category(destination_id)
            .await
            .map_err(CloneError::Store)?
            .ok_or(CloneError::CategoryNotFound(destination_id))?;

        let pending = self
            .queue
            .list_pending(&PendingFilter::destination(destination_id))
            .await?;

        let mut courses = self
            .store
            .list_courses(source_id, false)
            .await
            .map_err(CloneError::Store)?;
        courses.sort_by_key(|course| course.id);

        let mut statuses = Vec::with_capacity(courses.len());
        for course in courses {
            statuses.push(self.course_status(course, &destination, &pending, now).await?);
        }
        Ok(statuses)
    }

    /// Status of one source course.
    ///
    /// `pending` are the queued jobs targeting `destination`.
    pub async fn course_status(
        &self,
        source: Course,
        destination: &Category,
        pending: &[QueuedJob],
        now: DateTime<Utc>,
    ) -> Result<CourseCloneStatus, CloneError> {
        let destination_short_identifier =
            derive_short_identifier(&source.short_identifier, &destination.tag);

        let existing = self
            .store
            .find_course(&destination_short_identifier, destination.id)
            .await
            .map_err(CloneError::Store)?;

        let state = if existing.is_some() {
            CloneState::Succeeded
        } else {
            pending_state(&source, destination, pending, now)
        };

        Ok(CourseCloneStatus {
            source,
            destination_short_identifier,
            destination: existing,
            state,
        })
    }
}

fn pending_state(
    source: &Course,
    destination: &Category,
    pending: &[QueuedJob],
    now: DateTime<Utc>,
) -> CloneState {
    let job = pending.iter().rfind(|queued| {
        queued.job.course_id == source.id && queued.job.destination_category_id == destination.id
    });

    match job {
        None => CloneState::Unknown,
        Some(QueuedJob {
            started_at: Some(started_at),
            ..
        }) => CloneState::Running {
            started_at: *started_at,
            elapsed: now - *started_at,
        },
        Some(queued) => CloneState::NotStarted {
            submitted_at: queued.submitted_at,
        },
    }
}

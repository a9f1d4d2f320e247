//! Immutable records of how each clone job ended.

use crate::errors::StorageError;
use crate::models::{BatchId, CategoryId, CloneJob, Course, CourseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Terminal result of one clone job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    /// A new course was created and post-processed.
    Succeeded {
        /// The course that was copied.
        source: Course,
        /// The new course, after post-processing.
        clone: Course,
    },
    /// The target course already existed; nothing was created.
    SkippedDuplicate {
        /// Short identifier of the existing course.
        short_identifier: String,
    },
    /// Anything else went wrong.
    Failed {
        /// Why the clone failed.
        reason: String,
    },
}

impl CloneOutcome {
    /// Whether a new course was created.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Log line describing this outcome for course `course_id`.
    pub fn message(&self, course_id: CourseId) -> String {
        match self {
            Self::Succeeded { source, clone } => format!(
                "Cloned {}/{} into {}/{};",
                source.id, source.short_identifier, clone.id, clone.short_identifier
            ),
            Self::SkippedDuplicate { short_identifier } => failure_message(
                course_id,
                &format!(
                    "Course with shortname {short_identifier} already exists in the category. Skipped."
                ),
            ),
            Self::Failed { reason } => failure_message(course_id, reason),
        }
    }
}

fn failure_message(course_id: CourseId, reason: &str) -> String {
    format!("Cloning of course {course_id} failed with message {reason}")
}

/// Append-only log entry. This is the system of record for "did this clone happen".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// When the job finished.
    pub timestamp: DateTime<Utc>,
    /// The submission the job belonged to.
    pub batch_id: BatchId,
    /// Category the course was cloned from.
    pub source_category_id: CategoryId,
    /// Category the clone was created in.
    pub destination_category_id: CategoryId,
    /// The source course.
    pub course_id: CourseId,
    /// Human-readable description of the outcome.
    pub message: String,
    /// Whether a new course was created.
    pub success: bool,
}

impl OutcomeRecord {
    /// Build the record for `job` ending with `outcome`.
    pub fn new(job: &CloneJob, outcome: &CloneOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            batch_id: job.batch_id.clone(),
            source_category_id: job.source_category_id,
            destination_category_id: job.destination_category_id,
            course_id: job.course_id,
            message: outcome.message(job.course_id),
            success: outcome.is_success(),
        }
    }
}

/// Selects outcome records. Results come back newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeQuery {
    /// Only records whose serialized payload contains this batch id.
    pub batch_id: Option<BatchId>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    /// Return at most this many records.
    pub limit: Option<usize>,
}

impl OutcomeQuery {
    /// Records of one batch.
    pub fn batch(batch_id: BatchId) -> Self {
        Self {
            batch_id: Some(batch_id),
            ..Self::default()
        }
    }

    /// Records from the last `window` up to `now`.
    pub fn within(window: chrono::Duration, now: DateTime<Utc>) -> Self {
        Self {
            since: Some(now - window),
            until: Some(now),
            ..Self::default()
        }
    }

    /// Return at most `limit` records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, record: &OutcomeRecord) -> bool {
        if self.since.is_some_and(|since| record.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.timestamp > until) {
            return false;
        }
        match &self.batch_id {
            Some(batch_id) => crate::queue::payload_contains(record, batch_id.as_str()),
            None => true,
        }
    }
}

/// Append-only sink for outcome records.
pub trait OutcomeLog: Clone + Send + Sync + 'static {
    /// Insert a record. Records are never updated or deleted.
    fn append(
        &self,
        record: &OutcomeRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Records matching `query`, newest first.
    fn query(
        &self,
        query: &OutcomeQuery,
    ) -> impl Future<Output = Result<Vec<OutcomeRecord>, StorageError>> + Send;
}

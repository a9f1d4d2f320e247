//! Data model shared by every component.
//!
//! Categories and courses are owned by the external course-management
//! system; this crate only reads them and asks for new ones to be created.
//! Clone batches are never persisted on their own, they only exist as the
//! [`BatchId`] stamped onto jobs and outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a course category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl CategoryId {
    /// The "top level" sentinel. It is not a real category row.
    pub const TOP: CategoryId = CategoryId(0);

    /// Whether this is the top level sentinel.
    pub fn is_top(self) -> bool {
        self == Self::TOP
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub i64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier the job queue assigns to an enqueued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque tag correlating the jobs and outcome records of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    /// Generate a fresh, unique batch id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing batch id. Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// The batch id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BatchId {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("batch id must not be empty")
    }
}

impl From<BatchId> for String {
    fn from(value: BatchId) -> Self {
        value.0
    }
}

/// A course category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// The category's `idnumber`, used to build derived course short identifiers.
    pub tag: String,
    /// Enclosing category, [`CategoryId::TOP`] at the top level.
    pub parent_id: CategoryId,
}

impl Category {
    /// The synthetic top level category.
    pub fn top() -> Self {
        Self {
            id: CategoryId::TOP,
            name: "Top".to_string(),
            tag: String::new(),
            parent_id: CategoryId::TOP,
        }
    }
}

/// Data required to create a new [`Category`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    /// Display name.
    pub name: String,
    /// Unique `idnumber`.
    pub tag: String,
    /// Category to create it under.
    pub parent_id: CategoryId,
}

/// A sub-category the caller wants created (or reused) under the destination.
///
/// Name and tag always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChildCategory {
    /// Display name.
    pub name: String,
    /// Unique `idnumber` of the new category.
    pub tag: String,
}

impl NewChildCategory {
    /// Create a child category description; values are trimmed when used.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Copy with surrounding whitespace removed from both fields.
    pub fn trimmed(&self) -> Self {
        Self::new(self.name.trim(), self.tag.trim())
    }
}

/// A course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier.
    pub id: CourseId,
    /// Unique short name.
    pub short_identifier: String,
    /// Display name.
    pub full_name: String,
    /// Category holding the course.
    pub category_id: CategoryId,
    /// First day of the course.
    pub start_date: DateTime<Utc>,
    /// Last day of the course.
    pub end_date: DateTime<Utc>,
}

/// Fields overwritten on a freshly duplicated course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseUpdate {
    /// New display name.
    pub full_name: String,
    /// New first day.
    pub start_date: DateTime<Utc>,
    /// New last day.
    pub end_date: DateTime<Utc>,
}

/// Which sub-resources the duplication collaborator copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateOptions {
    /// Copy activities and resources.
    pub activities: bool,
    /// Copy blocks.
    pub blocks: bool,
    /// Copy filters.
    pub filters: bool,
    /// Copy enrolled users.
    pub users: bool,
    /// Copy role assignments.
    pub role_assignments: bool,
    /// Copy comments.
    pub comments: bool,
    /// Copy user completion data.
    pub user_completion: bool,
    /// Copy logs.
    pub logs: bool,
    /// Copy grade histories.
    pub grade_histories: bool,
}

impl DuplicateOptions {
    /// Course content only: activities, blocks and filters, no user data.
    pub const CONTENT_ONLY: DuplicateOptions = DuplicateOptions {
        activities: true,
        blocks: true,
        filters: true,
        users: false,
        role_assignments: false,
        comments: false,
        user_completion: false,
        logs: false,
        grade_histories: false,
    };
}

/// A request to the duplication collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRequest {
    /// Course to copy.
    pub course_id: CourseId,
    /// Display name of the copy.
    pub full_name: String,
    /// Short name of the copy.
    pub short_identifier: String,
    /// Category the copy is created in.
    pub category_id: CategoryId,
    /// What to copy.
    pub options: DuplicateOptions,
}

/// One user submission. Never stored as a row of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneBatch {
    /// Correlation id shared by every job.
    pub id: BatchId,
    /// Category the courses are cloned from.
    pub source_category_id: CategoryId,
    /// Category the clones are created in.
    pub destination_category_id: CategoryId,
    /// Start date given to every clone.
    pub start_date: DateTime<Utc>,
    /// End date given to every clone.
    pub end_date: DateTime<Utc>,
}

impl CloneBatch {
    /// The job cloning `course_id` as part of this batch.
    pub fn job_for(&self, course_id: CourseId) -> CloneJob {
        CloneJob {
            course_id,
            source_category_id: self.source_category_id,
            destination_category_id: self.destination_category_id,
            batch_id: self.id.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// Payload of one per-course clone job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneJob {
    /// The source course.
    pub course_id: CourseId,
    /// Category the course is cloned from.
    pub source_category_id: CategoryId,
    /// Category the clone is created in.
    pub destination_category_id: CategoryId,
    /// The submission this job belongs to.
    pub batch_id: BatchId,
    /// Start date given to the clone.
    pub start_date: DateTime<Utc>,
    /// End date given to the clone.
    pub end_date: DateTime<Utc>,
}

impl CloneJob {
    /// Job type under which clone jobs are stored in the queue.
    pub const JOB_TYPE: &'static str = "clone_course";
}

/// A [`CloneJob`] as held by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// The payload.
    pub job: CloneJob,
    /// When the job was enqueued.
    pub submitted_at: DateTime<Utc>,
    /// Set once, when a worker claims the job.
    pub started_at: Option<DateTime<Utc>>,
}

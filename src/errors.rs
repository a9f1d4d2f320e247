use crate::models::{CategoryId, CourseId};

/// Errors that abort a clone submission before any job is queued.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// The request failed validation.
    #[error("invalid clone request: {0}")]
    InvalidRequest(ValidationErrors),

    /// A category does not exist.
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    /// A course does not exist.
    #[error("course {0} not found")]
    CourseNotFound(CourseId),

    /// A category involved in the clone has no tag to derive short identifiers from.
    #[error("category {0} has no idnumber")]
    MissingTag(CategoryId),

    /// The requested sub-category tag is already held by a category under another parent.
    #[error(
        "category idnumber {tag:?} is already used by category {existing} under parent {existing_parent}, not {requested_parent}"
    )]
    TagConflict {
        /// The requested tag.
        tag: String,
        /// The category already holding it.
        existing: CategoryId,
        /// Parent of that category.
        existing_parent: CategoryId,
        /// Parent the caller asked for.
        requested_parent: CategoryId,
    },

    /// The category/course store failed.
    #[error("course store error: {0:#}")]
    Store(anyhow::Error),

    /// The job queue failed while enqueueing.
    #[error(transparent)]
    Queue(#[from] StorageError),
}

/// Errors from the job queue and outcome log backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to serialize or deserialize a payload.
    #[error("failed to (de)serialize payload: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database error.
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Field-keyed validation failures of a clone request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<(&'static str, &'static str)>);

impl ValidationErrors {
    pub(crate) fn push(&mut self, field: &'static str, message: &'static str) {
        self.0.push((field, message));
    }

    /// Whether no rule was violated.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The message recorded for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.iter().find(|(f, _)| *f == field).map(|(_, m)| *m)
    }

    /// All `(field, message)` pairs in the order they were found.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.0.iter().copied()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

//! Database rows backing the Postgres queue and outcome log.

use crate::errors::StorageError;
use crate::models::{JobId, QueuedJob};
use crate::outcome::OutcomeRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

/// Represents a queued job record in the database
#[derive(Debug, Clone, FromRow)]
pub struct BackgroundJob {
    /// Unique identifier for the job
    pub id: i64,
    /// Type identifier for the job
    pub job_type: String,
    /// JSON data containing the job payload
    pub data: Value,
    /// Timestamp when the job was enqueued
    pub created_at: DateTime<Utc>,
    /// Timestamp when a worker claimed the job
    pub started_at: Option<DateTime<Utc>>,
}

impl TryFrom<BackgroundJob> for QueuedJob {
    type Error = StorageError;

    fn try_from(row: BackgroundJob) -> Result<Self, Self::Error> {
        Ok(QueuedJob {
            id: JobId(row.id),
            job: serde_json::from_value(row.data)?,
            submitted_at: row.created_at,
            started_at: row.started_at,
        })
    }
}

/// Represents a clone outcome record in the database
#[derive(Debug, Clone, FromRow)]
pub struct CloneOutcomeRow {
    /// Insertion order
    pub id: i64,
    /// When the outcome was recorded
    pub created_at: DateTime<Utc>,
    /// Whether a course was created
    pub success: bool,
    /// The serialized [`OutcomeRecord`]
    pub payload: Value,
}

impl TryFrom<CloneOutcomeRow> for OutcomeRecord {
    type Error = StorageError;

    fn try_from(row: CloneOutcomeRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(row.payload)?)
    }
}

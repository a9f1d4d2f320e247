#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cloner;
mod errors;
mod executor;
/// In-process store, queue and outcome log.
pub mod memory;
/// Data model shared by every component.
pub mod models;
mod naming;
/// Immutable outcome records and the log they are appended to.
pub mod outcome;
/// Postgres-backed queue and outcome log.
pub mod pg;
mod preparer;
mod queue;
mod runner;
mod status;
mod store;
mod worker;

/// Caller-facing submission of a category clone.
pub use self::cloner::{CloneRequest, Cloner, SubmittedClone};
/// Error types.
pub use self::errors::{CloneError, StorageError, ValidationErrors};
/// The per-job unit of work.
pub use self::executor::{CloneExecutor, DEFAULT_EXECUTION_BUDGET};
/// Short identifier and full name derivation.
pub use self::naming::{derive_full_name, derive_short_identifier};
/// Destination category resolution.
pub use self::preparer::CategoryPreparer;
/// The durable job queue seam and batch expansion.
pub use self::queue::{CloneJobQueue, JobQueue, PendingFilter};
/// The worker pool executing queued clone jobs.
pub use self::runner::{RunHandle, Runner};
/// Display-time status of cloned courses.
pub use self::status::{CloneState, CourseCloneStatus, StatusReconciler};
/// The external category/course store seam.
pub use self::store::{CourseStore, DuplicateError};

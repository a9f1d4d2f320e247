use crate::errors::CloneError;
use crate::models::{
    Category, CategoryId, CloneJob, CourseUpdate, DuplicateOptions, DuplicateRequest,
};
use crate::naming::{derive_full_name, derive_short_identifier};
use crate::outcome::{CloneOutcome, OutcomeLog, OutcomeRecord};
use crate::store::{CourseStore, DuplicateError};
use chrono::Utc;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on a single clone before it is recorded as failed.
pub const DEFAULT_EXECUTION_BUDGET: Duration = Duration::from_secs(600);

/// Performs one clone job and records its outcome.
#[derive(Debug, Clone)]
pub struct CloneExecutor<S, L> {
    store: S,
    log: L,
    execution_budget: Duration,
    lease_margin: Option<Duration>,
}

impl<S: CourseStore, L: OutcomeLog> CloneExecutor<S, L> {
    /// Create an executor with the default execution budget.
    pub fn new(store: S, log: L) -> Self {
        Self {
            store,
            log,
            execution_budget: DEFAULT_EXECUTION_BUDGET,
            lease_margin: None,
        }
    }

    /// Set how long one clone may take before it is abandoned as failed.
    pub fn execution_budget(mut self, budget: Duration) -> Self {
        self.execution_budget = budget;
        self
    }

    /// Set how much longer than the execution budget a claimed job stays
    /// leased. Defaults to half the budget.
    pub fn lease_margin(mut self, margin: Duration) -> Self {
        self.lease_margin = Some(margin);
        self
    }

    /// How long one clone may take.
    pub fn budget(&self) -> Duration {
        self.execution_budget
    }

    /// How long a claimed job is held before another worker may claim it.
    ///
    /// The lease starts when the job is stamped, before the budget starts
    /// counting, and must also cover recording the outcome, so the margin
    /// should never be zero.
    pub fn lease(&self) -> Duration {
        let margin = self.lease_margin.unwrap_or(self.execution_budget / 2);
        self.execution_budget.saturating_add(margin)
    }

    /// Execute `job`. Never fails: every error, panic or timeout becomes a
    /// [`CloneOutcome::Failed`], and every outcome is appended to the log
    /// before returning.
    #[instrument(
        name = "cloner.execute",
        skip_all,
        fields(batch.id = %job.batch_id, course.id = %job.course_id)
    )]
    pub async fn run(&self, job: &CloneJob) -> CloneOutcome {
        let attempt = AssertUnwindSafe(self.clone_course(job)).catch_unwind();

        let outcome = match tokio::time::timeout(self.execution_budget, attempt).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(error))) => CloneOutcome::Failed {
                reason: format!("{error:#}"),
            },
            Ok(Err(panic)) => CloneOutcome::Failed {
                reason: panic_message(&*panic),
            },
            Err(_) => CloneOutcome::Failed {
                reason: format!("clone did not finish within {:?}", self.execution_budget),
            },
        };

        let record = OutcomeRecord::new(job, &outcome, Utc::now());
        match &outcome {
            CloneOutcome::Failed { .. } => warn!("{}", record.message),
            _ => info!("{}", record.message),
        }

        if let Err(error) = self.log.append(&record).await {
            error!(%error, "Failed to record clone outcome");
        }

        outcome
    }

    async fn clone_course(&self, job: &CloneJob) -> anyhow::Result<CloneOutcome> {
        let source_category = self.category(job.source_category_id).await?;
        let destination = self.category(job.destination_category_id).await?;

        let course = self
            .store
            .get_course(job.course_id)
            .await?
            .ok_or(CloneError::CourseNotFound(job.course_id))?;

        let short_identifier = derive_short_identifier(&course.short_identifier, &destination.tag);

        if self
            .store
            .find_course(&short_identifier, destination.id)
            .await?
            .is_some()
        {
            return Ok(CloneOutcome::SkippedDuplicate { short_identifier });
        }

        debug!(%short_identifier, "Duplicating course");
        let request = DuplicateRequest {
            course_id: course.id,
            full_name: course.full_name.clone(),
            short_identifier,
            category_id: destination.id,
            options: DuplicateOptions::CONTENT_ONLY,
        };
        let mut clone = match self.store.duplicate_course(request).await {
            Ok(clone) => clone,
            Err(DuplicateError::ShortIdentifierTaken(short_identifier)) => {
                return Ok(CloneOutcome::SkippedDuplicate { short_identifier });
            }
            Err(DuplicateError::Other(error)) => return Err(error),
        };

        let update = CourseUpdate {
            full_name: derive_full_name(&course.full_name, &source_category.tag, &destination.tag),
            start_date: job.start_date,
            end_date: job.end_date,
        };
        self.store.update_course(clone.id, update.clone()).await?;

        clone.full_name = update.full_name;
        clone.start_date = update.start_date;
        clone.end_date = update.end_date;

        Ok(CloneOutcome::Succeeded {
            source: course,
            clone,
        })
    }

    async fn category(&self, id: CategoryId) -> anyhow::Result<Category> {
        if id.is_top() {
            return Ok(Category::top());
        }
        Ok(self
            .store
            .get_category(id)
            .await?
            .ok_or(CloneError::CategoryNotFound(id))?)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("job panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("job panicked: {message}")
    } else {
        "job panicked".to_string()
    }
}

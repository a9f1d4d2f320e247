use crate::executor::CloneExecutor;
use crate::models::JobId;
use crate::outcome::OutcomeLog;
use crate::queue::JobQueue;
use crate::store::CourseStore;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info_span, trace};

pub(crate) struct Worker<S, Q, L> {
    pub(crate) queue: Q,
    pub(crate) executor: CloneExecutor<S, L>,
    pub(crate) shutdown_when_queue_empty: bool,
    pub(crate) poll_interval: Duration,
    pub(crate) jitter: Duration,
}

impl<S: CourseStore, Q: JobQueue, L: OutcomeLog> Worker<S, Q, L> {
    /// Calculate the sleep duration with random jitter applied.
    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.poll_interval;
        }

        let jitter_millis = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        self.poll_interval + Duration::from_millis(random_jitter)
    }

    /// Run clone jobs forever, or until the queue is empty if `shutdown_when_queue_empty` is set.
    pub(crate) async fn run(&self) {
        loop {
            match self.run_next_job().await {
                Ok(Some(_)) => {}
                Ok(None) if self.shutdown_when_queue_empty => {
                    debug!("No pending clone jobs found. Shutting down the worker…");
                    break;
                }
                Ok(None) => {
                    let sleep_duration = self.sleep_duration_with_jitter();
                    trace!("No pending clone jobs found. Polling again in {sleep_duration:?}…");
                    sleep(sleep_duration).await;
                }
                Err(error) => {
                    error!("Failed to run clone job: {error}");
                    sleep(self.sleep_duration_with_jitter()).await;
                }
            }
        }
    }

    /// Run the next job in the queue, if there is one.
    ///
    /// Returns:
    /// - `Ok(Some(job_id))` if a job was run
    /// - `Ok(None)` if no jobs were waiting
    /// - `Err(...)` if the queue could not be read or updated
    async fn run_next_job(&self) -> anyhow::Result<Option<JobId>> {
        trace!("Looking for next clone job…");

        let Some(queued) = self.queue.claim_next(self.executor.lease()).await? else {
            return Ok(None);
        };

        let span = info_span!("job", job.id = %queued.id, batch.id = %queued.job.batch_id);
        async {
            debug!("Running clone job…");
            // The executor records every outcome itself, so the job always
            // leaves the queue once it returns.
            let _outcome = self.executor.run(&queued.job).await;
            debug!("Removing finished clone job…");
            self.queue.complete(queued.id).await
        }
        .instrument(span)
        .await?;

        Ok(Some(queued.id))
    }
}

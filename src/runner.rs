use crate::executor::CloneExecutor;
use crate::outcome::OutcomeLog;
use crate::queue::JobQueue;
use crate::store::CourseStore;
use crate::worker::Worker;
use futures_util::future::join_all;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};

const DEFAULT_NUM_WORKERS: usize = 1;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_JITTER: Duration = Duration::from_millis(100);

/// Pool of workers draining the clone job queue.
///
/// Each worker claims one job at a time, runs it through the
/// [`CloneExecutor`] and removes it from the queue once the executor returns.
/// Jobs of the same batch run in any order and in parallel.
pub struct Runner<S, Q, L> {
    queue: Q,
    executor: CloneExecutor<S, L>,
    num_workers: usize,
    poll_interval: Duration,
    jitter: Duration,
    shutdown_when_queue_empty: bool,
}

impl<S, Q, L> std::fmt::Debug for Runner<S, Q, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("num_workers", &self.num_workers)
            .field("poll_interval", &self.poll_interval)
            .field("jitter", &self.jitter)
            .field("shutdown_when_queue_empty", &self.shutdown_when_queue_empty)
            .finish()
    }
}

impl<S: CourseStore, Q: JobQueue, L: OutcomeLog> Runner<S, Q, L> {
    /// Create a new runner pulling from `queue` and executing with `executor`.
    pub fn new(queue: Q, executor: CloneExecutor<S, L>) -> Self {
        Self {
            queue,
            executor,
            num_workers: DEFAULT_NUM_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            jitter: DEFAULT_JITTER,
            shutdown_when_queue_empty: false,
        }
    }

    /// Set the number of concurrent workers.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set how often idle workers poll for new jobs.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the maximum random jitter added to poll intervals.
    ///
    /// Jitter spreads out workers that would otherwise poll in lockstep.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Stop each worker once it finds the queue empty.
    pub fn shutdown_when_queue_empty(mut self) -> Self {
        self.shutdown_when_queue_empty = true;
        self
    }

    /// Start the workers.
    ///
    /// There is no way to cancel a job once it is running; the returned
    /// handle only waits for the workers to stop.
    pub fn start(&self) -> RunHandle {
        let handles = (1..=self.num_workers)
            .map(|i| {
                let name = format!("clone-worker-{i}");
                info!(worker.name = %name, "Starting worker…");

                let worker = Worker {
                    queue: self.queue.clone(),
                    executor: self.executor.clone(),
                    shutdown_when_queue_empty: self.shutdown_when_queue_empty,
                    poll_interval: self.poll_interval,
                    jitter: self.jitter,
                };

                let span = info_span!("worker", worker.name = %name);
                tokio::spawn(async move { worker.run().instrument(span).await })
            })
            .collect();

        RunHandle { handles }
    }
}

/// Handle to the running workers.
#[derive(Debug)]
pub struct RunHandle {
    handles: Vec<JoinHandle<()>>,
}

impl RunHandle {
    /// Wait for all workers to shut down.
    pub async fn wait_for_shutdown(self) {
        join_all(self.handles).await.into_iter().for_each(|result| {
            if let Err(error) = result {
                warn!(%error, "Clone worker task panicked");
            }
        });
    }
}

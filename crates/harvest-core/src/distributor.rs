//! Bounded concurrent execution of independent jobs.
//!
//! Every job handed to a [`Distributor`] is attempted exactly once and never
//! more than [`AdmissionPolicy::limit`] jobs are in flight at any instant.
//! Completion order is unspecified; results are returned in submission order.
//!
//! - [`AdmissionPolicy::Continuous`]: `pool_size` spawned workers pull from a
//!   shared queue, a finishing worker immediately takes the next job.
//! - [`AdmissionPolicy::Windowed`]: jobs are launched `window_size` at a time
//!   on the calling task and the whole window is awaited before the next one
//!   starts, so one straggler holds back admission of the following window.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::config::AdmissionPolicy;
use crate::error::{AppError, ErrorKind};
use crate::models::{ErrorRecord, Job, JobOutcome, RunOutcome};
use crate::traits::Extractor;

/// Events emitted during a run for monitoring/logging.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    RunStarted {
        jobs: usize,
        policy: AdmissionPolicy,
    },
    WindowStarted {
        window: usize,
        size: usize,
    },
    WindowFinished {
        window: usize,
        elapsed: Duration,
    },
    JobStarted {
        url: &'a str,
    },
    JobSucceeded {
        url: &'a str,
        name: &'a str,
    },
    JobFailed {
        url: &'a str,
        kind: ErrorKind,
        error: &'a str,
    },
    PoolWorkerIdle {
        worker: usize,
    },
    RunFinished {
        results: usize,
        errors: usize,
    },
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::RunStarted { jobs, policy } => {
                tracing::info!(%jobs, %policy, "Run started");
            }
            RunEvent::WindowStarted { window, size } => {
                tracing::debug!(%window, %size, "Window launched");
            }
            RunEvent::WindowFinished { window, elapsed } => {
                tracing::debug!(%window, elapsed_ms = %elapsed.as_millis(), "Window drained");
            }
            RunEvent::JobStarted { url } => {
                tracing::debug!(%url, "Extracting");
            }
            RunEvent::JobSucceeded { url, name } => {
                tracing::info!(%url, %name, "Extracted");
            }
            RunEvent::JobFailed { url, kind, error } => {
                tracing::warn!(%url, %kind, %error, "Extraction failed");
            }
            RunEvent::PoolWorkerIdle { worker } => {
                tracing::debug!(%worker, "Pool worker found the queue empty");
            }
            RunEvent::RunFinished { results, errors } => {
                tracing::info!(%results, %errors, "Run finished");
            }
        }
    }
}

/// Runs the extractor once for a job and converts every failure, including a
/// panic, into an [`ErrorRecord`].
pub async fn guarded_extract<E: Extractor>(extractor: &E, job: &Job) -> JobOutcome {
    let attempt = AssertUnwindSafe(extractor.extract(job)).catch_unwind().await;

    match attempt {
        Ok(Ok(record)) => match record.validate() {
            Ok(()) => JobOutcome::Extracted(record),
            Err(e) => JobOutcome::Failed(ErrorRecord::from_error(job, &e)),
        },
        Ok(Err(e)) => JobOutcome::Failed(ErrorRecord::from_error(job, &e)),
        Err(payload) => JobOutcome::Failed(ErrorRecord::unexpected(
            job,
            format!("extractor panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Split `jobs` into contiguous chunks of `ceil(len / workers)` items, one per
/// process-isolated worker. The last chunk may be smaller, and fewer than
/// `workers` chunks are produced when the division leaves workers idle.
pub fn partition_chunks<T: Clone>(jobs: &[T], workers: usize) -> Result<Vec<Vec<T>>, AppError> {
    if workers == 0 {
        return Err(AppError::InvalidConfig(
            "worker count must be at least 1".into(),
        ));
    }
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = jobs.len().div_ceil(workers);
    Ok(jobs.chunks(chunk_size).map(<[T]>::to_vec).collect())
}

/// Distributes jobs across a bounded set of concurrent execution units.
#[derive(Debug, Clone, Copy)]
pub struct Distributor {
    policy: AdmissionPolicy,
}

impl Distributor {
    pub fn new(policy: AdmissionPolicy) -> Result<Self, AppError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// Extract every job once and collect results and classified failures.
    ///
    /// Individual failures never abort the run.
    pub async fn run<E, R>(&self, jobs: Vec<Job>, extractor: E, reporter: Arc<R>) -> RunOutcome
    where
        E: Extractor,
        R: RunReporter + 'static,
    {
        reporter.report(RunEvent::RunStarted {
            jobs: jobs.len(),
            policy: self.policy,
        });

        let submitted = jobs.clone();
        let handler = {
            let reporter = Arc::clone(&reporter);
            move |job: Job| {
                let extractor = extractor.clone();
                let reporter = Arc::clone(&reporter);
                async move {
                    reporter.report(RunEvent::JobStarted { url: &job.url });
                    let outcome = guarded_extract(&extractor, &job).await;
                    match &outcome {
                        JobOutcome::Extracted(record) => reporter.report(RunEvent::JobSucceeded {
                            url: &job.url,
                            name: record.name(),
                        }),
                        JobOutcome::Failed(error) => reporter.report(RunEvent::JobFailed {
                            url: &job.url,
                            kind: error.error_type,
                            error: &error.error_message,
                        }),
                    }
                    outcome
                }
            }
        };

        let mut outputs = self
            .dispatch_indexed(jobs, handler, &reporter)
            .await
            .into_iter()
            .peekable();

        let mut outcome = RunOutcome::default();
        for (index, job) in submitted.iter().enumerate() {
            match outputs.next_if(|(i, _)| *i == index) {
                Some((_, job_outcome)) => outcome.push(job_outcome),
                None => {
                    tracing::error!(url = %job.url, "Job outcome lost with its worker task");
                    outcome.push(JobOutcome::Failed(ErrorRecord::unexpected(
                        job,
                        "worker task terminated before reporting an outcome",
                    )));
                }
            }
        }

        reporter.report(RunEvent::RunFinished {
            results: outcome.results.len(),
            errors: outcome.errors.len(),
        });
        outcome
    }

    /// Run `handler` once per job under this distributor's admission policy
    /// and return the outputs in submission order.
    ///
    /// A handler that panics loses its own output; handlers are expected to
    /// contain their failures.
    pub async fn dispatch<T, H, Fut, R>(
        &self,
        jobs: Vec<Job>,
        handler: H,
        reporter: &Arc<R>,
    ) -> Vec<T>
    where
        T: Send + 'static,
        H: Fn(Job) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        R: RunReporter + 'static,
    {
        self.dispatch_indexed(jobs, handler, reporter)
            .await
            .into_iter()
            .map(|(_, output)| output)
            .collect()
    }

    async fn dispatch_indexed<T, H, Fut, R>(
        &self,
        jobs: Vec<Job>,
        handler: H,
        reporter: &Arc<R>,
    ) -> Vec<(usize, T)>
    where
        T: Send + 'static,
        H: Fn(Job) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        R: RunReporter + 'static,
    {
        match self.policy {
            AdmissionPolicy::Continuous { pool_size } => {
                run_pool(pool_size, jobs, handler, reporter).await
            }
            AdmissionPolicy::Windowed { window_size } => {
                run_windows(window_size, jobs, handler, reporter.as_ref()).await
            }
        }
    }
}

async fn run_pool<T, H, Fut, R>(
    pool_size: usize,
    jobs: Vec<Job>,
    handler: H,
    reporter: &Arc<R>,
) -> Vec<(usize, T)>
where
    T: Send + 'static,
    H: Fn(Job) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    R: RunReporter + 'static,
{
    let total = jobs.len();
    let queue = Arc::new(Mutex::new(
        jobs.into_iter().enumerate().collect::<VecDeque<_>>(),
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut workers = JoinSet::new();
    for worker in 0..pool_size.min(total) {
        let queue = Arc::clone(&queue);
        let handler = handler.clone();
        let tx = tx.clone();
        let reporter = Arc::clone(reporter);
        workers.spawn(async move {
            loop {
                let next = queue.lock().await.pop_front();
                let Some((index, job)) = next else {
                    break;
                };
                let output = handler(job).await;
                if tx.send((index, output)).is_err() {
                    break;
                }
            }
            reporter.report(RunEvent::PoolWorkerIdle { worker });
        });
    }
    drop(tx);

    let mut collected = Vec::with_capacity(total);
    while let Some(item) = rx.recv().await {
        collected.push(item);
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Pool worker terminated abnormally");
        }
    }

    collected.sort_by_key(|(index, _)| *index);
    collected
}

async fn run_windows<T, H, Fut, R>(
    window_size: usize,
    jobs: Vec<Job>,
    handler: H,
    reporter: &R,
) -> Vec<(usize, T)>
where
    H: Fn(Job) -> Fut,
    Fut: Future<Output = T>,
    R: RunReporter,
{
    let mut collected = Vec::with_capacity(jobs.len());

    for (window, chunk) in jobs.chunks(window_size).enumerate() {
        reporter.report(RunEvent::WindowStarted {
            window,
            size: chunk.len(),
        });
        let started = Instant::now();

        let outputs = join_all(chunk.iter().cloned().map(&handler)).await;

        reporter.report(RunEvent::WindowFinished {
            window,
            elapsed: started.elapsed(),
        });
        let base = window * window_size;
        collected.extend(
            outputs
                .into_iter()
                .enumerate()
                .map(|(offset, output)| (base + offset, output)),
        );
    }

    collected
}

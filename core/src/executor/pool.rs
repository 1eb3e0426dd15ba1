use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use encoding_rs::{Encoding, UTF_8};
use futures::Stream;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::{ExecutorError, JobError, RunnerError};
use crate::runner::{run_process, ProcessManager, ProcessResult, RunOptions};

use super::graph::DependencyGraph;
use super::job::{Job, JobOutcome, Unit};
use super::progress::{ProgressReporter, ProgressSnapshot};
use super::state::{BatchState, Pick};

const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

struct Shared {
    manager: Arc<dyn ProcessManager>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    workers: usize,
    idle_delay: Duration,
    encoding: &'static Encoding,
    channel_capacity: usize,
    tap_capacity: usize,
    state: Mutex<BatchState>,
    notify: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BatchState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, snapshot: ProgressSnapshot) {
        if let Some(reporter) = &self.reporter {
            reporter.report(&snapshot);
        }
    }

    /// Wake idle workers after a state transition.
    fn changed(&self, snapshot: ProgressSnapshot) {
        self.report(snapshot);
        self.notify.notify_waiters();
    }
}

/// Runs batches of jobs on a bounded set of cooperative workers.
///
/// A pool runs one batch at a time; its bookkeeping is reset when a batch
/// drains.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

pub struct WorkerPoolBuilder {
    manager: Arc<dyn ProcessManager>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    workers: Option<usize>,
    idle_delay: Duration,
    encoding: &'static Encoding,
    channel_capacity: usize,
    tap_capacity: usize,
}

impl WorkerPoolBuilder {
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn tap_capacity(mut self, capacity: usize) -> Self {
        self.tap_capacity = capacity;
        self
    }

    pub fn build(self) -> WorkerPool {
        WorkerPool {
            shared: Arc::new(Shared {
                manager: self.manager,
                reporter: self.reporter,
                workers: self.workers.unwrap_or_else(num_cpus::get).max(1),
                idle_delay: self.idle_delay,
                encoding: self.encoding,
                channel_capacity: self.channel_capacity.max(1),
                tap_capacity: self.tap_capacity.max(1),
                state: Mutex::new(BatchState::default()),
                notify: Notify::new(),
            }),
        }
    }
}

impl WorkerPool {
    pub fn builder(manager: Arc<dyn ProcessManager>) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            manager,
            reporter: None,
            workers: None,
            idle_delay: DEFAULT_IDLE_DELAY,
            encoding: UTF_8,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            tap_capacity: RunOptions::default().tap_capacity,
        }
    }

    pub fn new(manager: Arc<dyn ProcessManager>) -> Self {
        Self::builder(manager).build()
    }

    pub fn from_config(
        manager: Arc<dyn ProcessManager>,
        cfg: &PoolConfig,
    ) -> Result<WorkerPoolBuilder, RunnerError> {
        let encoding = Encoding::for_label(cfg.encoding.as_bytes())
            .ok_or_else(|| RunnerError::Config(format!("unknown encoding: {}", cfg.encoding)))?;
        Ok(Self::builder(manager)
            .workers(cfg.effective_workers())
            .idle_delay(Duration::from_millis(cfg.idle_delay_ms))
            .encoding(encoding)
            .channel_capacity(cfg.channel_capacity)
            .tap_capacity(cfg.tap_capacity))
    }

    pub fn workers(&self) -> usize {
        self.shared.workers
    }

    /// Validate `units` and start running them.
    ///
    /// Configuration errors are returned before any job starts. Finished jobs
    /// are yielded as they complete; if a job that is not `fail_ok` fails, the
    /// jobs already in flight are allowed to finish and the stream ends with
    /// the error.
    pub fn start_workers<I, U>(&self, units: I) -> Result<JobStream, ExecutorError>
    where
        I: IntoIterator<Item = U>,
        U: Into<Unit>,
    {
        let units: Vec<Unit> = units.into_iter().map(Into::into).collect();
        let graph = DependencyGraph::from_units(&units)?;
        graph.validate()?;

        let snapshot = {
            let mut state = self.shared.state();
            if !state.is_idle() {
                return Err(ExecutorError::PoolBusy);
            }
            graph.freeze();
            state.begin(&graph);
            state.snapshot(&graph)
        };
        self.shared.report(snapshot);

        let batch_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.shared.channel_capacity);
        let batch = Arc::new(Batch {
            id: batch_id,
            graph: Arc::new(graph),
            tx,
        });
        tracing::info!(
            batch = %batch_id,
            units = batch.graph.len(),
            jobs = snapshot.total,
            workers = self.shared.workers,
            "batch started"
        );

        tokio::spawn(drive(self.shared.clone(), batch));
        Ok(JobStream { rx, batch_id })
    }

    /// Run `units` and return every finished job once the batch drains.
    pub async fn run_to_completion<I, U>(&self, units: I) -> Result<Vec<Job>, ExecutorError>
    where
        I: IntoIterator<Item = U>,
        U: Into<Unit>,
    {
        self.start_workers(units)?.collect_all().await
    }
}

struct Batch {
    id: Uuid,
    graph: Arc<DependencyGraph>,
    tx: mpsc::Sender<Result<Job, ExecutorError>>,
}

impl Batch {
    async fn emit(&self, job: Job) {
        if self.tx.send(Ok(job)).await.is_err() {
            tracing::debug!(batch = %self.id, "job stream dropped, result discarded");
        }
    }
}

/// Runs every worker on this one task, then closes the batch.
async fn drive(shared: Arc<Shared>, batch: Arc<Batch>) {
    let started = Instant::now();
    let count = shared.workers.min(batch.graph.len()).max(1);
    let workers = (0..count).map(|worker_id| worker(&shared, &batch, worker_id));
    futures::future::join_all(workers).await;

    let (snapshot, outcome) = {
        let mut state = shared.state();
        let snapshot = state.snapshot(&batch.graph);
        (snapshot, state.end())
    };

    match outcome {
        Ok(()) => tracing::info!(
            batch = %batch.id,
            completed = snapshot.completed,
            failed = snapshot.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "batch drained"
        ),
        Err(err) => {
            tracing::error!(batch = %batch.id, error = %err, "batch aborted");
            let _ = batch.tx.send(Err(err)).await;
        }
    }
}

async fn worker(shared: &Shared, batch: &Batch, worker_id: usize) {
    loop {
        let pick = shared.state().next_ready(&batch.graph);

        match pick {
            Pick::Done => break,
            Pick::Wait => {
                let _ = tokio::time::timeout(shared.idle_delay, shared.notify.notified()).await;
            }
            Pick::Stuck(pending) => {
                let snapshot = {
                    let mut state = shared.state();
                    state.abort(ExecutorError::NoReadyJob { pending });
                    state.snapshot(&batch.graph)
                };
                shared.changed(snapshot);
                break;
            }
            Pick::Marker { group, failed } => {
                tracing::debug!(batch = %batch.id, group = group.name(), failed, "group finished");
                let snapshot = shared.state().snapshot(&batch.graph);
                shared.changed(snapshot);
            }
            Pick::Inherit { job, dependency } => {
                tracing::info!(batch = %batch.id, job = job.name(), dependency = %dependency, "skipped, dependency failed");
                let exception = Arc::new(JobError::DependencyFailed {
                    job: job.name().to_string(),
                    dependency,
                });
                record(shared, batch, &job, Arc::new(ProcessResult::failed()), Some(exception))
                    .await;
            }
            Pick::Run(job) => {
                let snapshot = shared.state().snapshot(&batch.graph);
                shared.report(snapshot);
                tracing::debug!(batch = %batch.id, worker = worker_id, job = job.name(), "dispatching");

                let (result, exception) = match execute(shared, &job).await {
                    Ok(result) => (Arc::new(result), None),
                    Err(err) => {
                        let result = err.result().cloned().unwrap_or_else(ProcessResult::failed);
                        tracing::warn!(batch = %batch.id, job = job.name(), error = %err, "job failed");
                        (Arc::new(result), Some(Arc::new(JobError::Process(err))))
                    }
                };
                record(shared, batch, &job, result, exception).await;
            }
        }
    }
    tracing::trace!(batch = %batch.id, worker = worker_id, "worker exiting");
}

/// Spawn the job's process. Never tolerates a non-zero exit itself, so the
/// pool sees every failure and applies the job's own `fail_ok`.
async fn execute(shared: &Shared, job: &Job) -> Result<ProcessResult, RunnerError> {
    let opts = RunOptions {
        fail_ok: false,
        encoding: shared.encoding,
        tap_capacity: shared.tap_capacity,
    };
    run_process(
        shared.manager.as_ref(),
        job.process_spec(),
        job.take_input(),
        opts,
    )
    .await
}

async fn record(
    shared: &Shared,
    batch: &Batch,
    job: &Job,
    result: Arc<ProcessResult>,
    exception: Option<Arc<JobError>>,
) {
    let failed = exception.is_some();
    let fatal = exception
        .as_ref()
        .filter(|_| !job.fail_ok())
        .map(|source| ExecutorError::JobFailed {
            job: job.name().to_string(),
            source: source.clone(),
        });

    if !job.finish(JobOutcome { result, exception }) {
        tracing::warn!(job = job.name(), "outcome already recorded");
    }

    let snapshot = {
        let mut state = shared.state();
        state.finish(job.id(), failed);
        if let Some(err) = fatal {
            state.abort(err);
        }
        if state.is_aborted() {
            tracing::debug!(batch = %batch.id, "no further jobs will be dispatched");
        }
        state.snapshot(&batch.graph)
    };
    shared.changed(snapshot);

    if let Some(reporter) = &shared.reporter {
        reporter.job_finished(job);
    }
    batch.emit(job.clone()).await;
}

/// Finished jobs of one batch, in completion order.
///
/// Ends after the last job; an aborted batch ends with its error.
pub struct JobStream {
    rx: mpsc::Receiver<Result<Job, ExecutorError>>,
    batch_id: Uuid,
}

impl JobStream {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub async fn next_job(&mut self) -> Option<Result<Job, ExecutorError>> {
        self.rx.recv().await
    }

    /// Drain the stream. The error of an aborted batch is returned after all
    /// in-flight jobs finished.
    pub async fn collect_all(mut self) -> Result<Vec<Job>, ExecutorError> {
        let mut finished = Vec::new();
        while let Some(item) = self.next_job().await {
            finished.push(item?);
        }
        Ok(finished)
    }
}

impl Stream for JobStream {
    type Item = Result<Job, ExecutorError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

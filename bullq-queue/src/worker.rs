//! Worker implementation for processing jobs.

use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobData, JobId};
use crate::outcome::{TaskFailure, extract_result, from_join};
use crate::queue::Queue;
use bullq_log::{debug, error, info};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

/// Job handler function type. The returned value is stored as the job's
/// return value.
pub type JobHandler =
    Arc<dyn Fn(Job) -> Pin<Box<dyn Future<Output = QueueResult<JobData>> + Send>> + Send + Sync>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of jobs run at the same time
    pub concurrency: usize,

    /// Wait between polls when the queue is empty
    pub poll_interval: Duration,

    /// Timeout for a single job
    pub job_timeout: Duration,

    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            event_capacity: 256,
        }
    }
}

/// Events published by a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The handler succeeded and the result was stored
    Completed { job_id: JobId },
    /// The handler failed, timed out, or no handler was registered
    Failed { job_id: JobId, reason: String },
    /// A job task failed outside its handler (Redis error, panic, abort)
    Error {
        kind: &'static str,
        failure: Arc<TaskFailure>,
    },
}

type HandlerMap = Arc<RwLock<HashMap<String, JobHandler>>>;

/// The parts of a worker shared with its polling task.
#[derive(Clone)]
struct Processor {
    queue: Queue,
    handlers: HandlerMap,
    config: WorkerConfig,
    events: broadcast::Sender<WorkerEvent>,
}

impl Processor {
    fn handler(&self, name: &str) -> Option<JobHandler> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(name).cloned()
    }

    async fn run_once(&self) -> QueueResult<usize> {
        run_batch(
            self.config.concurrency.max(1),
            || self.queue.next_waiting(),
            |job| {
                let handler = self.handler(&job.name);
                process_job(
                    self.queue.clone(),
                    handler,
                    job,
                    self.config.job_timeout,
                    self.events.clone(),
                )
            },
            &self.events,
        )
        .await
    }
}

/// Pull up to `limit` jobs, run them concurrently and wait for all of them.
///
/// Pulled jobs are already off the wait list, so a pull error only stops
/// pulling: the started jobs still run to the end before the error is
/// returned.
async fn run_batch<P, PF, R, RF>(
    limit: usize,
    mut pull: P,
    run: R,
    events: &broadcast::Sender<WorkerEvent>,
) -> QueueResult<usize>
where
    P: FnMut() -> PF,
    PF: Future<Output = QueueResult<Option<Job>>>,
    R: Fn(Job) -> RF,
    RF: Future<Output = QueueResult<JobId>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    let mut pull_error = None;

    for _ in 0..limit {
        match pull().await {
            Ok(Some(job)) => {
                debug!("Processing job: {} (name: {})", job.id, job.name);
                tasks.spawn(run(job));
            }
            Ok(None) => break,
            Err(e) => {
                pull_error = Some(e);
                break;
            }
        }
    }

    let mut processed = 0;
    while let Some(joined) = tasks.join_next().await {
        let handled = extract_result(from_join(joined), |kind, failure| {
            let _ = events.send(WorkerEvent::Error {
                kind,
                failure: Arc::new(failure),
            });
        });
        if handled.is_some() {
            processed += 1;
        }
    }

    match pull_error {
        Some(e) => Err(e),
        None => Ok(processed),
    }
}

/// Run one job and store the outcome of its handler.
///
/// Handler failures are recorded on the job and are not errors of the task.
/// Only failing to talk to Redis is.
async fn process_job(
    queue: Queue,
    handler: Option<JobHandler>,
    job: Job,
    job_timeout: Duration,
    events: broadcast::Sender<WorkerEvent>,
) -> QueueResult<JobId> {
    let job_id = job.id.clone();

    let result = match handler {
        Some(handler) => match tokio::time::timeout(job_timeout, handler(job.clone())).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout),
        },
        None => Err(QueueError::NoHandler(job.name.clone())),
    };

    match result {
        Ok(value) => {
            queue.complete(job, value).await?;
            debug!("Job {} completed", job_id);
            let _ = events.send(WorkerEvent::Completed {
                job_id: job_id.clone(),
            });
        }
        Err(e) => {
            let reason = e.to_string();
            error!("Job {} failed: {}", job_id, reason);
            queue.fail(job, reason.clone()).await?;
            let _ = events.send(WorkerEvent::Failed {
                job_id: job_id.clone(),
                reason,
            });
        }
    }

    Ok(job_id)
}

/// Worker for processing jobs from a queue.
pub struct Worker {
    processor: Processor,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(queue: Queue) -> Self {
        Self::with_config(queue, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(queue: Queue, config: WorkerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            processor: Processor {
                queue,
                handlers: Arc::new(RwLock::new(HashMap::new())),
                config,
                events,
            },
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Register a job handler.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bullq_queue::*;
    ///
    /// # async fn example() -> QueueResult<()> {
    /// let queue = Queue::new("redis://localhost:6379", "default").await?;
    /// let mut worker = Worker::new(queue);
    ///
    /// worker.register_handler("send_email", |job| async move {
    ///     println!("Sending email: {:?}", job.data);
    ///     Ok(serde_json::json!({"sent": true}))
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn register_handler<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<JobData>> + Send + 'static,
    {
        let wrapped: JobHandler = Arc::new(
            move |job: Job| -> Pin<Box<dyn Future<Output = QueueResult<JobData>> + Send>> {
                Box::pin(handler(job))
            },
        );

        let mut handlers = self
            .processor
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        handlers.insert(name.into(), wrapped);
    }

    /// Subscribe to worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.processor.events.subscribe()
    }

    /// Pull up to `concurrency` waiting jobs, run them concurrently and wait
    /// for all of them. Returns how many were handled.
    ///
    /// A job task that fails does not stop the others; it is reported as a
    /// [`WorkerEvent::Error`].
    pub async fn run_once(&self) -> QueueResult<usize> {
        self.processor.run_once().await
    }

    /// Start polling in the background.
    pub async fn start(&mut self) -> QueueResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::WorkerAlreadyRunning);
        }

        info!(
            "Starting worker with concurrency: {}",
            self.processor.config.concurrency
        );

        let processor = self.processor.clone();
        let running = self.running.clone();

        self.handle = Some(tokio::spawn(async move {
            let poll_interval = processor.config.poll_interval;
            while running.load(Ordering::SeqCst) {
                match processor.run_once().await {
                    Ok(0) => tokio::time::sleep(poll_interval).await,
                    Ok(n) => debug!("Processed {} jobs", n),
                    Err(e) => {
                        bullq_log::report_error(module_path!(), &e);
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
            info!("Worker loop stopped");
        }));

        Ok(())
    }

    /// Stop polling and wait for the jobs in flight.
    pub async fn stop(&mut self) -> QueueResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(QueueError::WorkerNotRunning);
        }

        info!("Stopping worker...");
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| QueueError::ExecutionFailed(e.to_string()))?;
        }
        info!("Worker stopped");

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

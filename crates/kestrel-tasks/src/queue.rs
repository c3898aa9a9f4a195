//! Bounded background task queue.

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, warn};

use crate::error::{panic_message, TaskError, TaskResult};
use crate::task::{TaskHandle, TaskId, TaskOutcome, TaskReport, TaskStats};

type CompletionCallback = Arc<dyn Fn(&TaskReport) + Send + Sync>;

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Configuration for the background queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of blocking tasks running at once.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl QueueConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers. Zero is raised to one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// A fixed-size pool for fire-and-forget work.
///
/// Submitting never blocks the caller: the task is registered, handed to the
/// runtime, and waits for one of `workers` slots there. Errors and panics in
/// tasks are logged and reported to completion callbacks, never re-raised in
/// the submitter.
///
/// Cloning is cheap and every clone shares the same pool.
#[derive(Clone)]
pub struct BackgroundQueue {
    inner: Arc<Inner>,
}

struct Inner {
    workers: usize,
    permits: Arc<Semaphore>,
    registry: DashMap<TaskId, String>,
    callbacks: RwLock<Vec<CompletionCallback>>,
    stats: TaskStats,
    idle: Notify,
}

impl BackgroundQueue {
    /// Create a queue sized to the available parallelism.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue from configuration.
    pub fn with_config(config: QueueConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            inner: Arc::new(Inner {
                workers,
                permits: Arc::new(Semaphore::new(workers)),
                registry: DashMap::new(),
                callbacks: RwLock::new(Vec::new()),
                stats: TaskStats::default(),
                idle: Notify::new(),
            }),
        }
    }

    /// Size of the worker pool.
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Number of tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.inner.registry.len()
    }

    /// Activity counters.
    pub fn stats(&self) -> &TaskStats {
        &self.inner.stats
    }

    /// Register a callback invoked once for every finished task.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(&TaskReport) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().push(Arc::new(callback));
    }

    /// Submit a blocking closure to the worker pool.
    ///
    /// Returns as soon as the task is registered. Fails only when called
    /// outside a Tokio runtime.
    pub fn submit<F, T>(&self, name: impl Into<String>, task: F) -> TaskResult<TaskHandle<T>>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime)?;
        let (id, name) = self.register(name.into());
        let inner = Arc::clone(&self.inner);
        let task_name = name.clone();

        let handle = runtime.spawn(async move {
            let _permit = Arc::clone(&inner.permits).acquire_owned().await;
            let result = match tokio::task::spawn_blocking(task).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::failed(&e)),
                Err(e) => Err(TaskError::from_join(e)),
            };
            inner.finish(id, &task_name, &result);
            result
        });

        Ok(TaskHandle { id, name, handle })
    }

    /// Submit a future. It runs on the async runtime and does not occupy a
    /// worker slot.
    pub fn submit_async<F, T>(&self, name: impl Into<String>, task: F) -> TaskResult<TaskHandle<T>>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime)?;
        let (id, name) = self.register(name.into());
        let inner = Arc::clone(&self.inner);
        let task_name = name.clone();

        let handle = runtime.spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::failed(&e)),
                Err(payload) => Err(TaskError::panicked(panic_message(payload.as_ref()))),
            };
            inner.finish(id, &task_name, &result);
            result
        });

        Ok(TaskHandle { id, name, handle })
    }

    /// Wrap `f` so that every call submits it as a task.
    pub fn run_as_task<A, F, T>(
        &self,
        name: impl Into<String>,
        f: F,
    ) -> impl Fn(A) -> TaskResult<TaskHandle<T>> + Clone + Send + Sync + 'static
    where
        A: Send + 'static,
        F: Fn(A) -> anyhow::Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let queue = self.clone();
        let name: Arc<str> = Arc::from(name.into());
        let f = Arc::new(f);
        move |arg| {
            let f = Arc::clone(&f);
            queue.submit(&*name, move || f(arg))
        }
    }

    /// Run a blocking closure off the async executor and await its value.
    ///
    /// Used for synchronous request handlers. It does not take a worker slot,
    /// so handlers never queue behind background work.
    pub async fn call<F, T>(&self, f: F) -> TaskResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TaskError::NoRuntime)?;
        runtime.spawn_blocking(f).await.map_err(TaskError::from_join)
    }

    /// Wait until no task is pending, up to `timeout`.
    ///
    /// Returns `true` when the queue emptied in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inner.registry.is_empty() {
                    return;
                }
                notified.await;
            }
        };

        let drained = tokio::time::timeout(timeout, wait).await.is_ok();
        if !drained {
            warn!(pending = self.pending(), "background queue drain timed out");
        }
        drained
    }

    fn register(&self, name: String) -> (TaskId, String) {
        let id = TaskId::new();
        self.inner.registry.insert(id, name.clone());
        self.inner.stats.record_submit();
        debug!(task_id = %id, task_name = %name, "background task submitted");
        (id, name)
    }
}

impl Inner {
    fn finish<T>(&self, id: TaskId, name: &str, result: &TaskResult<T>) {
        let outcome = TaskOutcome::of(result);
        match &outcome {
            TaskOutcome::Completed => {
                debug!(task_id = %id, task_name = %name, "background task completed");
            }
            TaskOutcome::Failed(e) => {
                error!(task_id = %id, task_name = %name, error = %e, "background task failed");
            }
        }
        self.stats.record(&outcome);

        let callbacks = self.callbacks.read().clone();
        if !callbacks.is_empty() {
            let report = TaskReport {
                id,
                name: name.to_string(),
                outcome,
            };
            for callback in &callbacks {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(&report))) {
                    error!(
                        task_id = %id,
                        panic = %panic_message(payload.as_ref()),
                        "task completion callback panicked"
                    );
                }
            }
        }

        self.registry.remove(&id);
        if self.registry.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

impl Default for BackgroundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackgroundQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundQueue")
            .field("workers", &self.inner.workers)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_config_defaults() {
        assert!(QueueConfig::default().workers >= 1);
        assert_eq!(QueueConfig::new().with_workers(0).workers, 1);
        assert_eq!(QueueConfig::new().with_workers(3).workers, 3);
    }

    #[test]
    fn test_submit_without_runtime() {
        let queue = BackgroundQueue::new();
        let result = queue.submit("orphan", || Ok(()));
        assert!(matches!(result, Err(TaskError::NoRuntime)));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_does_not_block_caller() {
        let queue = BackgroundQueue::new();
        let started = Instant::now();

        let handle = queue
            .submit("sleepy", || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(7)
            })
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!handle.is_finished());
        assert_eq!(handle.name(), "sleepy");
        assert_eq!(handle.join().await, Ok(7));
    }

    #[tokio::test]
    async fn test_failed_task_is_reported() {
        let queue = BackgroundQueue::new();
        let reports = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        queue.on_complete(move |report| sink.lock().push(report.clone()));

        let handle = queue
            .submit("broken", || -> anyhow::Result<()> {
                anyhow::bail!("no such file")
            })
            .unwrap();
        let id = handle.id();

        assert_eq!(
            handle.join().await,
            Err(TaskError::Failed("no such file".into()))
        );
        assert!(queue.drain(Duration::from_secs(1)).await);

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, id);
        assert_eq!(reports[0].name, "broken");
        assert!(!reports[0].outcome.is_success());
        assert_eq!(queue.stats().total_failed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let queue = BackgroundQueue::new();
        let handle = queue
            .submit("explodes", || -> anyhow::Result<()> { panic!("kaboom") })
            .unwrap();

        assert_eq!(handle.join().await, Err(TaskError::panicked("kaboom")));

        let after = queue.submit("still-works", || Ok("fine")).unwrap();
        assert_eq!(after.join().await, Ok("fine"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_workers_bound_concurrency() {
        let queue = BackgroundQueue::with_config(QueueConfig::new().with_workers(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                queue
                    .submit(format!("job-{i}"), move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(40));
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();

        for handle in handles {
            handle.join().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.stats().total_completed(), 6);
    }

    #[tokio::test]
    async fn test_submit_async() {
        let queue = BackgroundQueue::new();
        let handle = queue
            .submit_async("async-job", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(42)
            })
            .unwrap();
        assert_eq!(handle.join().await, Ok(42));

        let handle = queue
            .submit_async("async-panic", async {
                if true {
                    panic!("async kaboom");
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(handle.join().await, Err(TaskError::panicked("async kaboom")));
    }

    #[tokio::test]
    async fn test_run_as_task() {
        let queue = BackgroundQueue::new();
        let total = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&total);

        let record = queue.run_as_task("record", move |amount: usize| {
            counter.fetch_add(amount, Ordering::SeqCst);
            Ok(())
        });

        for amount in 1..=3 {
            record(amount).unwrap();
        }
        assert!(queue.drain(Duration::from_secs(1)).await);
        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert_eq!(queue.stats().total_submitted(), 3);
    }

    #[tokio::test]
    async fn test_call_returns_value() {
        let queue = BackgroundQueue::with_config(QueueConfig::new().with_workers(1));
        let _busy = queue
            .submit("occupies-worker", || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .unwrap();

        let started = Instant::now();
        let value = queue.call(|| 2 + 2).await;
        assert_eq!(value, Ok(4));
        assert!(started.elapsed() < Duration::from_millis(200));

        let panicked = queue.call(|| -> u8 { panic!("handler bug") }).await;
        assert_eq!(panicked, Err(TaskError::panicked("handler bug")));
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let queue = BackgroundQueue::new();
        queue
            .submit("slow", || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap();

        assert!(!queue.drain(Duration::from_millis(20)).await);
        assert_eq!(queue.pending(), 1);
        assert!(queue.drain(Duration::from_secs(2)).await);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_when_idle() {
        let queue = BackgroundQueue::new();
        assert!(queue.drain(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stick() {
        let queue = BackgroundQueue::new();
        queue.on_complete(|_| panic!("bad callback"));
        queue.submit("fine", || Ok(())).unwrap();
        assert!(queue.drain(Duration::from_secs(1)).await);
    }
}

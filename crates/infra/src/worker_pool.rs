//! Background worker pool with callbacks delivered on the interactive loop.
//!
//! Every submission gets exactly one completion: `on_success` or `on_error`,
//! posted to the [`LoopHandle`] it was created with. A panic inside the work
//! closure is caught and reported as [`TaskError::Panicked`].

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::interactive_loop::LoopHandle;

/// Smallest pool the agent runs with.
pub const MIN_WORKERS: usize = 4;

type Job = Box<dyn FnOnce() + Send>;

/// Identifier of one submission (for log correlation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why a submission did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("worker pool is shut down")]
    PoolClosed,
    #[error("timed out waiting for task after {0:?}")]
    TimedOut(Duration),
}

impl<E> TaskError<E> {
    /// The work's own error, if that is what happened.
    pub fn into_failure(self) -> Option<E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Callbacks for one submission.
///
/// Both are optional. A missing `on_error` means failures are logged.
pub struct Completion<T, E> {
    on_success: Option<Box<dyn FnOnce(T) + Send>>,
    on_error: Option<Box<dyn FnOnce(TaskError<E>) + Send>>,
}

impl<T, E> Completion<T, E> {
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(TaskError<E>) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl<T, E> Default for Completion<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads (clamped to at least [`MIN_WORKERS`]).
    pub size: usize,
    /// Thread name prefix for logging.
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: MIN_WORKERS,
            name: "rxdesk-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: usize,
}

/// Fixed-size pool of background threads.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    exited: Mutex<mpsc::Receiver<()>>,
    loop_handle: LoopHandle,
    stats: Arc<Mutex<PoolStats>>,
    name: String,
}

impl WorkerPool {
    /// Spawn the workers. Callbacks are delivered through `loop_handle`.
    pub fn new(config: WorkerPoolConfig, loop_handle: LoopHandle) -> anyhow::Result<Self> {
        let size = config.size.max(MIN_WORKERS);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let (exit_tx, exit_rx) = mpsc::channel::<()>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let exit_tx = exit_tx.clone();
            let thread_name = format!("{}-{}", config.name, index);
            let join = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    worker_loop(&thread_name, &receiver);
                    let _ = exit_tx.send(());
                })
                .map_err(|e| anyhow::anyhow!("failed to spawn worker thread {index}: {e}"))?;
            workers.push(join);
        }

        info!(pool = %config.name, size, "worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            exited: Mutex::new(exit_rx),
            loop_handle,
            stats: Arc::new(Mutex::new(PoolStats::default())),
            name: config.name,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run `work` on a worker; deliver one of the callbacks on the loop.
    ///
    /// Never blocks. If the pool is already shut down the error callback is
    /// still delivered (with [`TaskError::PoolClosed`]).
    pub fn submit<T, E, W>(&self, work: W, completion: Completion<T, E>) -> TaskId
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        W: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let id = TaskId::new();
        self.update_stats(|s| {
            s.submitted += 1;
            s.in_flight += 1;
        });

        let Some(sender) = self.current_sender() else {
            warn!(pool = %self.name, task = %id, "submit after shutdown");
            deliver(&self.loop_handle, &self.stats, &self.name, id, Err(TaskError::PoolClosed), completion);
            return id;
        };

        let loop_handle = self.loop_handle.clone();
        let stats = self.stats.clone();
        let pool_name = self.name.clone();
        let job: Job = Box::new(move || {
            let outcome = run_guarded(work);
            deliver(&loop_handle, &stats, &pool_name, id, outcome, completion);
        });

        if sender.send(job).is_err() {
            // Every worker is gone; the completion went down with the job.
            error!(pool = %self.name, task = %id, "no live workers; task dropped");
            self.update_stats(|s| s.in_flight = s.in_flight.saturating_sub(1));
        }
        id
    }

    /// Fire-and-forget: failures are logged.
    pub fn spawn<T, E, W>(&self, work: W) -> TaskId
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        W: FnOnce() -> Result<T, E> + Send + 'static,
    {
        self.submit(work, Completion::new())
    }

    /// Run `work` on a worker and block the caller until it finishes.
    ///
    /// The work never runs on the calling thread. Used at the few call sites
    /// that cannot continue without the answer.
    pub fn submit_and_wait<T, E, W>(&self, work: W, timeout: Duration) -> Result<T, TaskError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        W: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let sender = self.current_sender().ok_or(TaskError::PoolClosed)?;
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(run_guarded(work));
        });
        sender.send(job).map_err(|_| TaskError::PoolClosed)?;

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(TaskError::TimedOut(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(TaskError::PoolClosed),
        }
    }

    /// Stop accepting work and wait up to `grace` for workers to drain.
    ///
    /// Workers still busy after `grace` are detached.
    pub fn shutdown(&self, grace: Duration) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let exited = self.exited.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = Instant::now() + grace;
        let mut remaining = workers.len();
        while remaining > 0 {
            let wait = deadline.saturating_duration_since(Instant::now());
            match exited.recv_timeout(wait) {
                Ok(()) => remaining -= 1,
                Err(_) => break,
            }
        }

        if remaining == 0 {
            for join in workers {
                let _ = join.join();
            }
            info!(pool = %self.name, "worker pool stopped");
        } else {
            warn!(pool = %self.name, busy = remaining, ?grace, "worker pool stopped with busy workers");
        }
    }

    fn current_sender(&self) -> Option<mpsc::Sender<Job>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update_stats(&self, f: impl FnOnce(&mut PoolStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(500));
    }
}

fn worker_loop(thread_name: &str, receiver: &Mutex<mpsc::Receiver<Job>>) {
    debug!(worker = thread_name, "worker started");
    loop {
        // Hold the lock only while waiting for the next job.
        let job = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    debug!(worker = thread_name, "worker stopped");
}

fn run_guarded<T, E, W>(work: W) -> Result<T, TaskError<E>>
where
    W: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn deliver<T, E>(
    loop_handle: &LoopHandle,
    stats: &Arc<Mutex<PoolStats>>,
    pool_name: &str,
    id: TaskId,
    outcome: Result<T, TaskError<E>>,
    completion: Completion<T, E>,
) where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let stats = stats.clone();
    let pool_name = pool_name.to_string();
    let posted = loop_handle.post(move || {
        {
            let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
            s.in_flight = s.in_flight.saturating_sub(1);
            match outcome {
                Ok(_) => s.succeeded += 1,
                Err(_) => s.failed += 1,
            }
        }
        let Completion { on_success, on_error } = completion;
        match outcome {
            Ok(value) => {
                if let Some(f) = on_success {
                    f(value);
                }
            }
            Err(err) => match on_error {
                Some(f) => f(err),
                None => error!(pool = %pool_name, task = %id, error = %err, "unhandled task error"),
            },
        }
    });
    if posted.is_err() {
        warn!(task = %id, "interactive loop closed; dropping task completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactive_loop::InteractiveLoop;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(event_loop: &InteractiveLoop) -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig::default(), event_loop.handle()).unwrap()
    }

    #[test]
    fn fifty_submissions_complete_exactly_once_on_loop_thread() {
        let mut event_loop = InteractiveLoop::new();
        let pool = pool(&event_loop);
        assert_eq!(pool.size(), 4);

        let completions = Arc::new(Mutex::new(vec![0usize; 50]));
        let off_thread = Arc::new(AtomicUsize::new(0));

        for n in 0..50usize {
            let ok_hits = completions.clone();
            let err_hits = completions.clone();
            let ok_handle = event_loop.handle();
            let err_handle = event_loop.handle();
            let ok_off = off_thread.clone();
            let err_off = off_thread.clone();
            pool.submit(
                move || {
                    thread::sleep(Duration::from_millis((n % 5) as u64));
                    if n % 7 == 0 { Err(format!("task {n} failed")) } else { Ok(n) }
                },
                Completion::new()
                    .on_success(move |value: usize| {
                        if !ok_handle.is_loop_thread() {
                            ok_off.fetch_add(1, Ordering::SeqCst);
                        }
                        ok_hits.lock().unwrap()[value] += 1;
                    })
                    .on_error(move |err: TaskError<String>| {
                        if !err_handle.is_loop_thread() {
                            err_off.fetch_add(1, Ordering::SeqCst);
                        }
                        let msg = err.into_failure().unwrap();
                        let n: usize = msg
                            .trim_start_matches("task ")
                            .trim_end_matches(" failed")
                            .parse()
                            .unwrap();
                        err_hits.lock().unwrap()[n] += 1;
                    }),
            );
        }

        let done = event_loop.run_until(
            || completions.lock().unwrap().iter().sum::<usize>() == 50,
            Duration::from_secs(10),
        );
        assert!(done);
        // Give any duplicate delivery a chance to show up.
        event_loop.run_for(Duration::from_millis(50));

        assert!(completions.lock().unwrap().iter().all(|&c| c == 1));
        assert_eq!(off_thread.load(Ordering::SeqCst), 0);

        let stats = pool.stats();
        assert_eq!(stats.submitted, 50);
        assert_eq!(stats.succeeded + stats.failed, 50);
        assert_eq!(stats.failed, 8);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn panics_become_errors() {
        let mut event_loop = InteractiveLoop::new();
        let pool = pool(&event_loop);
        let caught = Arc::new(Mutex::new(None));

        let sink = caught.clone();
        pool.submit(
            || -> Result<(), String> { panic!("boom") },
            Completion::new().on_error(move |err| {
                *sink.lock().unwrap() = Some(err.to_string());
            }),
        );

        assert!(event_loop.run_until(|| caught.lock().unwrap().is_some(), Duration::from_secs(2)));
        assert_eq!(caught.lock().unwrap().as_deref(), Some("task panicked: boom"));
    }

    #[test]
    fn unhandled_errors_do_not_crash() {
        rxdesk_observability::init_for_tests();
        let mut event_loop = InteractiveLoop::new();
        let pool = pool(&event_loop);
        pool.spawn(|| -> Result<(), String> { Err("nobody listens".to_string()) });

        assert!(event_loop.run_until(|| pool.stats().failed == 1, Duration::from_secs(2)));
    }

    #[test]
    fn submit_and_wait_runs_off_thread() {
        let event_loop = InteractiveLoop::new();
        let pool = pool(&event_loop);
        let caller = thread::current().id();

        let ran_on = pool
            .submit_and_wait(move || Ok::<_, String>(thread::current().id()), Duration::from_secs(2))
            .unwrap();
        assert_ne!(ran_on, caller);

        let slow = pool.submit_and_wait(
            || {
                thread::sleep(Duration::from_millis(200));
                Ok::<_, String>(())
            },
            Duration::from_millis(20),
        );
        assert!(matches!(slow, Err(TaskError::TimedOut(_))));
    }

    #[test]
    fn submit_after_shutdown_reports_pool_closed() {
        let mut event_loop = InteractiveLoop::new();
        let pool = pool(&event_loop);
        pool.shutdown(Duration::from_secs(1));
        pool.shutdown(Duration::from_secs(1));

        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        pool.submit(
            || Ok::<_, String>(()),
            Completion::new().on_error(move |err| {
                assert!(matches!(err, TaskError::PoolClosed));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(event_loop.run_until(|| closed.load(Ordering::SeqCst) == 1, Duration::from_secs(1)));
        assert!(matches!(
            pool.submit_and_wait(|| Ok::<_, String>(()), Duration::from_millis(10)),
            Err(TaskError::PoolClosed)
        ));
    }
}

//! In-process task queue
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - A rate-limited lane with a minimum delay between task starts
//! - Retrying tasks that failed on persistence
//! - Reporting tasks that failed for good to an error hook
//! - Tracking in-flight tasks so callers can wait for everything to finish
//!
//! Tasks never wait for the tasks they submit. A task that fans out returns
//! as soon as its children are queued, and a failing task does not cancel
//! siblings that are already queued.

use crate::config::CrawlerConfig;
use crate::ProbeError;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::time::Instant;

/// Which admission path a task takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Starts as soon as a worker permit is free
    Default,
    /// Additionally waits for the next rate limit slot
    RateLimited,
}

/// A task that failed after all of its attempts
#[derive(Debug)]
pub struct TaskFailure<'a> {
    pub task_id: u64,
    pub task_name: &'a str,
    pub attempts: u32,
    pub error: &'a ProbeError,
}

impl TaskFailure<'_> {
    /// The error's chain of causes, outermost first, excluding the error
    /// itself
    pub fn traceback(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut source = self.error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        chain
    }
}

/// Receives tasks that failed for good
pub trait ErrorHook: Send + Sync {
    fn on_failure(&self, failure: &TaskFailure<'_>);
}

/// Logs failed tasks with their cause chain
#[derive(Debug, Default)]
pub struct LoggingErrorHook;

impl ErrorHook for LoggingErrorHook {
    fn on_failure(&self, failure: &TaskFailure<'_>) {
        let traceback = failure.traceback();
        tracing::warn!(
            "Task {} ({}) raised exception after {} attempt(s): {}{}",
            failure.task_id,
            failure.task_name,
            failure.attempts,
            failure.error,
            if traceback.is_empty() {
                String::new()
            } else {
                format!("\n  caused by: {}", traceback.join("\n  caused by: "))
            }
        );
    }
}

/// Counters of task outcomes
#[derive(Debug, Default)]
struct QueueStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// Point-in-time copy of the queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Hands out start slots at a fixed minimum interval
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    fn per_second(rate: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / rate),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    async fn wait(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

struct Inner {
    semaphore: Semaphore,
    rate_limiter: RateLimiter,
    max_retries: u32,
    retry_delay: Duration,
    hook: Arc<dyn ErrorHook>,
    in_flight: AtomicUsize,
    idle: Notify,
    next_id: AtomicU64,
    stats: QueueStats,
}

impl Inner {
    async fn run<F, Fut>(&self, task_id: u64, name: &str, lane: Lane, task: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), ProbeError>>,
    {
        let mut attempts = 0;
        loop {
            if lane == Lane::RateLimited {
                self.rate_limiter.wait().await;
            }

            let result = {
                let _permit = match self.semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::error!("Task {} ({}) dropped: queue is closed", task_id, name);
                        return;
                    }
                };
                attempts += 1;
                task().await
            };

            match result {
                Ok(()) => {
                    self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Task {} ({}) succeeded", task_id, name);
                    return;
                }
                Err(e) if e.is_retryable() && attempts <= self.max_retries => {
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Task {} ({}) failed, retrying ({}/{}): {}",
                        task_id,
                        name,
                        attempts,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    self.hook.on_failure(&TaskFailure {
                        task_id,
                        task_name: name,
                        attempts,
                        error: &e,
                    });
                    return;
                }
            }
        }
    }
}

/// Decrements the in-flight count when a task ends, even by panic
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl InFlightGuard {
    fn new(inner: Arc<Inner>) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Runs submitted tasks on the tokio runtime
///
/// Cloning the queue is cheap; all clones share workers, limits and
/// counters.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Creates a queue with the given failure hook
    ///
    /// # Arguments
    ///
    /// * `config` - Concurrency, rate limit and retry settings
    /// * `hook` - Called once for every task that fails for good
    pub fn new(config: &CrawlerConfig, hook: Arc<dyn ErrorHook>) -> Self {
        Self {
            inner: Arc::new(Inner {
                semaphore: Semaphore::new(config.max_concurrent_tasks as usize),
                rate_limiter: RateLimiter::per_second(config.check_rate_limit),
                max_retries: config.max_task_retries,
                retry_delay: config.retry_delay(),
                hook,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                next_id: AtomicU64::new(1),
                stats: QueueStats::default(),
            }),
        }
    }

    /// Creates a queue that logs failed tasks
    pub fn with_logging_hook(config: &CrawlerConfig) -> Self {
        Self::new(config, Arc::new(LoggingErrorHook))
    }

    /// Submits a task and returns its id without waiting for it
    ///
    /// `task` builds the future for one attempt; it is called again for
    /// every retry.
    pub fn submit<F, Fut>(&self, name: impl Into<String>, lane: Lane, task: F) -> u64
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProbeError>> + Send + 'static,
    {
        let task_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        self.inner.stats.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Submitted task {} ({})", task_id, name);

        let guard = InFlightGuard::new(Arc::clone(&self.inner));
        tokio::spawn(async move {
            let guard = guard;
            guard.inner.run(task_id, &name, lane, task).await;
        });

        task_id
    }

    /// Number of submitted tasks that have not finished
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until every submitted task, including tasks submitted by other
    /// tasks, has finished
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> QueueSnapshot {
        let stats = &self.inner.stats;
        QueueSnapshot {
            submitted: stats.submitted.load(Ordering::Relaxed),
            succeeded: stats.succeeded.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            retried: stats.retried.load(Ordering::Relaxed),
        }
    }
}

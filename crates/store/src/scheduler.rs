//! Commit copy scheduler.
//!
//! Commit is asynchronous: the caller gets a `CommitFuture` immediately
//! after the journal write, and a bounded pool of worker threads performs
//! the temp→permanent copy. Tasks run FIFO; a panicking task is contained
//! and its bookkeeping still completes, so `drain()` can never hang on it.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::error;
use warcrepo_core::{Artifact, RepoError, Result};

type Job = Box<dyn FnOnce() + Send>;

/// Outcome of a commit: the updated descriptor, `None` when deletion won,
/// or the error that failed the copy.
pub type CommitResult = Result<Option<Artifact>>;

#[derive(Debug)]
struct CommitCell {
    state: Mutex<Option<CommitResult>>,
    done: Condvar,
}

/// Waitable handle for an in-flight commit.
///
/// The copy keeps running if a deadline expires; on a crash the journal
/// entry lets reload re-drive it, so there is no cancel.
#[derive(Debug)]
pub struct CommitFuture {
    cell: Arc<CommitCell>,
}

impl CommitFuture {
    /// A future plus the completer its copy task will resolve it with.
    pub fn pair() -> (CommitFuture, CommitCompleter) {
        let cell = Arc::new(CommitCell {
            state: Mutex::new(None),
            done: Condvar::new(),
        });
        (
            CommitFuture {
                cell: Arc::clone(&cell),
            },
            CommitCompleter { cell },
        )
    }

    /// An already-resolved future (idempotent re-commit, deletion-wins).
    pub fn ready(result: CommitResult) -> CommitFuture {
        let (future, completer) = Self::pair();
        completer.complete(result);
        future
    }

    /// Whether the commit has resolved.
    pub fn is_done(&self) -> bool {
        self.cell.state.lock().is_some()
    }

    /// Block until the commit resolves.
    pub fn wait(&self) -> CommitResult {
        let mut state = self.cell.state.lock();
        while state.is_none() {
            self.cell.done.wait(&mut state);
        }
        state.as_ref().expect("state present").clone()
    }

    /// Block with a deadline. `None` means the deadline expired with the
    /// commit still in progress.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CommitResult> {
        let mut state = self.cell.state.lock();
        if state.is_none() {
            self.cell.done.wait_for(&mut state, timeout);
        }
        state.as_ref().cloned()
    }
}

/// Completion side of a `CommitFuture`.
pub struct CommitCompleter {
    cell: Arc<CommitCell>,
}

impl CommitCompleter {
    /// Resolve the future. Waiters wake exactly once.
    pub fn complete(self, result: CommitResult) {
        let mut state = self.cell.state.lock();
        *state = Some(result);
        self.cell.done.notify_all();
    }
}

struct SchedulerInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    tasks_completed: AtomicU64,
    max_queue_depth: usize,
}

/// Bounded FIFO worker pool for commit copy tasks.
pub struct CommitScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl CommitScheduler {
    /// Start `worker_count` workers named `warcrepo-commit-N`.
    pub fn new(worker_count: usize, max_queue_depth: usize) -> Self {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
            max_queue_depth,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("warcrepo-commit-{}", i))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn commit worker thread");
            workers.push(handle);
        }

        Self {
            inner,
            workers: Mutex::new(workers),
            worker_count,
        }
    }

    /// Enqueue a copy task.
    ///
    /// # Errors
    ///
    /// `IllegalState` when the queue is at capacity or the scheduler has
    /// been shut down; the journal entry already exists, so reload will
    /// re-drive the copy.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(RepoError::illegal_state("commit scheduler is shut down"));
        }
        if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
            return Err(RepoError::illegal_state("commit queue is full"));
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Box::new(job));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight tasks have completed. Workers
    /// stay alive; this does not signal shutdown.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit after draining the queue, then join them.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Lock the queue before notifying to close the window where a
        // worker has checked shutdown but not yet entered wait().
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Total tasks completed since construction.
    pub fn tasks_completed(&self) -> u64 {
        self.inner.tasks_completed.load(Ordering::Relaxed)
    }
}

/// Decrements `active_tasks` and notifies drain waiters on drop, so the
/// accounting survives a panicking task.
struct ActiveTaskGuard<'a> {
    inner: &'a SchedulerInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &SchedulerInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            error!(
                target: "warcrepo::scheduler",
                "commit task panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}

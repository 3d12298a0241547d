//! Fixed-size worker pool for locally dispatched invocations.
//!
//! Jobs are pushed onto a lock-free queue and picked up by a fixed set of
//! named worker threads. Idle workers park on a condition variable with a
//! short timeout, so a notification racing with a worker going idle only
//! delays the job instead of stranding it.
//!
//! # Shutdown
//!
//! [`WorkerPool::shutdown`] stops accepting new jobs; queued jobs still
//! run. Admission and the shutdown flag are both decided under the pool
//! mutex, and a worker only exits after seeing an empty queue under that
//! same mutex, so an accepted job always runs. [`WorkerPool::shutdown_and_wait`] additionally joins the workers
//! within a deadline. Dropping the pool shuts it down without waiting.

use crate::error::{Error, Result};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const IDLE_PARK: Duration = Duration::from_millis(50);

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    queue: SegQueue<Job>,
    pending: AtomicUsize,
    executed: AtomicU64,
    live_workers: AtomicUsize,
    shutdown: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// Fixed pool of worker threads.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `workers` threads named `{prefix}-worker-{n}`.
    ///
    /// Fails if `workers` is zero or a thread cannot be spawned.
    pub fn new(workers: usize, prefix: &str) -> Result<Self> {
        if workers == 0 {
            return Err(Error::internal("worker pool needs at least one thread"));
        }
        let inner = Arc::new(PoolInner {
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            executed: AtomicU64::new(0),
            live_workers: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        });
        let pool = Self {
            inner,
            workers,
            handles: Mutex::new(Vec::with_capacity(workers)),
        };
        for index in 0..workers {
            pool.spawn_worker(format!("{prefix}-worker-{index}"))?;
        }
        tracing::debug!(workers, prefix, "worker pool started");
        Ok(pool)
    }

    fn spawn_worker(&self, name: String) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        inner.live_workers.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            worker_loop(&inner);
            inner.live_workers.fetch_sub(1, Ordering::AcqRel);
        });
        match spawned {
            Ok(handle) => {
                self.handles.lock().push(handle);
                Ok(())
            }
            Err(err) => {
                self.inner.live_workers.fetch_sub(1, Ordering::AcqRel);
                self.shutdown();
                Err(Error::internal(format!("failed to spawn worker {name}")).with_source(err))
            }
        }
    }

    /// Queues a job.
    ///
    /// Returns the job back if the pool is shutting down.
    pub fn spawn<F>(&self, job: F) -> std::result::Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        let _guard = self.inner.mutex.lock();
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(job);
        }
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.queue.push(Box::new(job));
        self.inner.condvar.notify_one();
        Ok(())
    }

    /// Returns the number of queued jobs not yet picked up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Returns the number of jobs run to completion.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.inner.executed.load(Ordering::Acquire)
    }

    /// Returns the configured number of workers.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting jobs. Queued jobs still run.
    pub fn shutdown(&self) {
        let _guard = self.inner.mutex.lock();
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
    }

    /// Shuts down and joins the workers.
    ///
    /// Returns `false` if workers were still running when `timeout` elapsed.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();
        let deadline = Instant::now() + timeout;
        while self.inner.live_workers.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            {
                let _guard = self.inner.mutex.lock();
                self.inner.condvar.notify_all();
            }
            thread::sleep(Duration::from_millis(5).min(remaining));
        }
        for handle in self.handles.lock().drain(..) {
            let _ = handle.join();
        }
        true
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(job) = inner.queue.pop() {
            inner.pending.fetch_sub(1, Ordering::AcqRel);
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("worker job panicked");
            }
            inner.executed.fetch_add(1, Ordering::AcqRel);
            continue;
        }
        let mut guard = inner.mutex.lock();
        if !inner.queue.is_empty() {
            continue;
        }
        // Nothing can be admitted once the flag is set, so empty stays empty.
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        inner.condvar.wait_for(&mut guard, IDLE_PARK);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("live_workers", &self.inner.live_workers.load(Ordering::Relaxed))
            .field("pending", &self.pending())
            .field("executed", &self.executed())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;

    fn submit(pool: &WorkerPool, job: impl FnOnce() + Send + 'static) {
        assert!(pool.spawn(job).is_ok(), "job rejected");
    }

    #[test]
    fn runs_spawned_jobs() {
        let pool = WorkerPool::new(2, "test").expect("pool");
        let (tx, rx) = mpsc::channel();
        for i in 0..16 {
            let tx = tx.clone();
            submit(&pool, move || tx.send(i).expect("send"));
        }
        let mut seen: Vec<i32> = (0..16).map(|_| rx.recv().expect("recv")).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
        assert!(pool.shutdown_and_wait(Duration::from_secs(2)));
        assert_eq!(pool.executed(), 16);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(WorkerPool::new(0, "test").is_err());
    }

    #[test]
    fn rejects_jobs_after_shutdown() {
        let pool = WorkerPool::new(1, "test").expect("pool");
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(pool.spawn(|| {}).is_err());
        assert!(pool.shutdown_and_wait(Duration::from_secs(2)));
    }

    #[test]
    fn workers_are_named_with_prefix() {
        let pool = WorkerPool::new(3, "named").expect("pool");
        let (tx, rx) = mpsc::channel();
        for _ in 0..12 {
            let tx = tx.clone();
            submit(&pool, move || {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).expect("send");
            });
        }
        let names: HashSet<_> = (0..12)
            .filter_map(|_| rx.recv().expect("recv"))
            .collect();
        assert!(!names.is_empty());
        assert!(names.iter().all(|n| n.starts_with("named-worker-")));
        assert!(pool.shutdown_and_wait(Duration::from_secs(2)));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, "panic").expect("pool");
        submit(&pool, || panic!("job failure"));
        let (tx, rx) = mpsc::channel();
        submit(&pool, move || tx.send(7).expect("send"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).expect("recv"), 7);
        assert!(pool.shutdown_and_wait(Duration::from_secs(2)));
        assert_eq!(pool.executed(), 2);
    }

    #[test]
    fn every_accepted_job_runs_when_shutdown_races_spawn() {
        for round in 0..100 {
            let pool = Arc::new(WorkerPool::new(2, "race").expect("pool"));
            let ran = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let spawner = {
                let pool = Arc::clone(&pool);
                let ran = Arc::clone(&ran);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut accepted = 0;
                    for _ in 0..64 {
                        let ran = Arc::clone(&ran);
                        let job = move || {
                            ran.fetch_add(1, Ordering::AcqRel);
                        };
                        if pool.spawn(job).is_ok() {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            };

            barrier.wait();
            assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
            let accepted = spawner.join().expect("spawner");
            assert_eq!(ran.load(Ordering::Acquire), accepted, "round {round}");
            assert_eq!(pool.pending(), 0, "round {round}");
        }
    }

    #[test]
    fn queued_jobs_drain_on_shutdown() {
        let pool = WorkerPool::new(1, "drain").expect("pool");
        let (tx, rx) = mpsc::channel();
        for i in 0..8 {
            let tx = tx.clone();
            submit(&pool, move || {
                thread::sleep(Duration::from_millis(1));
                tx.send(i).expect("send");
            });
        }
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
        drop(tx);
        assert_eq!(rx.iter().count(), 8);
    }
}

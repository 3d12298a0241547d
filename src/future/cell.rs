//! Single-assignment result cell.
//!
//! [`ResultCell`] holds the outcome of one invocation: empty until a single
//! writer stores either a value or an error, then immutable. Writers race
//! through a compare-and-swap claim, so when several contexts try to
//! complete the same cell exactly one wins and every other attempt gets
//! [`ErrorKind::DuplicateCompletion`] back. The stored outcome is never
//! touched by a losing writer.
//!
//! [`ErrorKind::DuplicateCompletion`]: crate::error::ErrorKind::DuplicateCompletion
//!
//! Readers can block ([`ResultCell::wait`]), block with a deadline
//! ([`ResultCell::read_timeout`]), poll ([`ResultCell::try_read`]) or await
//! ([`ResultCell::ready`]).
//!
//! # Ordering
//!
//! The winning writer publishes the outcome before it flips the state and
//! notifies waiters while holding the waiter lock, so a reader that
//! observed an empty cell under that lock cannot miss the wakeup.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const FILLED: u8 = 2;
const FAILED: u8 = 3;

/// Observable state of a [`ResultCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    /// No outcome has been published yet.
    Empty,
    /// A value is stored.
    Filled,
    /// An error is stored.
    Failed,
}

/// Single-assignment synchronized holder of an invocation outcome.
pub struct ResultCell<T> {
    state: AtomicU8,
    outcome: OnceLock<Result<T>>,
    waiters: Mutex<Vec<Waker>>,
    cvar: Condvar,
}

impl<T> ResultCell<T> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            outcome: OnceLock::new(),
            waiters: Mutex::new(Vec::new()),
            cvar: Condvar::new(),
        }
    }

    /// Stores a value.
    ///
    /// Fails with `DuplicateCompletion` if the cell was already
    /// claimed by another writer; the stored outcome is left untouched.
    pub fn write_value(&self, value: T) -> Result<()> {
        self.write(Ok(value))
    }

    /// Stores an error.
    ///
    /// Fails with `DuplicateCompletion` if the cell was already
    /// claimed by another writer; the stored outcome is left untouched.
    pub fn write_error(&self, error: Error) -> Result<()> {
        self.write(Err(error))
    }

    fn write(&self, outcome: Result<T>) -> Result<()> {
        if let Err(current) =
            self.state
                .compare_exchange(EMPTY, WRITING, Ordering::AcqRel, Ordering::Acquire)
        {
            return Err(Error::duplicate_completion(format!(
                "result cell already {}",
                describe(current)
            )));
        }

        let terminal = if outcome.is_ok() { FILLED } else { FAILED };
        if self.outcome.set(outcome).is_err() {
            // Only the claim winner reaches this point.
            return Err(Error::internal("result cell outcome set twice"));
        }

        let wakers = {
            let mut waiters = self.waiters.lock();
            self.state.store(terminal, Ordering::Release);
            self.cvar.notify_all();
            std::mem::take(&mut *waiters)
        };
        tracing::trace!(state = describe(terminal), woken = wakers.len(), "result cell written");
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CellState {
        match self.state.load(Ordering::Acquire) {
            FILLED => CellState::Filled,
            FAILED => CellState::Failed,
            _ => CellState::Empty,
        }
    }

    /// Returns true once an outcome is stored.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.try_wait().is_some()
    }

    /// Borrows the stored outcome without blocking.
    #[must_use]
    pub fn try_wait(&self) -> Option<&Result<T>> {
        if self.state.load(Ordering::Acquire) >= FILLED {
            self.outcome.get()
        } else {
            None
        }
    }

    /// Blocks until an outcome is stored and borrows it.
    pub fn wait(&self) -> &Result<T> {
        if let Some(outcome) = self.try_wait() {
            return outcome;
        }
        let mut waiters = self.waiters.lock();
        loop {
            if let Some(outcome) = self.try_wait() {
                return outcome;
            }
            self.cvar.wait(&mut waiters);
        }
    }

    /// Blocks for at most `timeout` and borrows the outcome if one arrived.
    ///
    /// An elapsed deadline leaves the cell unchanged.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<&Result<T>> {
        if let Some(outcome) = self.try_wait() {
            return Some(outcome);
        }
        let deadline = Instant::now() + timeout;
        let mut waiters = self.waiters.lock();
        loop {
            if let Some(outcome) = self.try_wait() {
                return Some(outcome);
            }
            if self.cvar.wait_until(&mut waiters, deadline).timed_out() {
                return self.try_wait();
            }
        }
    }

    /// Returns a future that resolves to the stored outcome.
    pub fn ready(&self) -> Ready<'_, T> {
        Ready { cell: self }
    }

    fn register_waker(&self, waker: &Waker) -> Option<&Result<T>> {
        let mut waiters = self.waiters.lock();
        // Re-check under the lock: the writer flips state while holding it.
        if let Some(outcome) = self.try_wait() {
            return Some(outcome);
        }
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
        None
    }
}

impl<T: Clone> ResultCell<T> {
    /// Blocks until an outcome is stored and returns a copy of it.
    ///
    /// Repeatable: every call returns the same outcome.
    pub fn read(&self) -> Result<T> {
        self.wait().clone()
    }

    /// Blocks for at most `timeout`; `None` if the deadline elapsed first.
    pub fn read_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        self.wait_timeout(timeout).cloned()
    }

    /// Returns a copy of the outcome if one is stored.
    #[must_use]
    pub fn try_read(&self) -> Option<Result<T>> {
        self.try_wait().cloned()
    }
}

impl<T> Default for ResultCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ResultCell");
        d.field("state", &self.state());
        if let Some(outcome) = self.try_wait() {
            d.field("outcome", outcome);
        }
        d.finish()
    }
}

/// Future returned by [`ResultCell::ready`].
#[must_use = "futures do nothing unless polled"]
pub struct Ready<'a, T> {
    cell: &'a ResultCell<T>,
}

impl<'a, T> Future for Ready<'a, T> {
    type Output = &'a Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let cell = self.cell;
        if let Some(outcome) = cell.try_wait() {
            return Poll::Ready(outcome);
        }
        match cell.register_waker(cx.waker()) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Ready<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ready")
            .field("state", &self.cell.state())
            .finish()
    }
}

const fn describe(state: u8) -> &'static str {
    match state {
        EMPTY => "empty",
        WRITING => "being written",
        FILLED => "filled",
        FAILED => "failed",
        _ => "invalid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::task::Wake;
    use std::thread;

    struct ThreadWaker(thread::Thread);

    impl Wake for ThreadWaker {
        fn wake(self: Arc<Self>) {
            self.0.unpark();
        }
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        let mut fut = std::pin::pin!(fut);
        let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
        let mut cx = Context::from_waker(&waker);
        loop {
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(out) => return out,
                Poll::Pending => thread::park(),
            }
        }
    }

    #[test]
    fn starts_empty() {
        let cell = ResultCell::<u32>::new();
        assert_eq!(cell.state(), CellState::Empty);
        assert!(!cell.is_ready());
        assert!(cell.try_read().is_none());
    }

    #[test]
    fn value_write_then_read() {
        let cell = ResultCell::new();
        cell.write_value(5_i64).expect("first write");
        assert_eq!(cell.state(), CellState::Filled);
        assert_eq!(cell.read().expect("value"), 5);
        assert_eq!(cell.read().expect("value"), 5);
    }

    #[test]
    fn error_write_then_read() {
        let cell = ResultCell::<i64>::new();
        cell.write_error(Error::remote_failure("disk full"))
            .expect("first write");
        assert_eq!(cell.state(), CellState::Failed);
        let err = cell.read().expect_err("stored failure");
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert_eq!(err.message(), Some("disk full"));
    }

    #[test]
    fn second_write_is_rejected_and_outcome_kept() {
        let cell = ResultCell::new();
        cell.write_value(1_u8).expect("first write");

        let err = cell.write_value(2).expect_err("second value");
        assert!(err.is_duplicate_completion());
        let err = cell
            .write_error(Error::remote_failure("late"))
            .expect_err("late error");
        assert!(err.is_duplicate_completion());
        assert!(err.to_string().contains("filled"));

        assert_eq!(cell.read().expect("kept"), 1);
        assert_eq!(cell.state(), CellState::Filled);
    }

    #[test]
    fn blocked_reader_is_woken() {
        let cell = Arc::new(ResultCell::new());
        let reader = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.read())
        };
        thread::sleep(Duration::from_millis(20));
        cell.write_value(String::from("done")).expect("write");
        let out = reader.join().expect("reader thread");
        assert_eq!(out.expect("value"), "done");
    }

    #[test]
    fn read_timeout_elapses_on_empty_cell() {
        let cell = ResultCell::<u8>::new();
        assert!(cell.read_timeout(Duration::from_millis(10)).is_none());
        assert_eq!(cell.state(), CellState::Empty);
        cell.write_value(3).expect("write after timeout");
        assert_eq!(
            cell.read_timeout(Duration::from_millis(10))
                .expect("ready")
                .expect("value"),
            3
        );
    }

    #[test]
    fn ready_future_resolves_after_write() {
        let cell = Arc::new(ResultCell::new());
        let writer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cell.write_value(9_u16).expect("write");
            })
        };
        let out = block_on(cell.ready());
        assert_eq!(*out.as_ref().expect("value"), 9);
        writer.join().expect("writer thread");
    }

    #[test]
    fn racing_writers_have_one_winner() {
        const WRITERS: usize = 8;
        let cell = Arc::new(ResultCell::new());
        let barrier = Arc::new(Barrier::new(WRITERS));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    barrier.wait();
                    if cell.write_value(i).is_ok() {
                        wins.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        assert_eq!(wins.load(Ordering::Relaxed), 1);
        let stored = cell.read().expect("value");
        assert!(stored < WRITERS);
        assert_eq!(cell.read().expect("value"), stored);
    }
}

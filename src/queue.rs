//! The shared worklist backing a run: pending inputs plus a live-work counter.
//!
//! [`WorkQueue`] is the single piece of engine-owned state shared between the
//! worker threads and the reducer. It holds the set of inputs that have been
//! enqueued but not yet dispatched, together with the count of inputs that are
//! currently in flight (dequeued, but whose results the reducer has not yet
//! finished processing). Both live behind one mutex, so the queue size and the
//! in-flight count are always observed together.
//!
//! ## Live work
//!
//! The sum of pending inputs and in-flight inputs is the *live-work* count.
//! A run is over exactly when it reaches zero. An input stays in flight until
//! the reducer retires it via [`complete`](WorkQueue::complete) or
//! [`retire`](WorkQueue::retire) - not when its task merely returns -
//! so live work never transiently touches zero while follow-on inputs are
//! about to be enqueued for a just-finished task.
//!
//! ## Dispatch order
//!
//! Pending inputs are stored in a `VecDeque` and dispatched front to back,
//! but consumers must not rely on this: with several workers the apparent
//! completion order is driven by task latency, and the dispatch order is
//! deliberately left unspecified.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use thiserror::Error;

/// An error returned from [`WorkQueue::dequeue`].
///
/// Either variant tells a worker that no input will ever be handed to it
/// again and it should exit its loop.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
    /// The queue is empty and no work is in flight, so no more inputs can
    /// ever appear.
    #[error("work queue is drained")]
    Drained,
    /// The run was aborted; the pending set has been cleared and no further
    /// inputs will be dispatched.
    #[error("run was aborted")]
    Aborted,
}

/// An unordered, dynamic collection of pending inputs plus the live-work
/// counter for a single run.
///
/// Workers call [`dequeue`](Self::dequeue) concurrently; the reducer calls
/// [`complete`](Self::complete), [`retire`](Self::retire) and
/// [`abort`](Self::abort). All state transitions happen under one internal
/// mutex, and a condition variable wakes workers that are blocked waiting for
/// the queue to become non-empty (or for the run to end).
pub struct WorkQueue<I> {
    state: Mutex<QueueState<I>>,
    work_available: Condvar,
}

struct QueueState<I> {
    pending: VecDeque<I>,
    in_flight: usize,
    aborted: bool,
}

impl<I> QueueState<I> {
    fn live(&self) -> usize {
        self.pending.len() + self.in_flight
    }
}

impl<I> Default for WorkQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> WorkQueue<I> {
    /// Creates an empty queue with zero live work.
    pub fn new() -> WorkQueue<I> {
        WorkQueue {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: 0,
                aborted: false,
            }),
            work_available: Condvar::new(),
        }
    }

    /// Enqueues the initial inputs of a run and returns how many were added.
    ///
    /// Intended to be called once, before any worker starts dequeuing; it
    /// does not wake blocked workers.
    pub fn seed(&self, items: impl IntoIterator<Item = I>) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.pending.len();
        state.pending.extend(items);
        state.pending.len() - before
    }

    /// Removes one pending input and marks it in flight.
    ///
    /// Blocks while the queue is momentarily empty but live work remains,
    /// since an in-flight input may still produce follow-on inputs. Returns
    /// [`DequeueError::Drained`] once live work reaches zero, or
    /// [`DequeueError::Aborted`] once the run has been aborted - in both
    /// cases the calling worker can never receive another input.
    pub fn dequeue(&self) -> Result<I, DequeueError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(input) = state.pending.pop_front() {
                state.in_flight += 1;
                return Ok(input);
            }
            if state.aborted {
                return Err(DequeueError::Aborted);
            }
            if state.in_flight == 0 {
                return Err(DequeueError::Drained);
            }
            state = self.work_available.wait(state).unwrap();
        }
    }

    /// Retires one in-flight input, enqueuing its follow-on inputs first.
    ///
    /// The enqueue and the in-flight decrement happen in a single critical
    /// section, with the new entries counted before the completed one is
    /// released, so the live-work count cannot dip to zero while follow-on
    /// work is about to appear. Wakes blocked workers when new work arrived
    /// or when live work reached zero.
    ///
    /// After [`abort`](Self::abort), follow-on inputs are dropped and only
    /// the decrement applies.
    pub fn complete(&self, follow_on: impl IntoIterator<Item = I>) {
        let mut state = self.state.lock().unwrap();
        let mut enqueued = 0usize;
        if !state.aborted {
            for input in follow_on {
                state.pending.push_back(input);
                enqueued += 1;
            }
        }
        state.in_flight -= 1;
        if enqueued > 0 || state.live() == 0 {
            drop(state);
            self.work_available.notify_all();
        }
    }

    /// Retires one in-flight input without enqueuing anything.
    ///
    /// Used while draining results that arrive after the run has latched a
    /// failure.
    pub fn retire(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        if state.live() == 0 {
            drop(state);
            self.work_available.notify_all();
        }
    }

    /// Aborts the run: clears the pending set, latches the aborted flag and
    /// retires the in-flight input whose result triggered the abort.
    ///
    /// Inputs already dispatched to other workers are unaffected; their
    /// results are expected to be drained with [`retire`](Self::retire).
    /// All blocked workers are woken so they can observe the abort and exit.
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        state.aborted = true;
        state.in_flight -= 1;
        drop(state);
        self.work_available.notify_all();
    }

    /// Returns the current live-work count (pending plus in flight).
    ///
    /// **Note**: this is primarily intended for diagnostics; the returned
    /// value may be outdated by the time the caller inspects it.
    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live()
    }
}

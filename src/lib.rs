//! Concurrent task engine over a dynamic, self-extending worklist.
//!
//! This crate processes a worklist of opaque inputs with a bounded pool of
//! worker threads and feeds every outcome through a single serialized
//! decision point - the *manager* - which decides whether to enqueue further
//! inputs, record output into caller-owned storage, or abort the run with an
//! error. It is built for recursive, graph-shaped workloads such as
//! link-following crawls, where processing one input discovers more.
//!
//! # Key Components
//!
//! - [`run`] - the full engine: seeds, a task function, and a manager that
//!   may return follow-on inputs on every outcome
//! - [`try_for_each`] - bounded-parallel pass over a fixed item list with
//!   first-error abort
//! - [`try_join_all`] - bounded-parallel pass over a fixed list of
//!   zero-argument work items
//! - [`queue::WorkQueue`] - the shared pending set plus live-work counter
//!   underpinning all of the above
//!
//! # Execution Model
//!
//! Up to `max_workers` threads run task functions genuinely in parallel; the
//! manager runs on the caller's thread and is never invoked concurrently
//! with itself, so it may hold arbitrary unsynchronized state (a visited
//! set, retry counters). The run ends exactly when the live-work count -
//! pending plus in-flight inputs - reaches zero, or when the first manager
//! error has been latched and in-flight work has drained. Tasks are never
//! preempted: an error only stops *further* scheduling.
//!
//! # Ordering
//!
//! There is no ordering guarantee among task completions, and manager
//! invocations follow completion order, not enqueue order. Callers needing
//! deduplication or retries implement them in the manager; the engine makes
//! both trivial by guaranteeing serialized invocation.

pub mod batch;
pub mod engine;
pub mod queue;

pub use batch::{try_for_each, try_join_all};
pub use engine::{max_parallelism, run};

//! The engine core: bounded worker pool plus the serialized reducer.
//!
//! [`run`] drives a dynamic worklist to completion. A fixed number of worker
//! threads repeatedly dequeue one input from the shared [`WorkQueue`], invoke
//! the task function and forward the outcome over a channel to the reducer.
//! The reducer consumes outcomes one at a time on the caller's thread,
//! invoking the user-supplied manager, enqueuing any follow-on inputs it
//! returns, or latching the first error and shutting the run down.
//!
//! Because the manager executes on exactly one thread, it may hold and mutate
//! arbitrary private state (a visited set, retry counters) without any
//! synchronization. This is reflected in the types: the manager closure
//! carries no `Send` or `Sync` bound.

use std::{sync::mpsc, thread};

use crate::queue::WorkQueue;

/// Returns the available parallelism of the system, a convenient value to
/// pass as `max_workers`.
///
/// Falls back to 8 when the parallelism cannot be determined.
pub fn max_parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(8)
}

/// Processes a dynamic, self-extending worklist with a bounded pool of
/// concurrent workers.
///
/// Each seed input, and each input the manager later returns, is dispatched
/// exactly once to the `task` function on one of `max_workers` worker
/// threads. Every outcome is handed to the `manager`, which runs serialized
/// on the caller's thread and decides what happens next:
///
/// - `Ok(follow_on)`: the returned inputs are enqueued and the run continues;
/// - `Err(e)`: `e` is latched as the run's result, no further inputs are
///   enqueued or dispatched, and the run ends once in-flight tasks have
///   drained.
///
/// Already-running tasks are never preempted: after an error their results
/// are still delivered and silently discarded. A task that wants to stop
/// early must observe a cancellation signal owned by the caller; the engine
/// exposes none of its own.
///
/// Task errors are opaque to the engine. They are forwarded verbatim to the
/// manager, which may convert them into the run's failure or swallow them,
/// for instance by re-enqueuing the same input as a retry.
///
/// The caller blocks until the run ends and receives the first latched
/// manager error, or `Ok(())`. An empty seed set returns `Ok(())` at once
/// without invoking the task or the manager.
///
/// # Panics
///
/// Panics if `max_workers` is 0.
///
/// # Examples
///
/// Crawling a small in-memory link graph, with the visited set owned by the
/// manager:
///
/// ```
/// use std::collections::{HashMap, HashSet};
///
/// let site = HashMap::from([
///     ("/", vec!["/a"]),
///     ("/a", vec!["/b"]),
///     ("/b", vec!["/"]),
/// ]);
///
/// let mut seen = HashSet::from(["/"]);
/// let res: Result<(), String> = workgraph::run(
///     4,
///     |page: &&str| site.get(*page).cloned().ok_or_else(|| format!("missing {page}")),
///     |_page, outcome| {
///         let links = outcome?;
///         Ok(links.into_iter().filter(|l| seen.insert(*l)).collect())
///     },
///     ["/"],
/// );
/// assert!(res.is_ok());
/// assert_eq!(seen.len(), 3);
/// ```
pub fn run<I, O, E, T, M>(
    max_workers: usize,
    task: T,
    mut manager: M,
    seeds: impl IntoIterator<Item = I>,
) -> Result<(), E>
where
    I: Send,
    O: Send,
    E: Send,
    T: Fn(&I) -> Result<O, E> + Sync,
    M: FnMut(I, Result<O, E>) -> Result<Vec<I>, E>,
{
    assert_ne!(max_workers, 0, "run requires at least one worker");

    let queue = WorkQueue::new();
    if queue.seed(seeds) == 0 {
        return Ok(());
    }

    let mut first_error = None;
    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(I, Result<O, E>)>();
        for i in 0..max_workers {
            let tx = tx.clone();
            let queue = &queue;
            let task = &task;
            thread::Builder::new()
                .name(format!("workgraph-worker-{i}"))
                .spawn_scoped(scope, move || worker_loop(queue, task, tx))
                .expect("spawn worker thread");
        }
        // The reducer's receiver disconnects once every worker has exited
        // and dropped its sender clone.
        drop(tx);

        while let Ok((input, outcome)) = rx.recv() {
            if first_error.is_some() {
                log::debug!("discarding a task result that arrived after the failure latch");
                queue.retire();
                continue;
            }
            match manager(input, outcome) {
                Ok(follow_on) => {
                    log::trace!("manager returned {} follow-on input(s)", follow_on.len());
                    queue.complete(follow_on);
                }
                Err(err) => {
                    first_error = Some(err);
                    queue.abort();
                }
            }
        }
    });

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// One worker: dequeue an input, run the task, forward the outcome to the
/// reducer, until no input will ever be handed out again.
fn worker_loop<I, O, E, T>(queue: &WorkQueue<I>, task: &T, results: mpsc::Sender<(I, Result<O, E>)>)
where
    T: Fn(&I) -> Result<O, E>,
{
    while let Ok(input) = queue.dequeue() {
        let outcome = task(&input);
        if results.send((input, outcome)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::{max_parallelism, run};

    #[test]
    fn test_max_parallelism() {
        assert!(max_parallelism() >= 1);
    }

    #[test]
    fn test_empty_seeds_touch_nothing() {
        let res: Result<(), String> = run(
            4,
            |_: &u32| -> Result<u32, String> { panic!("task must not run") },
            |_, _| panic!("manager must not run"),
            std::iter::empty::<u32>(),
        );
        assert_eq!(res, Ok(()));
    }

    #[test]
    #[should_panic(expected = "at least one worker")]
    fn test_zero_workers_is_invalid() {
        let _: Result<(), String> = run(0, |n: &u32| Ok(*n), |_, _| Ok(Vec::new()), [1]);
    }

    #[test]
    fn test_dynamic_link_graph() {
        let site: HashMap<&str, Vec<&str>> = HashMap::from([
            ("/", vec!["/a"]),
            ("/a", vec!["/b1", "/b2"]),
            ("/b1", vec!["/c"]),
            ("/b2", vec!["/c"]),
            ("/c", vec!["/"]),
        ]);

        let fetches = AtomicUsize::new(0);
        let mut visited = HashSet::from(["/"]);
        let mut results: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut manager_calls = 0usize;

        let res: Result<(), String> = run(
            4,
            |page: &&str| {
                fetches.fetch_add(1, Ordering::Relaxed);
                site.get(*page)
                    .cloned()
                    .ok_or_else(|| format!("missing page {page}"))
            },
            |page, outcome| {
                manager_calls += 1;
                let links = outcome?;
                let mut follow_on = Vec::new();
                for link in &links {
                    if visited.insert(*link) {
                        follow_on.push(*link);
                    }
                }
                results.insert(page, links);
                Ok(follow_on)
            },
            ["/"],
        );

        assert_eq!(res, Ok(()));
        assert_eq!(fetches.load(Ordering::Relaxed), 5);
        assert_eq!(manager_calls, 5);
        assert_eq!(results.len(), 5);
        assert_eq!(results["/a"], vec!["/b1", "/b2"]);
        assert_eq!(results["/c"], vec!["/"]);
    }

    #[test]
    fn test_manager_retry_then_success() {
        let attempts = AtomicUsize::new(0);
        let res: Result<(), String> = run(
            2,
            |_: &&str| {
                if attempts.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(())
                }
            },
            |input, outcome| match outcome {
                Ok(()) => Ok(Vec::new()),
                Err(_) => Ok(vec![input]),
            },
            ["/flaky"],
        );
        assert_eq!(res, Ok(()));
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_manager_retry_then_give_up() {
        let attempts = AtomicUsize::new(0);
        let mut tried = 0usize;
        let res: Result<(), String> = run(
            2,
            |_: &&str| -> Result<(), String> {
                attempts.fetch_add(1, Ordering::Relaxed);
                Err("fetch failed".to_string())
            },
            |input, outcome| match outcome {
                Ok(()) => Ok(Vec::new()),
                Err(_) if tried < 3 => {
                    tried += 1;
                    Ok(vec![input])
                }
                Err(err) => Err(err),
            },
            ["/flaky"],
        );
        assert_eq!(res, Err("fetch failed".to_string()));
        // Three retries after the initial attempt, then the error surfaces.
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_first_error_suppresses_follow_on() {
        let started = AtomicUsize::new(0);
        let res: Result<(), String> = run(
            4,
            |n: &u32| {
                started.fetch_add(1, Ordering::Relaxed);
                Ok(*n + 1)
            },
            |_, _| Err("boom".to_string()),
            [0u32],
        );
        assert_eq!(res, Err("boom".to_string()));
        // The manager failed on the sole seed; nothing else was ever
        // enqueued, let alone dispatched.
        assert_eq!(started.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_results_after_latch_are_discarded() {
        let mut manager_calls = 0usize;
        let res: Result<(), String> = run(
            3,
            |d: &u64| {
                thread::sleep(Duration::from_millis(*d));
                Ok(())
            },
            |_, _| {
                manager_calls += 1;
                Err("first".to_string())
            },
            [10u64, 60, 120],
        );
        assert_eq!(res, Err("first".to_string()));
        // The error latches on the first result; the two in-flight tasks
        // still finish, and their results are drained without reaching the
        // manager.
        assert_eq!(manager_calls, 1);
    }

    #[test]
    fn test_bounded_parallelism() {
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let res: Result<(), String> = run(
            3,
            |_: &u32| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            |_, _| Ok(Vec::new()),
            0..20u32,
        );
        assert_eq!(res, Ok(()));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_manager_runs_serialized_on_caller_thread() {
        let caller = thread::current().id();
        let mut calls = 0usize;
        let res: Result<(), String> = run(
            8,
            |n: &u32| Ok(*n),
            |_, outcome| {
                assert_eq!(thread::current().id(), caller);
                calls += 1;
                outcome.map(|_| Vec::new())
            },
            0..50u32,
        );
        assert_eq!(res, Ok(()));
        assert_eq!(calls, 50);
    }

    #[test]
    fn test_random_fan_out_drains() {
        let tasks = AtomicUsize::new(0);
        let mut spawned = 64usize;
        let mut manager_calls = 0usize;
        let res: Result<(), String> = run(
            4,
            |n: &u64| {
                tasks.fetch_add(1, Ordering::Relaxed);
                Ok(n.wrapping_mul(31))
            },
            |_, outcome| {
                manager_calls += 1;
                let _ = outcome?;
                let mut follow_on = Vec::new();
                if spawned < 400 {
                    for _ in 0..fastrand::usize(0..3) {
                        spawned += 1;
                        follow_on.push(fastrand::u64(..));
                    }
                }
                Ok(follow_on)
            },
            0..64u64,
        );
        assert_eq!(res, Ok(()));
        assert_eq!(tasks.load(Ordering::Relaxed), manager_calls);
        assert!(manager_calls >= 64);
    }
}

//! Bounded-parallel passes over static worklists.
//!
//! These are thin specializations of the engine for the common case where no
//! follow-on work is ever generated: a fixed list of items is processed by at
//! most `max_workers` threads at a time, and the first error aborts further
//! scheduling.
//!
//! - [`try_for_each`] - run a fallible task once per item
//! - [`try_join_all`] - run a list of zero-argument work items
//!
//! Both share the engine's cancellation model: an error stops new dispatches,
//! but items already executing run to completion.

use std::sync::Mutex;

use crate::engine;

/// Runs `task` once for every item, with at most `max_workers` invocations
/// executing concurrently.
///
/// Returns the first task error, after which no further items are
/// dispatched; items already executing finish normally. An empty item list
/// returns `Ok(())` without invoking the task.
///
/// # Panics
///
/// Panics if `max_workers` is 0.
///
/// # Examples
///
/// ```
/// let total = std::sync::atomic::AtomicU32::new(0);
/// let res: Result<(), String> = workgraph::try_for_each(4, 1..=10u32, |n| {
///     total.fetch_add(*n, std::sync::atomic::Ordering::Relaxed);
///     Ok(())
/// });
/// assert!(res.is_ok());
/// assert_eq!(total.load(std::sync::atomic::Ordering::Relaxed), 55);
/// ```
pub fn try_for_each<I, E, T>(
    max_workers: usize,
    items: impl IntoIterator<Item = I>,
    task: T,
) -> Result<(), E>
where
    I: Send,
    E: Send,
    T: Fn(&I) -> Result<(), E> + Sync,
{
    engine::run(max_workers, task, |_, outcome| outcome.map(|()| Vec::new()), items)
}

/// Runs every function once, with at most `max_workers` of them executing
/// concurrently.
///
/// Returns the first error any function produces, after which no further
/// functions are started; functions already executing finish normally. An
/// empty list returns `Ok(())`.
///
/// # Panics
///
/// Panics if `max_workers` is 0.
///
/// # Examples
///
/// ```
/// let greetings = std::sync::Mutex::new(Vec::new());
/// let fns: Vec<Box<dyn FnOnce() -> Result<(), String> + Send + '_>> = vec![
///     Box::new(|| {
///         greetings.lock().unwrap().push("hello");
///         Ok(())
///     }),
///     Box::new(|| {
///         greetings.lock().unwrap().push("world");
///         Ok(())
///     }),
/// ];
/// let res = workgraph::try_join_all(2, fns);
/// assert!(res.is_ok());
/// assert_eq!(greetings.lock().unwrap().len(), 2);
/// ```
pub fn try_join_all<E, F>(
    max_workers: usize,
    fns: impl IntoIterator<Item = F>,
) -> Result<(), E>
where
    E: Send,
    F: FnOnce() -> Result<(), E> + Send,
{
    engine::run(
        max_workers,
        |slot: &Mutex<Option<F>>| {
            // The engine dispatches every input exactly once, so the slot is
            // always occupied here.
            let f = slot
                .lock()
                .unwrap()
                .take()
                .expect("work item dispatched once");
            f()
        },
        |_, outcome| outcome.map(|()| Vec::new()),
        fns.into_iter().map(|f| Mutex::new(Some(f))),
    )
}

//! Frontier: the bounded, deduplicating work queue of a crawl
//!
//! This module handles:
//! - Idempotent enqueue keyed on each task's resolved URL
//! - Capacity limits with a non-fatal `QueueFull` signal
//! - A fixed pool of workers that fetch, hand off, and feed follow-ups back
//! - Drain detection: the run ends once nothing is pending or in flight
//! - Cooperative shutdown via [`Frontier::close`]

use crate::crawler::fetcher::Transport;
use crate::crawler::task::SearchTask;
use crate::{FetchError, FrontierError};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;

/// Counters describing a finished [`Frontier::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierReport {
    /// Tasks that went through fetch and handler
    pub completed: u64,

    /// Enqueues ignored because the URL was already seen
    pub duplicates: u64,

    /// Follow-ups dropped because the queue was full or closed
    pub dropped: u64,

    /// Tasks still pending when the run stopped early
    pub abandoned: u64,
}

#[derive(Default)]
struct FrontierState {
    pending: VecDeque<SearchTask>,
    seen: HashSet<String>,
    in_flight: usize,
    closed: bool,
    completed: u64,
    duplicates: u64,
    dropped: u64,
}

/// Bounded work queue drained by a fixed pool of workers
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    capacity: usize,
    transport: Arc<dyn Transport>,
    retries: u32,
    retry_delay: Duration,
}

impl Frontier {
    /// Creates an empty frontier holding at most `capacity` pending tasks
    pub fn new(capacity: usize, transport: Arc<dyn Transport>) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            transport,
            retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    /// Retries transient fetch failures up to `retries` times, `delay` apart
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a task unless its URL was already enqueued in this session
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The task was queued
    /// * `Ok(false)` - Duplicate; silently ignored
    /// * `Err(FrontierError::QueueFull)` - At capacity; the task was not
    ///   recorded as seen and may be submitted again later
    /// * `Err(FrontierError::Closed)` - The frontier no longer accepts work
    pub fn enqueue(&self, task: SearchTask) -> Result<bool, FrontierError> {
        {
            let mut state = self.lock();

            if state.closed {
                return Err(FrontierError::Closed {
                    url: task.identity().to_string(),
                });
            }

            if state.seen.contains(task.identity()) {
                state.duplicates += 1;
                return Ok(false);
            }

            if state.pending.len() >= self.capacity {
                return Err(FrontierError::QueueFull {
                    capacity: self.capacity,
                    url: task.identity().to_string(),
                });
            }

            state.seen.insert(task.identity().to_string());
            tracing::trace!("Enqueued {}", task);
            state.pending.push_back(task);
        }

        self.notify.notify_waiters();
        Ok(true)
    }

    /// Stops accepting work; workers finish their current task and exit
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of tasks waiting to be fetched
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of tasks currently being processed
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Number of distinct URLs accepted in this session
    pub fn seen(&self) -> usize {
        self.lock().seen.len()
    }

    /// Drains the frontier with `workers` concurrent workers
    ///
    /// Each worker repeatedly takes a task, fetches its URL, passes the
    /// outcome to `handler`, and enqueues whatever follow-up tasks the handler
    /// returns. Returns once no task is pending or in flight, or once the
    /// frontier is closed and in-flight tasks have finished.
    pub async fn run<H>(self: &Arc<Self>, workers: usize, handler: H) -> FrontierReport
    where
        H: Fn(&SearchTask, Result<Vec<u8>, FetchError>) -> Vec<SearchTask> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let mut pool = JoinSet::new();

        for id in 0..workers.max(1) {
            let frontier = Arc::clone(self);
            let handler = Arc::clone(&handler);
            pool.spawn(async move { frontier.work(id, handler.as_ref()).await });
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Frontier worker failed: {}", e);
            }
        }

        let state = self.lock();
        FrontierReport {
            completed: state.completed,
            duplicates: state.duplicates,
            dropped: state.dropped,
            abandoned: state.pending.len() as u64,
        }
    }

    async fn work<H>(&self, id: usize, handler: &H)
    where
        H: Fn(&SearchTask, Result<Vec<u8>, FetchError>) -> Vec<SearchTask>,
    {
        tracing::trace!("Worker {} started", id);

        while let Some(task) = self.next_task().await {
            let _slot = InFlightSlot { frontier: self };

            let outcome = self.fetch(&task).await;
            for follow_up in handler(&task, outcome) {
                if let Err(e) = self.enqueue(follow_up) {
                    tracing::warn!("{}", e);
                    self.lock().dropped += 1;
                }
            }

            self.lock().completed += 1;
        }

        tracing::trace!("Worker {} finished", id);
    }

    /// Waits for the next task; `None` means the frontier is drained or closed
    async fn next_task(&self) -> Option<SearchTask> {
        loop {
            let notified = {
                let mut state = self.lock();

                if state.closed {
                    return None;
                }

                if let Some(task) = state.pending.pop_front() {
                    state.in_flight += 1;
                    return Some(task);
                }

                if state.in_flight == 0 {
                    drop(state);
                    // Wake the other idle workers so they observe the drain too
                    self.notify.notify_waiters();
                    return None;
                }

                // Registered before the lock is released, so no wakeup is lost
                self.notify.notified()
            };

            notified.await;
        }
    }

    async fn fetch(&self, task: &SearchTask) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.transport.get(task.url()).await {
                Err(e) if e.is_transient() && attempt < self.retries && !self.is_closed() => {
                    attempt += 1;
                    tracing::debug!(
                        "Retrying {} ({}/{}) after: {}",
                        task,
                        attempt,
                        self.retries,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Releases a worker's in-flight slot, even if the handler panics
struct InFlightSlot<'a> {
    frontier: &'a Frontier,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.frontier.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.frontier.notify.notify_waiters();
    }
}

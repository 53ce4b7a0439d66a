//! Task scheduling abstraction.
//!
//! The engine registers two kinds of scheduled work: the repeating
//! heartbeat tick and one-shot scroll-flush frames. Both go through a
//! [`Scheduler`] so production runs on tokio timers while tests drive a
//! virtual clock with no wall-clock delays. Cancellation is "remove the
//! task handle"; cancelling an unknown or finished handle is a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{Clock, ManualClock};

/// Opaque handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

pub trait Scheduler: Send + Sync {
    /// Run `task` every `period`, first firing one period from now.
    fn every(&self, period: Duration, task: Box<dyn FnMut() + Send>) -> TaskHandle;

    /// Run `task` once, `delay` from now.
    fn once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TaskHandle;

    /// Cancel a task. Safe to call from inside the task itself.
    fn cancel(&self, handle: TaskHandle);
}

// ---------------------------------------------------------------------------
// Tokio scheduler
// ---------------------------------------------------------------------------

/// Production scheduler backed by tokio timers.
///
/// Requires an ambient tokio runtime; without one, scheduling is dropped
/// with a debug log rather than panicking (telemetry must never take the
/// host down).
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, tokio::task::JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handle(&self) -> (u64, TaskHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        (id, TaskHandle(id))
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, task: Box<dyn FnMut() + Send>) -> TaskHandle {
        let (id, handle) = self.next_handle();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, repeating task not scheduled");
            return handle;
        };
        let join = runtime.spawn(async move {
            let mut task = task;
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately;
            // the contract is "first fire one period from now".
            interval.tick().await;
            loop {
                interval.tick().await;
                task();
            }
        });
        self.tasks.lock().unwrap().insert(id, join);
        handle
    }

    fn once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TaskHandle {
        let (id, handle) = self.next_handle();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, one-shot task not scheduled");
            return handle;
        };
        let tasks = Arc::clone(&self.tasks);
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
            tasks.lock().unwrap().remove(&id);
        });
        self.tasks.lock().unwrap().insert(id, join);
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some(join) = self.tasks.lock().unwrap().remove(&handle.0) {
            join.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Manual scheduler
// ---------------------------------------------------------------------------

enum TaskKind {
    Repeating {
        period: Duration,
        task: Box<dyn FnMut() + Send>,
    },
    Once(Box<dyn FnOnce() + Send>),
}

struct ManualTask {
    id: u64,
    due: DateTime<Utc>,
    kind: TaskKind,
}

/// Virtual-time scheduler for tests. Owns nothing but a task list; time
/// only moves inside [`advance`](Self::advance), which also steps the
/// shared [`ManualClock`] so timestamps and timers agree.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    next_id: AtomicU64,
    tasks: Mutex<Vec<ManualTask>>,
    cancelled: Mutex<HashSet<u64>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    /// Advance virtual time by `by`, running every task that comes due,
    /// in due order. Tasks may schedule or cancel tasks while running;
    /// newly scheduled work that falls inside the window runs too.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now()
            + chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());

        loop {
            let next = {
                let mut tasks = self.tasks.lock().unwrap();
                let idx = tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(i, _)| i);
                match idx {
                    Some(i) => tasks.remove(i),
                    None => break,
                }
            };

            if self.clock.now() < next.due {
                self.clock.set(next.due);
            }

            match next.kind {
                TaskKind::Once(task) => task(),
                TaskKind::Repeating { period, mut task } => {
                    task();
                    // The task may have cancelled itself; only then is it
                    // not re-armed.
                    if !self.cancelled.lock().unwrap().remove(&next.id) {
                        let due = next.due
                            + chrono::Duration::from_std(period)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                        self.tasks.lock().unwrap().push(ManualTask {
                            id: next.id,
                            due,
                            kind: TaskKind::Repeating { period, task },
                        });
                    }
                }
            }
        }

        if self.clock.now() < target {
            self.clock.set(target);
        }
    }

    /// Number of tasks currently armed.
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    fn push(&self, delay: Duration, kind: TaskKind) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let due = self.clock.now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.tasks.lock().unwrap().push(ManualTask { id, due, kind });
        TaskHandle(id)
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, period: Duration, task: Box<dyn FnMut() + Send>) -> TaskHandle {
        self.push(period, TaskKind::Repeating { period, task })
    }

    fn once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TaskHandle {
        self.push(delay, TaskKind::Once(task))
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t.id != handle.0);
        if tasks.len() == before {
            // Not in the list: either finished, or currently running and
            // cancelling itself.
            self.cancelled.lock().unwrap().insert(handle.0);
        }
    }
}

//! Cancellable, progress-reporting task wrapper.
//!
//! Every long operation in the engine runs inside a [`TrackableTask`]: a
//! named computation with a cancellation token, a percent progress sink, a
//! liveness heartbeat and a one-shot result. Task names are single-flight:
//! spawning under a name that already has an outstanding instance fails
//! synchronously with [`TaskError::Conflict`] and never queues or supersedes
//! the running task.

use crate::core::TOKIO_RUNTIME;
use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use lazy_static::lazy_static;
use log::{error, warn};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

lazy_static! {
    /// Names of currently outstanding tasks, mapped to their task id.
    static ref ACTIVE_TASKS: DashMap<String, Uuid> = DashMap::new();
}

/// Synchronous failures allowed to cross the public API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A task with the same name is already outstanding.
    Conflict { name: String },
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Conflict { name } => {
                write!(f, "task '{name}' is already running")
            },
        }
    }
}

impl std::error::Error for TaskError {}

/// Marker error for cooperative cancellation. Logged at warning level at the
/// task boundary and resolved to "no result" rather than a caller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canceled;

impl fmt::Display for Canceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation canceled")
    }
}

impl std::error::Error for Canceled {}

/// True if `err` is the cooperative-cancellation marker.
pub fn is_canceled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Canceled>().is_some()
}

/// Handle passed into the task body for cancellation checks and progress.
#[derive(Clone)]
pub struct TaskContext {
    token: CancellationToken,
    progress: Arc<AtomicU32>,
    heartbeat: Arc<AtomicU32>,
}

impl TaskContext {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            progress: Arc::new(AtomicU32::new(0)),
            heartbeat: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Detached context for running pipeline stages outside a spawned task
    /// (tests, synchronous callers).
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancellation checkpoint for loop and pipeline-stage boundaries.
    #[inline]
    pub fn checkpoint(&self) -> anyhow::Result<()> {
        if self.token.is_cancelled() {
            Err(anyhow!(Canceled))
        } else {
            Ok(())
        }
    }

    /// Report progress as a 0-100 percentage.
    pub fn set_progress(&self, percent: u32) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }

    pub fn tick_heartbeat(&self) {
        self.heartbeat.fetch_add(1, Ordering::Relaxed);
    }
}

struct Completion<T> {
    done: Mutex<bool>,
    cond: Condvar,
    result: OnceCell<Option<T>>,
}

/// A named, cancellable, progress-reporting computation.
pub struct TrackableTask<T> {
    id: Uuid,
    name: String,
    context: TaskContext,
    completion: Arc<Completion<T>>,
    listeners: Mutex<Vec<Sender<Option<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> TrackableTask<T> {
    /// Spawn `body` under `name`. Fails synchronously with
    /// [`TaskError::Conflict`] if a task with this name is outstanding.
    ///
    /// The body's error outcome never reaches the caller: cancellation is
    /// logged at warning level, any other error at error level, and both
    /// resolve the task to a `None` result.
    pub fn spawn<F>(name: &str, body: F) -> Result<Arc<Self>, TaskError>
    where
        F: FnOnce(TaskContext) -> anyhow::Result<T> + Send + 'static,
    {
        let id = Uuid::new_v4();

        // Reserve the name first; entry() makes the check-and-insert atomic.
        {
            let entry = ACTIVE_TASKS.entry(name.to_string());
            match entry {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(TaskError::Conflict { name: name.to_string() });
                },
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(id);
                },
            }
        }

        let task = Arc::new(TrackableTask {
            id,
            name: name.to_string(),
            context: TaskContext::new(CancellationToken::new()),
            completion: Arc::new(Completion {
                done: Mutex::new(false),
                cond: Condvar::new(),
                result: OnceCell::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        });

        let worker = Arc::clone(&task);
        TOKIO_RUNTIME.spawn(async move {
            let context = worker.context.clone();
            let name = worker.name.clone();
            let outcome = tokio::task::spawn_blocking(move || body(context)).await;

            let result = match outcome {
                Ok(Ok(value)) => Some(value),
                Ok(Err(e)) if is_canceled(&e) => {
                    warn!("task '{}' canceled", name);
                    None
                },
                Ok(Err(e)) => {
                    error!("task '{}' failed: {:?}", name, e);
                    None
                },
                Err(e) => {
                    error!("task '{}' panicked: {:?}", name, e);
                    None
                },
            };

            worker.complete(result);
        });

        Ok(task)
    }

    fn complete(&self, result: Option<T>) {
        // Release the name before observers wake so they may retry at once.
        ACTIVE_TASKS.remove_if(&self.name, |_, active_id| *active_id == self.id);

        let _ = self.completion.result.set(result);
        self.context.set_progress(100);

        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                let _ = listener.send(self.completion.result.get().cloned().flatten());
            }
        }

        if let Ok(mut done) = self.completion.done.lock() {
            *done = true;
            self.completion.cond.notify_all();
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.context.token.cancel();
    }

    pub fn progress(&self) -> u32 {
        self.context.progress.load(Ordering::Relaxed)
    }

    pub fn heartbeat(&self) -> u32 {
        self.context.heartbeat.load(Ordering::Relaxed)
    }

    pub fn is_complete(&self) -> bool {
        self.completion.result.get().is_some()
    }

    /// Result if complete; `Some(None)` means canceled or failed.
    pub fn try_result(&self) -> Option<Option<T>> {
        self.completion.result.get().cloned()
    }

    /// Subscribe to the completion event. The channel receives the result
    /// (`None` on cancellation or failure) exactly once. Subscribing after
    /// completion delivers the event immediately.
    pub fn subscribe(&self) -> Receiver<Option<T>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if let Some(result) = self.completion.result.get() {
            let _ = tx.send(result.clone());
        } else if let Ok(mut listeners) = self.listeners.lock() {
            // Re-check under the lock: completion may have raced us.
            if let Some(result) = self.completion.result.get() {
                let _ = tx.send(result.clone());
            } else {
                listeners.push(tx);
            }
        }
        rx
    }

    /// Block until the task completes and return its result.
    pub fn wait(&self) -> Option<T> {
        let mut done = match self.completion.done.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        while !*done {
            done = match self.completion.cond.wait(done) {
                Ok(guard) => guard,
                Err(_) => return None,
            };
        }
        self.completion.result.get().cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn conflicting_name_fails_synchronously() {
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().ok();

        let gate_clone = Arc::clone(&gate);
        let first = TrackableTask::spawn("conflict-test", move |_ctx| {
            let _block = gate_clone.lock();
            Ok(1u32)
        })
        .expect("first spawn must succeed");

        // Second spawn under the same name must fail immediately.
        let second = TrackableTask::<u32>::spawn("conflict-test", |_ctx| Ok(2));
        match second {
            Err(TaskError::Conflict { name }) => assert_eq!(name, "conflict-test"),
            other => panic!("expected conflict, got {:?}", other.map(|t| t.try_result())),
        }

        // First task is unaffected by the rejected spawn.
        assert!(!first.is_complete());
        drop(held);
        assert_eq!(first.wait(), Some(1));

        // After completion the name is free again.
        let third = TrackableTask::<u32>::spawn("conflict-test", |_ctx| Ok(3)).expect("name released");
        assert_eq!(third.wait(), Some(3));
    }

    #[test]
    fn cancellation_yields_no_result() {
        let task = TrackableTask::spawn("cancel-test", |ctx: TaskContext| {
            loop {
                ctx.checkpoint()?;
                std::thread::sleep(Duration::from_millis(5));
            }
            #[allow(unreachable_code)]
            Ok(0u32)
        })
        .expect("spawn");

        task.cancel();
        assert_eq!(task.wait(), None);
        assert!(task.is_complete());
    }

    #[test]
    fn completion_event_carries_result() {
        let task = TrackableTask::spawn("event-test", |ctx: TaskContext| {
            ctx.set_progress(50);
            Ok(vec![1u8, 2, 3])
        })
        .expect("spawn");

        let rx = task.subscribe();
        let delivered = rx.recv_timeout(Duration::from_secs(5)).expect("event");
        assert_eq!(delivered, Some(vec![1, 2, 3]));
        assert_eq!(task.progress(), 100);
    }

    #[test]
    fn subscribe_after_completion_delivers_immediately() {
        let task = TrackableTask::spawn("late-subscribe-test", |_ctx| Ok(7i64)).expect("spawn");
        assert_eq!(task.wait(), Some(7));

        let rx = task.subscribe();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).expect("event"), Some(7));
    }
}

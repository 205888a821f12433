//! Task dispatcher and bounded worker pool.
//!
//! ## Design
//!
//! - One task per (document, persona) pair; a pair already in flight is
//!   shared instead of re-invoked (deduplication index)
//! - At most `max_concurrency` tasks execute at once; the rest wait in FIFO order
//! - Pool counter, queue, dedup index and statistics live behind one mutex
//! - Task state is published through a `watch` channel owned by the worker
//!   running the task; every holder observes the same value

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use critique_ai::ErrorKind;
use critique_core::{DocumentId, PersonaId, PersonaSnapshot, TaskId};

use super::invoker::CritiqueInvoker;
use super::types::{AnalysisTask, TaskError, TaskState};

type TaskKey = (DocumentId, PersonaId);

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub tasks_submitted: u64,
    pub tasks_deduplicated: u64,
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub active: usize,
    pub queued: usize,
    pub peak_active: usize,
}

/// A job's reference to a (possibly shared) task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task_id: TaskId,
    key: TaskKey,
    receiver: watch::Receiver<AnalysisTask>,
    deduplicated: bool,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Whether this handle was bound to a task another job already started.
    pub fn is_deduplicated(&self) -> bool {
        self.deduplicated
    }

    /// Latest published task value.
    pub fn snapshot(&self) -> AnalysisTask {
        (*self.receiver.borrow()).clone()
    }

    /// Wait until the task has left `Pending`.
    pub async fn started(&mut self) -> AnalysisTask {
        self.wait_until(TaskState::has_started).await
    }

    /// Wait until the task reaches a terminal state.
    pub async fn finished(&mut self) -> AnalysisTask {
        self.wait_until(TaskState::is_terminal).await
    }

    async fn wait_until(&mut self, pred: fn(&TaskState) -> bool) -> AnalysisTask {
        let outcome = self
            .receiver
            .wait_for(|t| pred(&t.state))
            .await
            .map(|task| (*task).clone());
        match outcome {
            Ok(task) => task,
            Err(_) => {
                // The worker went away without publishing a terminal state.
                let mut task = (*self.receiver.borrow()).clone();
                if !task.state.is_terminal() {
                    task.state = TaskState::Failed {
                        error: TaskError::new(
                            ErrorKind::Cancelled,
                            "task worker stopped before completion",
                        ),
                    };
                }
                task
            }
        }
    }
}

struct QueuedTask {
    task_id: TaskId,
    key: TaskKey,
    text: Arc<str>,
    sender: Arc<watch::Sender<AnalysisTask>>,
    cancel: CancellationToken,
}

struct InFlightEntry {
    task_id: TaskId,
    receiver: watch::Receiver<AnalysisTask>,
    holders: usize,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PoolState {
    active: usize,
    queue: VecDeque<QueuedTask>,
    in_flight: HashMap<TaskKey, InFlightEntry>,
    stats: DispatcherStats,
}

struct DispatcherInner {
    invoker: CritiqueInvoker,
    max_concurrency: usize,
    state: Mutex<PoolState>,
}

impl DispatcherInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every critical section leaves the state consistent; a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fans tasks out onto a bounded pool of workers.
#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TaskDispatcher {
    /// `max_concurrency` comes from a validated `AnalysisConfig` and must be at least one.
    pub fn new(invoker: CritiqueInvoker, max_concurrency: usize) -> Self {
        debug_assert!(max_concurrency > 0, "max_concurrency must be at least 1");
        Self {
            inner: Arc::new(DispatcherInner {
                invoker,
                max_concurrency,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Create (or attach to) one task per persona, in order, and schedule them.
    ///
    /// Never blocks on execution. Must be called within a Tokio runtime.
    pub fn dispatch(
        &self,
        document_id: DocumentId,
        text: Arc<str>,
        personas: &[PersonaSnapshot],
    ) -> Vec<TaskHandle> {
        let mut handles = Vec::with_capacity(personas.len());
        let mut to_start = Vec::new();

        {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            for persona in personas {
                let key = (document_id, persona.id);

                if let Some(entry) = state.in_flight.get_mut(&key) {
                    if !entry.receiver.borrow().state.is_terminal() {
                        entry.holders += 1;
                        let handle = TaskHandle {
                            task_id: entry.task_id,
                            key,
                            receiver: entry.receiver.clone(),
                            deduplicated: true,
                        };
                        state.stats.tasks_deduplicated += 1;
                        debug!(task_id = %handle.task_id, persona = %persona.name, "attached to in-flight task");
                        handles.push(handle);
                        continue;
                    }
                }

                let task = AnalysisTask::new(document_id, persona.clone());
                let task_id = task.id;
                let (sender, receiver) = watch::channel(task);
                let cancel = CancellationToken::new();

                state.in_flight.insert(
                    key,
                    InFlightEntry {
                        task_id,
                        receiver: receiver.clone(),
                        holders: 1,
                        cancel: cancel.clone(),
                    },
                );
                state.stats.tasks_submitted += 1;

                let queued = QueuedTask {
                    task_id,
                    key,
                    text: text.clone(),
                    sender: Arc::new(sender),
                    cancel,
                };
                if state.active < self.inner.max_concurrency {
                    state.active += 1;
                    state.stats.peak_active = state.stats.peak_active.max(state.active);
                    to_start.push(queued);
                } else {
                    state.queue.push_back(queued);
                }

                handles.push(TaskHandle {
                    task_id,
                    key,
                    receiver,
                    deduplicated: false,
                });
            }
        }

        for task in to_start {
            spawn_worker(self.inner.clone(), task);
        }
        handles
    }

    /// Drop one job's interest in its tasks.
    ///
    /// A task whose last holder releases it is cancelled: removed from the
    /// queue if it has not started, interrupted if it is running.
    pub fn release(&self, handles: &[TaskHandle]) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        for handle in handles {
            let orphaned = match state.in_flight.get_mut(&handle.key) {
                Some(entry) if entry.task_id == handle.task_id => {
                    entry.holders = entry.holders.saturating_sub(1);
                    entry.holders == 0
                }
                _ => false,
            };
            if !orphaned {
                continue;
            }

            if let Some(entry) = state.in_flight.remove(&handle.key) {
                entry.cancel.cancel();
            }
            if let Some(pos) = state.queue.iter().position(|q| q.task_id == handle.task_id) {
                if let Some(queued) = state.queue.remove(pos) {
                    queued.sender.send_modify(AnalysisTask::mark_cancelled);
                    state.stats.tasks_cancelled += 1;
                }
            }
            debug!(task_id = %handle.task_id, "task released by all holders");
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        let state = self.inner.lock();
        DispatcherStats {
            active: state.active,
            queued: state.queue.len(),
            ..state.stats.clone()
        }
    }
}

fn spawn_worker(inner: Arc<DispatcherInner>, first: QueuedTask) {
    tokio::spawn(async move {
        let mut next = Some(first);
        while let Some(task) = next.take() {
            execute(&inner, &task).await;
            next = finish(&inner, task);
        }
    });
}

async fn execute(inner: &DispatcherInner, task: &QueuedTask) {
    if task.cancel.is_cancelled() {
        task.sender.send_modify(AnalysisTask::mark_cancelled);
        return;
    }
    inner.lock().stats.tasks_started += 1;

    // The call runs on its own task so a panicking generator fails only this
    // task; the worker still reaches `finish` and frees its slot.
    let invoker = inner.invoker.clone();
    let text = task.text.clone();
    let sender = task.sender.clone();
    let cancel = task.cancel.clone();
    let joined = tokio::spawn(async move { invoker.run(&text, &sender, &cancel).await }).await;

    if let Err(err) = joined {
        let error = if err.is_panic() {
            TaskError::new(ErrorKind::InvalidPersonaConfig, "generation call panicked")
        } else {
            TaskError::cancelled()
        };
        warn!(task_id = %task.task_id, error = %err, "critique invocation aborted");
        task.sender.send_modify(|t| t.mark_failed(error));
    }
}

/// Record the outcome and hand the worker its next queued task, if any.
fn finish(inner: &DispatcherInner, task: QueuedTask) -> Option<QueuedTask> {
    let mut state = inner.lock();

    match &task.sender.borrow().state {
        TaskState::Completed { .. } => state.stats.tasks_completed += 1,
        TaskState::Failed { .. } => state.stats.tasks_failed += 1,
        _ => state.stats.tasks_cancelled += 1,
    }

    if state
        .in_flight
        .get(&task.key)
        .is_some_and(|entry| entry.task_id == task.task_id)
    {
        state.in_flight.remove(&task.key);
    }

    match state.queue.pop_front() {
        Some(next) => Some(next),
        None => {
            state.active -= 1;
            None
        }
    }
}

//! Job status tracking: the job state machine, cancellation, retention.
//!
//! State machine:
//!
//! ```text
//! Pending ──(first task starts)──▶ Running ──(all tasks terminal)──▶ Succeeded | PartialSuccess | Failed
//!    │                               │
//!    └───────────(cancel)────────────┴──▶ Cancelled
//! ```
//!
//! Terminal states never transition further.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use critique_core::JobId;

use super::aggregator::{build_results, final_status, outcome_for};
use super::dispatcher::TaskHandle;
use super::error::AnalysisError;
use super::types::{AnalysisRequest, AnalysisTask, JobEvent, JobReport, JobStatus};

const EVENT_CAPACITY: usize = 256;

struct TaskSlot {
    task: AnalysisTask,
    /// Set when the job was cancelled before this task finished.
    excluded: bool,
}

struct JobRecord {
    request: AnalysisRequest,
    slots: Vec<TaskSlot>,
    handles: Vec<TaskHandle>,
    status: JobStatus,
    finished_at: Option<DateTime<Utc>>,
    retrieved: bool,
    status_tx: watch::Sender<JobStatus>,
}

impl JobRecord {
    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.status_tx.send_replace(status);
    }
}

/// Owns every job's state; fed by task observers, read by callers.
pub struct JobStatusTracker {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    events: broadcast::Sender<JobEvent>,
    retention: Duration,
}

impl JobStatusTracker {
    pub fn new(retention: Duration) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
            retention,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Register a new job in `Pending` with one slot per handle, in request order.
    pub fn register(&self, job_id: JobId, request: AnalysisRequest, handles: Vec<TaskHandle>) {
        let slots = handles
            .iter()
            .map(|h| TaskSlot {
                task: h.snapshot(),
                excluded: false,
            })
            .collect();
        let (status_tx, _rx) = watch::channel(JobStatus::Pending);

        self.write().insert(
            job_id,
            JobRecord {
                request,
                slots,
                handles,
                status: JobStatus::Pending,
                finished_at: None,
                retrieved: false,
                status_tx,
            },
        );
    }

    /// Task at `position` left `Pending`.
    pub fn mark_task_started(&self, job_id: JobId, position: usize, task: AnalysisTask) {
        let mut jobs = self.write();
        let Some(record) = jobs.get_mut(&job_id) else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }
        let persona = task.persona.name.clone();
        if let Some(slot) = record.slots.get_mut(position) {
            if !slot.task.state.is_terminal() {
                slot.task = task;
            }
        }
        if record.status == JobStatus::Pending {
            record.status = JobStatus::Running;
            record.status_tx.send_replace(JobStatus::Running);
        }
        drop(jobs);

        self.publish(JobEvent::TaskStarted {
            job_id,
            position,
            persona,
        });
    }

    /// Task at `position` reached a terminal state.
    ///
    /// After cancellation the outcome is still recorded but stays excluded
    /// from the report.
    pub fn record_task_terminal(&self, job_id: JobId, position: usize, task: AnalysisTask) {
        let mut jobs = self.write();
        let Some(record) = jobs.get_mut(&job_id) else {
            return;
        };
        let Some(slot) = record.slots.get_mut(position) else {
            return;
        };
        slot.task = task;

        if record.status.is_terminal() {
            debug!(%job_id, position, "task finished after job became terminal; excluded");
            return;
        }

        let outcome = outcome_for(&record.slots[position].task, false);
        if record.status == JobStatus::Pending {
            record.status = JobStatus::Running;
            record.status_tx.send_replace(JobStatus::Running);
        }

        let finished = final_status(record.slots.iter().map(|s| &s.task.state));
        if let Some(status) = finished {
            record.finish(status);
        }
        drop(jobs);

        self.publish(JobEvent::TaskFinished {
            job_id,
            position,
            persona: outcome.persona,
            state: outcome.state,
        });
        if let Some(status) = finished {
            info!(%job_id, status = ?status, "analysis job finished");
            self.publish(JobEvent::JobFinished { job_id, status });
        }
    }

    /// Cancel a job.
    ///
    /// Idempotent: a terminal job is left untouched. Otherwise the job becomes
    /// `Cancelled` immediately and its task handles are returned so the
    /// caller can release them to the dispatcher.
    pub fn cancel(&self, job_id: JobId) -> Result<(JobStatus, Vec<TaskHandle>), AnalysisError> {
        let mut jobs = self.write();
        let record = jobs
            .get_mut(&job_id)
            .ok_or(AnalysisError::JobNotFound(job_id))?;

        if record.status.is_terminal() {
            return Ok((record.status, Vec::new()));
        }

        for (slot, handle) in record.slots.iter_mut().zip(&record.handles) {
            let latest = handle.snapshot();
            if latest.state.is_terminal() && !slot.task.state.is_terminal() {
                slot.task = latest;
            }
            slot.excluded = !slot.task.state.is_terminal();
        }
        record.finish(JobStatus::Cancelled);
        let handles = std::mem::take(&mut record.handles);
        drop(jobs);

        info!(%job_id, "analysis job cancelled");
        self.publish(JobEvent::JobFinished {
            job_id,
            status: JobStatus::Cancelled,
        });
        Ok((JobStatus::Cancelled, handles))
    }

    pub fn status(&self, job_id: JobId) -> Result<JobStatus, AnalysisError> {
        self.read()
            .get(&job_id)
            .map(|r| r.status)
            .ok_or(AnalysisError::JobNotFound(job_id))
    }

    /// Current report. With `mark_retrieved`, a terminal job becomes eligible
    /// for disposal at the next sweep.
    pub fn report(&self, job_id: JobId, mark_retrieved: bool) -> Result<JobReport, AnalysisError> {
        let mut jobs = self.write();
        let record = jobs
            .get_mut(&job_id)
            .ok_or(AnalysisError::JobNotFound(job_id))?;

        if mark_retrieved && record.status.is_terminal() {
            record.retrieved = true;
        }

        Ok(JobReport {
            job_id,
            document_id: record.request.document_id,
            status: record.status,
            results: build_results(record.slots.iter().map(|s| (&s.task, s.excluded))),
            submitted_at: record.request.submitted_at,
            finished_at: record.finished_at,
        })
    }

    /// Status updates for one job.
    pub fn watch_status(&self, job_id: JobId) -> Result<watch::Receiver<JobStatus>, AnalysisError> {
        self.read()
            .get(&job_id)
            .map(|r| r.status_tx.subscribe())
            .ok_or(AnalysisError::JobNotFound(job_id))
    }

    /// Lossy stream of events for every job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Dispose terminal jobs that were retrieved or finished at least
    /// `retention` before `now`. Returns the number removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, record| {
            let Some(finished_at) = record.finished_at else {
                return true;
            };
            let expired = (now - finished_at)
                .to_std()
                .map(|age| age >= retention)
                .unwrap_or(false);
            !(record.retrieved || expired)
        });
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "swept expired analysis jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

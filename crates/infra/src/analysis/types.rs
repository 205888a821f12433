//! Core analysis types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use critique_ai::{ErrorKind, GenerationError};
use critique_core::{DocumentId, JobId, PersonaId, PersonaSnapshot, TaskId};

// -------------------------
// Retry policy
// -------------------------

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy for one critique task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first call (1 = no retries)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi(attempt.saturating_sub(1).min(30) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * f64::from(attempt)).min(max_ms),
        };

        // Deterministic jitter derived from the attempt number keeps tests reproducible.
        let jitter_range = delay_ms * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((f64::from(attempt) * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `attempts_made` calls.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

// -------------------------
// Requests
// -------------------------

/// Persona names requested by a caller: a single name, a comma-separated set,
/// or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersonaSelection {
    One(String),
    Many(Vec<String>),
}

impl PersonaSelection {
    /// Requested names in order, split on commas, trimmed, blanks dropped.
    ///
    /// Duplicates are preserved here; rejecting them is the resolver's job.
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            PersonaSelection::One(s) => vec![s.as_str()],
            PersonaSelection::Many(v) => v.iter().map(String::as_str).collect(),
        };

        raw.into_iter()
            .flat_map(|s| s.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl From<&str> for PersonaSelection {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<Vec<String>> for PersonaSelection {
    fn from(value: Vec<String>) -> Self {
        Self::Many(value)
    }
}

/// A validated submission: one document, an ordered duplicate-free persona list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub document_id: DocumentId,
    pub personas: Vec<PersonaId>,
    pub submitted_at: DateTime<Utc>,
}

// -------------------------
// Tasks
// -------------------------

/// Structured per-persona failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "task cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl From<GenerationError> for TaskError {
    fn from(err: GenerationError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Task execution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Queued, waiting for a worker
    Pending,
    /// A call to the generation capability is in progress (or backing off)
    Running,
    /// Completed successfully
    Completed { feedback: String },
    /// Failed permanently (non-transient error or retries exhausted)
    Failed { error: TaskError },
    /// Stopped before completion because nobody is waiting for it any more
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed { .. } | TaskState::Failed { .. } | TaskState::Cancelled
        )
    }

    pub fn has_started(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }
}

/// One unit of work: a (document, persona) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisTask {
    pub id: TaskId,
    pub document_id: DocumentId,
    pub persona: PersonaSnapshot,
    pub state: TaskState,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisTask {
    pub fn new(document_id: DocumentId, persona: PersonaSnapshot) -> Self {
        Self {
            id: TaskId::new(),
            document_id,
            persona,
            state: TaskState::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// Record the start of attempt number `attempt`.
    pub fn mark_attempt(&mut self, attempt: u32) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TaskState::Running;
        self.attempts = attempt;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self, feedback: String) {
        self.finish(TaskState::Completed { feedback });
    }

    pub fn mark_failed(&mut self, error: TaskError) {
        if error.is_cancelled() {
            self.finish(TaskState::Cancelled);
        } else {
            self.finish(TaskState::Failed { error });
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.finish(TaskState::Cancelled);
    }

    fn finish(&mut self, state: TaskState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

/// Successful outcome of one critique invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CritiqueResult {
    pub persona: String,
    pub feedback: String,
    pub attempts: u32,
    pub duration_ms: u64,
}

// -------------------------
// Jobs
// -------------------------

/// Overall job status.
///
/// Serialized names are part of the observable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, no task has started
    Pending,
    /// At least one task started, not all terminal
    Running,
    /// Every task completed
    Succeeded,
    /// At least one task completed and at least one failed
    PartialSuccess,
    /// Every task failed
    Failed,
    /// Cancelled by the caller before natural completion
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::PartialSuccess | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// State of one element of the aggregated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One element of the aggregated response (one per requested persona, in request order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaOutcome {
    pub persona: String,
    pub state: OutcomeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Job status plus ordered per-persona outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub document_id: DocumentId,
    pub status: JobStatus,
    pub results: Vec<PersonaOutcome>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Progress notifications published by the job tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    TaskStarted {
        job_id: JobId,
        position: usize,
        persona: String,
    },
    TaskFinished {
        job_id: JobId,
        position: usize,
        persona: String,
        state: OutcomeState,
    },
    JobFinished {
        job_id: JobId,
        status: JobStatus,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::TaskStarted { job_id, .. }
            | JobEvent::TaskFinished { job_id, .. }
            | JobEvent::JobFinished { job_id, .. } => *job_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::TaskStarted { .. } => "task_started",
            JobEvent::TaskFinished { .. } => "task_finished",
            JobEvent::JobFinished { .. } => "job_finished",
        }
    }
}

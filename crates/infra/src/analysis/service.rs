//! `AnalysisService`: the entry points exposed to the routing layer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use critique_ai::TextGenerator;
use critique_core::{DocumentId, JobId, Persona};

use super::dispatcher::{DispatcherStats, TaskDispatcher, TaskHandle};
use super::error::AnalysisError;
use super::invoker::CritiqueInvoker;
use super::resolver::PersonaResolver;
use super::tracker::JobStatusTracker;
use super::types::{AnalysisRequest, JobEvent, JobReport, JobStatus, PersonaSelection};
use crate::config::AnalysisConfig;
use crate::stores::{DocumentStore, PersonaStore};

/// Multi-persona document analysis.
///
/// Cheap to clone; clones share the worker pool and job table.
#[derive(Clone)]
pub struct AnalysisService {
    resolver: PersonaResolver,
    personas: Arc<dyn PersonaStore>,
    documents: Arc<dyn DocumentStore>,
    dispatcher: TaskDispatcher,
    tracker: Arc<JobStatusTracker>,
    sweep_interval: Duration,
}

impl AnalysisService {
    pub fn new(
        personas: Arc<dyn PersonaStore>,
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        config: &AnalysisConfig,
    ) -> Self {
        let invoker = CritiqueInvoker::new(generator, config.call_timeout, config.retry.clone());
        Self {
            resolver: PersonaResolver::new(personas.clone()),
            personas,
            documents,
            dispatcher: TaskDispatcher::new(invoker, config.max_concurrency),
            tracker: Arc::new(JobStatusTracker::new(config.retention)),
            sweep_interval: config.sweep_interval,
        }
    }

    /// Submit a document for analysis by one or more personas.
    ///
    /// Validation failures (selection, unknown persona, unknown or empty
    /// document) are returned before any task is created. Returns as soon as
    /// tasks are scheduled.
    pub async fn submit_analysis(
        &self,
        document_id: DocumentId,
        selection: &PersonaSelection,
    ) -> Result<JobId, AnalysisError> {
        let personas = self.resolver.resolve(&selection.names()).await?;

        let text = self.documents.get_text(document_id).await?;
        if text.trim().is_empty() {
            return Err(AnalysisError::DocumentEmpty(document_id));
        }

        let request = AnalysisRequest {
            document_id,
            personas: personas.iter().map(|p| p.id).collect(),
            submitted_at: Utc::now(),
        };
        let job_id = JobId::new();

        let handles = self
            .dispatcher
            .dispatch(document_id, Arc::from(text), &personas);
        self.tracker.register(job_id, request, handles.clone());
        self.spawn_monitor(job_id, handles);

        info!(%job_id, %document_id, personas = personas.len(), "analysis submitted");
        Ok(job_id)
    }

    /// Feed task progress into the tracker, one observer per task.
    fn spawn_monitor(&self, job_id: JobId, handles: Vec<TaskHandle>) {
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let mut observers = JoinSet::new();
            for (position, mut handle) in handles.into_iter().enumerate() {
                let tracker = tracker.clone();
                observers.spawn(async move {
                    let started = handle.started().await;
                    if started.state.has_started() && !started.state.is_terminal() {
                        tracker.mark_task_started(job_id, position, started);
                    }
                    let finished = handle.finished().await;
                    tracker.record_task_terminal(job_id, position, finished);
                });
            }
            while observers.join_next().await.is_some() {}
            debug!(%job_id, "job monitor finished");
        });
    }

    /// Status and ordered per-persona results. Retrieving a terminal job
    /// makes it eligible for disposal.
    pub fn get_job_status(&self, job_id: JobId) -> Result<JobReport, AnalysisError> {
        self.tracker.report(job_id, true)
    }

    /// Status and results without marking the job retrieved.
    pub fn peek_job(&self, job_id: JobId) -> Result<JobReport, AnalysisError> {
        self.tracker.report(job_id, false)
    }

    /// Cancel a job; a no-op for terminal jobs. Returns the resulting status.
    pub fn cancel_job(&self, job_id: JobId) -> Result<JobStatus, AnalysisError> {
        let (status, handles) = self.tracker.cancel(job_id)?;
        if !handles.is_empty() {
            self.dispatcher.release(&handles);
        }
        Ok(status)
    }

    /// Wait until the job is terminal, then return its report (marking it retrieved).
    pub async fn wait_for_completion(&self, job_id: JobId) -> Result<JobReport, AnalysisError> {
        let mut status = self.tracker.watch_status(job_id)?;
        // A closed channel means the job was swept; the report call below reports that.
        let _ = status.wait_for(|s| s.is_terminal()).await;
        self.get_job_status(job_id)
    }

    pub async fn list_personas(&self) -> Result<Vec<Persona>, AnalysisError> {
        Ok(self.personas.list().await?)
    }

    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tracker.subscribe()
    }

    /// Whether the job is known (and not yet disposed).
    pub fn job_exists(&self, job_id: JobId) -> bool {
        self.tracker.status(job_id).is_ok()
    }

    /// Periodically dispose retrieved or expired jobs.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let tracker = self.tracker.clone();
        let period = self.sweep_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.sweep_expired(Utc::now());
            }
        })
    }

    /// Run one sweep immediately.
    pub fn sweep_now(&self) -> usize {
        self.tracker.sweep_expired(Utc::now())
    }
}

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use critique_ai::TextGenerator;
use critique_core::{JobId, Persona};
use critique_infra::analysis::{AnalysisService, JobEvent};
use critique_infra::config::AnalysisConfig;
use critique_infra::stores::{InMemoryDocumentStore, InMemoryPersonaStore, StoreError};

/// Services shared by all handlers.
pub struct AppServices {
    pub analysis: AnalysisService,
    /// Dev collaborator standing in for upload + text extraction.
    pub documents: Arc<InMemoryDocumentStore>,
}

impl AppServices {
    pub fn new(
        personas: Vec<Persona>,
        generator: Arc<dyn TextGenerator>,
        config: &AnalysisConfig,
    ) -> Result<Self, StoreError> {
        let persona_store = Arc::new(InMemoryPersonaStore::from_personas(personas)?);
        let documents = InMemoryDocumentStore::arc();
        let analysis = AnalysisService::new(persona_store, documents.clone(), generator, config);
        Ok(Self {
            analysis,
            documents,
        })
    }
}

/// SSE stream of one job's events.
///
/// Starts with a `status` snapshot and always ends with `job_finished`.
pub fn job_sse_stream(
    services: Arc<AppServices>,
    job_id: JobId,
) -> Sse<UnboundedReceiverStream<Result<SseEvent, Infallible>>> {
    // Subscribe before the snapshot so no transition falls in between.
    let mut events = services.analysis.subscribe();
    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();

    tokio::spawn(async move {
        let snapshot = match services.analysis.peek_job(job_id) {
            Ok(report) => report,
            Err(_) => return,
        };
        let done = snapshot.status.is_terminal();
        if let Ok(event) = SseEvent::default().event("status").json_data(&snapshot) {
            if tx.send(Ok(event)).is_err() {
                return;
            }
        }
        if done {
            let finished = JobEvent::JobFinished {
                job_id,
                status: snapshot.status,
            };
            if let Ok(event) = SseEvent::default().event(finished.name()).json_data(&finished) {
                let _ = tx.send(Ok(event));
            }
            return;
        }

        loop {
            match events.recv().await {
                Ok(event) if event.job_id() == job_id => {
                    let finished = matches!(event, JobEvent::JobFinished { .. });
                    if let Ok(sse) = SseEvent::default().event(event.name()).json_data(&event) {
                        if tx.send(Ok(sse)).is_err() {
                            break; // client went away
                        }
                    }
                    if finished {
                        break;
                    }
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => {
                    // Missed events may include the final one.
                    match services.analysis.peek_job(job_id) {
                        Ok(report) if report.status.is_terminal() => {
                            let finished = JobEvent::JobFinished {
                                job_id,
                                status: report.status,
                            };
                            if let Ok(sse) = SseEvent::default().event(finished.name()).json_data(&finished) {
                                let _ = tx.send(Ok(sse));
                            }
                            break;
                        }
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

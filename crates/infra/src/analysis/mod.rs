//! Multi-persona document analysis.
//!
//! ## Components
//!
//! - `PersonaResolver`: requested names to persona snapshots
//! - `CritiqueInvoker`: one generation call per persona, with timeout and retry
//! - `TaskDispatcher`: fan-out onto a bounded worker pool, in-flight deduplication
//! - `aggregator`: terminal task states to job status and ordered results
//! - `JobStatusTracker`: job state machine, cancellation, events, retention
//! - `AnalysisService`: submission/status/cancel entry points
//!
//! Control flow: resolve → dispatch → invoke (in parallel) → aggregate → track.

pub mod aggregator;
pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod resolver;
pub mod service;
pub mod tracker;
pub mod types;

pub use dispatcher::{DispatcherStats, TaskDispatcher, TaskHandle};
pub use error::AnalysisError;
pub use invoker::CritiqueInvoker;
pub use resolver::PersonaResolver;
pub use service::AnalysisService;
pub use tracker::JobStatusTracker;
pub use types::{
    AnalysisRequest, AnalysisTask, BackoffStrategy, CritiqueResult, JobEvent, JobReport, JobStatus,
    OutcomeState, PersonaOutcome, PersonaSelection, RetryPolicy, TaskError, TaskState,
};

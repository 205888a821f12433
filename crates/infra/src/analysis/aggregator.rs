//! Result aggregation: per-task terminal states to job status and ordered response.

use super::types::{AnalysisTask, JobStatus, OutcomeState, PersonaOutcome, TaskState};

/// Final status for a set of task states, or `None` while any task is non-terminal.
///
/// A task that ended `Cancelled` in a job that was not itself cancelled
/// counts as a failure.
pub fn final_status<'a, I>(states: I) -> Option<JobStatus>
where
    I: IntoIterator<Item = &'a TaskState>,
{
    let mut any = false;
    let mut completed = 0usize;
    let mut failed = 0usize;

    for state in states {
        any = true;
        match state {
            TaskState::Completed { .. } => completed += 1,
            TaskState::Failed { .. } | TaskState::Cancelled => failed += 1,
            TaskState::Pending | TaskState::Running => return None,
        }
    }

    if !any {
        return None;
    }
    Some(match (completed, failed) {
        (_, 0) => JobStatus::Succeeded,
        (0, _) => JobStatus::Failed,
        _ => JobStatus::PartialSuccess,
    })
}

/// Response element for one task.
///
/// `excluded` marks a task whose outcome arrived after its job was cancelled;
/// it is reported as `cancelled` regardless of what it recorded.
pub fn outcome_for(task: &AnalysisTask, excluded: bool) -> PersonaOutcome {
    let mut outcome = PersonaOutcome {
        persona: task.persona.name.clone(),
        state: OutcomeState::Pending,
        result: None,
        error: None,
        message: None,
        attempts: task.attempts,
        duration_ms: task.duration_ms(),
    };

    if excluded {
        outcome.state = OutcomeState::Cancelled;
        outcome.duration_ms = None;
        return outcome;
    }

    match &task.state {
        TaskState::Pending => {}
        TaskState::Running => outcome.state = OutcomeState::Running,
        TaskState::Completed { feedback } => {
            outcome.state = OutcomeState::Completed;
            outcome.result = Some(feedback.clone());
        }
        TaskState::Failed { error } => {
            outcome.state = OutcomeState::Failed;
            outcome.error = Some(error.kind);
            outcome.message = Some(error.message.clone());
        }
        TaskState::Cancelled => outcome.state = OutcomeState::Cancelled,
    }
    outcome
}

/// Ordered response: one element per task, in the order given (request order).
pub fn build_results<'a, I>(tasks: I) -> Vec<PersonaOutcome>
where
    I: IntoIterator<Item = (&'a AnalysisTask, bool)>,
{
    tasks
        .into_iter()
        .map(|(task, excluded)| outcome_for(task, excluded))
        .collect()
}

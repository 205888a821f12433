//! Critique invocation: one persona against one document, with timeout and retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use critique_ai::{ErrorKind, GenerationError, GenerationRequest, TextGenerator};
use critique_core::PersonaSnapshot;

use super::types::{AnalysisTask, CritiqueResult, RetryPolicy, TaskError};

/// Wraps calls to the generation capability with a per-call timeout and a retry policy.
///
/// Transient failures (`RateLimited`, `TransientNetworkError`, `Timeout`) are
/// retried with backoff until the attempt cap; anything else fails at once.
/// Cancellation is checked before every attempt and interrupts both the
/// in-flight call and backoff sleeps.
#[derive(Clone)]
pub struct CritiqueInvoker {
    generator: Arc<dyn TextGenerator>,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl CritiqueInvoker {
    pub fn new(generator: Arc<dyn TextGenerator>, call_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            generator,
            call_timeout,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Produce a critique of `document_text` from `persona`.
    pub async fn invoke(
        &self,
        document_text: &str,
        persona: &PersonaSnapshot,
        cancel: &CancellationToken,
    ) -> Result<CritiqueResult, TaskError> {
        self.invoke_with(document_text, persona, cancel, |_| {}).await
    }

    /// Run a dispatched task to a terminal state, publishing attempt progress
    /// through the task's watch channel.
    pub async fn run(
        &self,
        document_text: &str,
        task: &watch::Sender<AnalysisTask>,
        cancel: &CancellationToken,
    ) {
        let persona = task.borrow().persona.clone();
        let outcome = self
            .invoke_with(document_text, &persona, cancel, |attempt| {
                task.send_modify(|t| t.mark_attempt(attempt));
            })
            .await;

        task.send_modify(|t| match outcome {
            Ok(result) => t.mark_completed(result.feedback),
            Err(error) => t.mark_failed(error),
        });
    }

    async fn invoke_with<F>(
        &self,
        document_text: &str,
        persona: &PersonaSnapshot,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> Result<CritiqueResult, TaskError>
    where
        F: FnMut(u32),
    {
        if persona.system_instruction.trim().is_empty() {
            return Err(TaskError::new(
                ErrorKind::InvalidPersonaConfig,
                format!("persona {} has a blank system instruction", persona.name),
            ));
        }

        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TaskError::cancelled());
            }

            attempt += 1;
            on_attempt(attempt);
            debug!(persona = %persona.name, attempt, "invoking generation");

            let request = GenerationRequest {
                system_instruction: &persona.system_instruction,
                document_text,
                timeout: self.call_timeout,
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TaskError::cancelled()),
                r = tokio::time::timeout(self.call_timeout, self.generator.generate(request)) => {
                    r.unwrap_or(Err(GenerationError::Timeout(self.call_timeout)))
                }
            };

            match result {
                Ok(feedback) => {
                    return Ok(CritiqueResult {
                        persona: persona.name.clone(),
                        feedback,
                        attempts: attempt,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(err) if err.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        persona = %persona.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient generation failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TaskError::cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(persona = %persona.name, attempts = attempt, error = %err, "retries exhausted");
                    } else {
                        debug!(persona = %persona.name, error = %err, "non-retryable generation failure");
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critique_ai::{ScriptStep, ScriptedGenerator};
    use critique_core::{DocumentId, Persona};

    use crate::analysis::types::TaskState;

    fn persona(name: &str) -> PersonaSnapshot {
        Persona::new(name, format!("You are {name}")).unwrap().snapshot()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(1))
    }

    fn invoker(generator: Arc<ScriptedGenerator>) -> CritiqueInvoker {
        CritiqueInvoker::new(generator, Duration::from_secs(5), fast_retry())
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let generator = Arc::new(ScriptedGenerator::new());
        let result = invoker(generator.clone())
            .invoke("doc", &persona("CriticalReviewer"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.persona, "CriticalReviewer");
        assert_eq!(result.feedback, "feedback for: You are CriticalReviewer");
        assert_eq!(result.attempts, 1);
        assert_eq!(generator.total_calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let generator = Arc::new(ScriptedGenerator::new().with_script(
            "You are SupportiveCoach",
            vec![
                ScriptStep::fail(GenerationError::RateLimited("429".into())),
                ScriptStep::fail(GenerationError::TransientNetwork("reset".into())),
                ScriptStep::reply("Nice work."),
            ],
        ));

        let result = invoker(generator.clone())
            .invoke("doc", &persona("SupportiveCoach"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.feedback, "Nice work.");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_carry_last_error() {
        let generator = Arc::new(ScriptedGenerator::new().with_script(
            "You are SupportiveCoach",
            vec![ScriptStep::fail(GenerationError::RateLimited("slow down".into()))],
        ));

        let err = invoker(generator.clone())
            .invoke("doc", &persona("SupportiveCoach"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(generator.calls_for("You are SupportiveCoach"), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_are_not_retried() {
        let generator = Arc::new(ScriptedGenerator::new().with_script(
            "You are CriticalReviewer",
            vec![ScriptStep::fail(GenerationError::ContentRejected("policy".into()))],
        ));

        let err = invoker(generator.clone())
            .invoke("doc", &persona("CriticalReviewer"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ContentRejected);
        assert_eq!(generator.total_calls(), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_and_count_as_transient() {
        let generator = Arc::new(ScriptedGenerator::new().with_script(
            "You are CriticalReviewer",
            vec![ScriptStep::reply("late").after(Duration::from_millis(200))],
        ));
        let invoker = CritiqueInvoker::new(generator.clone(), Duration::from_millis(10), fast_retry());

        let err = invoker
            .invoke("doc", &persona("CriticalReviewer"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(generator.total_calls(), 3);
    }

    #[tokio::test]
    async fn blank_instruction_fails_without_a_call() {
        let generator = Arc::new(ScriptedGenerator::new());
        let blank = Persona::new("Blank", "   ").unwrap().snapshot();

        let err = invoker(generator.clone())
            .invoke("doc", &blank, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidPersonaConfig);
        assert_eq!(generator.total_calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_attempt() {
        let generator = Arc::new(ScriptedGenerator::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = invoker(generator.clone())
            .invoke("doc", &persona("CriticalReviewer"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(generator.total_calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let generator = Arc::new(ScriptedGenerator::new().with_script(
            "You are CriticalReviewer",
            vec![ScriptStep::fail(GenerationError::RateLimited("429".into()))],
        ));
        let invoker = CritiqueInvoker::new(
            generator.clone(),
            Duration::from_secs(5),
            RetryPolicy::fixed(3, Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = invoker
            .invoke("doc", &persona("CriticalReviewer"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(generator.total_calls(), 1);
    }

    #[tokio::test]
    async fn run_publishes_attempts_and_terminal_state() {
        let generator = Arc::new(ScriptedGenerator::new().with_script(
            "You are CriticalReviewer",
            vec![
                ScriptStep::fail(GenerationError::TransientNetwork("reset".into())),
                ScriptStep::reply("Tighten the argument."),
            ],
        ));
        let task = AnalysisTask::new(DocumentId::new(), persona("CriticalReviewer"));
        let (tx, rx) = watch::channel(task);

        invoker(generator).run("doc", &tx, &CancellationToken::new()).await;

        let task = (*rx.borrow()).clone();
        assert_eq!(task.attempts, 2);
        assert_eq!(
            task.state,
            TaskState::Completed {
                feedback: "Tighten the argument.".to_string()
            }
        );
        assert!(task.started_at.is_some() && task.finished_at.is_some());
    }
}

//! End-to-end tests for the analysis pipeline.
//!
//! Pipeline: PersonaResolver → TaskDispatcher → CritiqueInvoker → aggregator → JobStatusTracker
//!
//! Verifies:
//! - Partial failures surface per persona without aborting siblings
//! - Response order equals request order regardless of completion order
//! - The worker pool never exceeds its concurrency bound
//! - Overlapping submissions share one outbound call
//! - Cancellation semantics

use std::sync::Arc;
use std::time::Duration;

use critique_ai::{ErrorKind, GenerationError, ScriptStep, ScriptedGenerator};
use critique_core::{DocumentId, Persona};
use critique_infra::analysis::{
    AnalysisService, JobEvent, JobStatus, OutcomeState, PersonaSelection, RetryPolicy,
};
use critique_infra::config::AnalysisConfig;
use critique_infra::stores::{InMemoryDocumentStore, InMemoryPersonaStore};

fn instruction(name: &str) -> String {
    format!("You are {name}")
}

fn config(max_concurrency: usize) -> AnalysisConfig {
    AnalysisConfig {
        max_concurrency,
        call_timeout: Duration::from_secs(5),
        retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
        ..AnalysisConfig::default()
    }
}

fn setup(
    names: &[&str],
    generator: Arc<ScriptedGenerator>,
    config: AnalysisConfig,
) -> (AnalysisService, DocumentId) {
    let personas = InMemoryPersonaStore::from_personas(
        names
            .iter()
            .map(|n| Persona::new(*n, instruction(n)).unwrap())
            .collect(),
    )
    .unwrap();
    let documents = InMemoryDocumentStore::new();
    let doc = documents
        .insert("We propose a method and evaluate it on one dataset.")
        .unwrap();

    let service = AnalysisService::new(Arc::new(personas), Arc::new(documents), generator, &config);
    (service, doc)
}

fn selection(names: &[&str]) -> PersonaSelection {
    PersonaSelection::Many(names.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn partial_success_when_one_persona_exhausts_retries() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_script(
                instruction("CriticalReviewer"),
                vec![ScriptStep::reply("The evaluation is too narrow.")],
            )
            .with_script(
                instruction("SupportiveCoach"),
                vec![ScriptStep::fail(GenerationError::RateLimited("429".into()))],
            ),
    );
    let (svc, doc) = setup(&["CriticalReviewer", "SupportiveCoach"], generator.clone(), config(5));

    let job = svc
        .submit_analysis(doc, &PersonaSelection::from("CriticalReviewer,SupportiveCoach"))
        .await
        .unwrap();
    let report = svc.wait_for_completion(job).await.unwrap();

    assert_eq!(report.status, JobStatus::PartialSuccess);
    assert_eq!(report.results.len(), 2);

    let reviewer = &report.results[0];
    assert_eq!(reviewer.persona, "CriticalReviewer");
    assert_eq!(reviewer.state, OutcomeState::Completed);
    assert_eq!(reviewer.result.as_deref(), Some("The evaluation is too narrow."));

    let coach = &report.results[1];
    assert_eq!(coach.persona, "SupportiveCoach");
    assert_eq!(coach.state, OutcomeState::Failed);
    assert_eq!(coach.error, Some(ErrorKind::RateLimited));
    assert_eq!(coach.attempts, 3);
    assert_eq!(generator.calls_for(&instruction("SupportiveCoach")), 3);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "PartialSuccess");
    assert_eq!(json["results"][1]["error"], "RateLimited");
}

#[tokio::test]
async fn every_persona_failing_is_failed() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_script(
                instruction("A"),
                vec![ScriptStep::fail(GenerationError::ContentRejected("policy".into()))],
            )
            .with_script(
                instruction("B"),
                vec![ScriptStep::fail(GenerationError::InvalidPersonaConfig("bad".into()))],
            ),
    );
    let (svc, doc) = setup(&["A", "B"], generator.clone(), config(5));

    let job = svc.submit_analysis(doc, &selection(&["A", "B"])).await.unwrap();
    let report = svc.wait_for_completion(job).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.results[0].error, Some(ErrorKind::ContentRejected));
    assert_eq!(report.results[1].error, Some(ErrorKind::InvalidPersonaConfig));
    // Non-transient kinds are never retried.
    assert_eq!(generator.total_calls(), 2);
}

#[tokio::test]
async fn pool_never_exceeds_concurrency_bound() {
    let names: Vec<String> = (0..10).map(|i| format!("Persona{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let generator = Arc::new(ScriptedGenerator::new().with_default_delay(Duration::from_millis(15)));
    let (svc, doc) = setup(&refs, generator.clone(), config(2));

    let job = svc.submit_analysis(doc, &selection(&refs)).await.unwrap();
    let report = svc.wait_for_completion(job).await.unwrap();

    assert_eq!(report.status, JobStatus::Succeeded);
    assert_eq!(generator.total_calls(), 10);
    assert!(generator.peak_concurrency() <= 2, "peak was {}", generator.peak_concurrency());
    assert!(svc.stats().peak_active <= 2);
}

#[tokio::test]
async fn overlapping_submissions_share_one_call() {
    let generator = Arc::new(
        ScriptedGenerator::new().with_script(
            instruction("CriticalReviewer"),
            vec![ScriptStep::reply("Shared critique.").after(Duration::from_millis(50))],
        ),
    );
    let (svc, doc) = setup(&["CriticalReviewer"], generator.clone(), config(5));

    let first = svc
        .submit_analysis(doc, &PersonaSelection::from("CriticalReviewer"))
        .await
        .unwrap();
    let second = svc
        .submit_analysis(doc, &PersonaSelection::from("criticalreviewer"))
        .await
        .unwrap();
    assert_ne!(first, second);

    let a = svc.wait_for_completion(first).await.unwrap();
    let b = svc.wait_for_completion(second).await.unwrap();

    assert_eq!(generator.calls_for(&instruction("CriticalReviewer")), 1);
    assert_eq!(a.results[0].result.as_deref(), Some("Shared critique."));
    assert_eq!(a.results, b.results);
    assert_eq!(svc.stats().tasks_deduplicated, 1);
}

#[tokio::test]
async fn cancelling_a_succeeded_job_is_a_noop() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (svc, doc) = setup(&["A"], generator, config(5));

    let job = svc.submit_analysis(doc, &selection(&["A"])).await.unwrap();
    let before = svc.wait_for_completion(job).await.unwrap();
    assert_eq!(before.status, JobStatus::Succeeded);

    assert_eq!(svc.cancel_job(job).unwrap(), JobStatus::Succeeded);
    let after = svc.peek_job(job).unwrap();
    assert_eq!(after.status, JobStatus::Succeeded);
    assert_eq!(after.results, before.results);
}

#[tokio::test]
async fn cancelling_a_running_job_stops_pending_work() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_script(instruction("Fast"), vec![ScriptStep::reply("quick")])
            .with_script(
                instruction("Slow"),
                vec![ScriptStep::reply("never seen").after(Duration::from_secs(30))],
            ),
    );
    let (svc, doc) = setup(&["Fast", "Slow", "Queued"], generator.clone(), config(2));

    let job = svc
        .submit_analysis(doc, &selection(&["Fast", "Slow", "Queued"]))
        .await
        .unwrap();

    // Let "Fast" finish while "Slow" is still in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(svc.cancel_job(job).unwrap(), JobStatus::Cancelled);
    assert_eq!(svc.cancel_job(job).unwrap(), JobStatus::Cancelled);

    let report = svc.wait_for_completion(job).await.unwrap();
    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].persona, "Fast");
    assert_eq!(report.results[0].state, OutcomeState::Completed);
    assert_eq!(report.results[1].state, OutcomeState::Cancelled);
    assert_eq!(report.results[1].persona, "Slow");
}

#[tokio::test]
async fn cancelled_job_frees_its_worker_slots() {
    let generator = Arc::new(
        ScriptedGenerator::new().with_script(
            instruction("Slow"),
            vec![ScriptStep::reply("late").after(Duration::from_secs(30))],
        ),
    );
    let (svc, doc) = setup(&["Slow", "Next"], generator.clone(), config(1));

    let slow = svc.submit_analysis(doc, &selection(&["Slow"])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let next = svc.submit_analysis(doc, &selection(&["Next"])).await.unwrap();

    svc.cancel_job(slow).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(2), svc.wait_for_completion(next))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn events_follow_task_progress() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (svc, doc) = setup(&["A", "B"], generator, config(5));
    let mut events = svc.subscribe();

    let job = svc.submit_analysis(doc, &selection(&["A", "B"])).await.unwrap();
    svc.wait_for_completion(job).await.unwrap();

    let mut finished_tasks = 0;
    let mut job_finished = None;
    while job_finished.is_none() {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.job_id(), job);
        match event {
            JobEvent::TaskFinished { .. } => finished_tasks += 1,
            JobEvent::JobFinished { status, .. } => job_finished = Some(status),
            JobEvent::TaskStarted { .. } => {}
        }
    }
    assert_eq!(finished_tasks, 2);
    assert_eq!(job_finished, Some(JobStatus::Succeeded));
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn response_order_matches_request_order(
            latencies in proptest::collection::vec(0u64..20, 1..8),
            max_concurrency in 1usize..4,
        ) {
            let names: Vec<String> = (0..latencies.len()).map(|i| format!("P{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();

            let generator = latencies.iter().enumerate().fold(ScriptedGenerator::new(), |g, (i, ms)| {
                g.with_script(
                    instruction(&names[i]),
                    vec![ScriptStep::reply(names[i].clone()).after(Duration::from_millis(*ms))],
                )
            });

            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let report = rt.block_on(async {
                let (svc, doc) = setup(&refs, Arc::new(generator), config(max_concurrency));
                let job = svc.submit_analysis(doc, &selection(&refs)).await.unwrap();
                svc.wait_for_completion(job).await.unwrap()
            });

            prop_assert_eq!(report.status, JobStatus::Succeeded);
            let personas: Vec<&str> = report.results.iter().map(|r| r.persona.as_str()).collect();
            prop_assert_eq!(&personas, &refs);
            for r in &report.results {
                prop_assert_eq!(r.result.as_deref(), Some(r.persona.as_str()));
            }
        }
    }
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use critique_ai::ScriptedGenerator;
use critique_core::{DocumentId, Persona};
use critique_infra::analysis::{AnalysisService, PersonaSelection, RetryPolicy};
use critique_infra::config::AnalysisConfig;
use critique_infra::stores::{InMemoryDocumentStore, InMemoryPersonaStore};

fn service(persona_count: usize, max_concurrency: usize) -> (AnalysisService, DocumentId, Vec<String>) {
    let names: Vec<String> = (0..persona_count).map(|i| format!("Persona{i}")).collect();
    let personas = InMemoryPersonaStore::from_personas(
        names
            .iter()
            .map(|n| Persona::new(n.as_str(), format!("You are {n}")).unwrap())
            .collect(),
    )
    .unwrap();
    let config = AnalysisConfig {
        max_concurrency,
        retry: RetryPolicy::no_retry(),
        ..AnalysisConfig::default()
    };
    let documents = InMemoryDocumentStore::new();
    let doc = documents.insert("A short manuscript.").unwrap();
    let svc = AnalysisService::new(
        Arc::new(personas),
        Arc::new(documents),
        Arc::new(ScriptedGenerator::new()),
        &config,
    );
    (svc, doc, names)
}

/// Fan-out/fan-in of one job with an instant generator: pure orchestration overhead.
fn bench_fan_out_fan_in(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("fan_out_fan_in");
    for persona_count in [1usize, 5, 20, 50] {
        group.throughput(Throughput::Elements(persona_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(persona_count),
            &persona_count,
            |b, &n| {
                let (svc, doc, names) = service(n, 5);
                let selection = PersonaSelection::Many(names);
                b.iter(|| {
                    rt.block_on(async {
                        let job = svc.submit_analysis(doc, &selection).await.unwrap();
                        let report = svc.wait_for_completion(job).await.unwrap();
                        svc.sweep_now();
                        black_box(report)
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fan_out_fan_in);
criterion_main!(benches);

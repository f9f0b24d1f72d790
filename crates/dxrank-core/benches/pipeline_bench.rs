//! # Pipeline Benchmarks
//!
//! Segmentation, grounding and scoring throughput against the in-memory
//! ontology.
//!
//! Run with: `cargo bench -p dxrank-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dxrank_core::segmenter::segment;
use dxrank_core::{
    Grounder, GroundingConfig, InMemoryOntology, MemoryStore, OntologyGateway, Scorer,
    ScoringConfig,
};
use std::hint::black_box;
use std::sync::Arc;

/// Ontology with `size` terms in a single subclass chain, each mapped to OMIM.
fn chain_ontology(size: usize) -> InMemoryOntology {
    let mut ontology = InMemoryOntology::new();
    for i in 0..size {
        let id = format!("MONDO:{i:07}");
        ontology
            .add_term(&id, &format!("disease {i}"))
            .add_mapping(&id, &format!("OMIM:{:06}", 100_000 + i));
        if i > 0 {
            ontology.add_edge(&id, "rdfs:subClassOf", &format!("MONDO:{:07}", i - 1));
        }
    }
    ontology
}

fn answer(lines: usize) -> String {
    (1..=lines)
        .map(|i| format!("{i}. **disease {i}** (synonym {i})"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");
    for lines in [10, 50, 200] {
        let text = answer(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &text, |b, text| {
            b.iter(|| segment(black_box(text)));
        });
    }
    group.finish();
}

fn bench_ground(c: &mut Criterion) {
    let ontology: Arc<dyn OntologyGateway> = Arc::new(chain_ontology(1000));
    let grounder = Grounder::new(ontology, GroundingConfig::default());
    let text = (1..=10)
        .map(|i| format!("{i}. disease {}", i * 50))
        .collect::<Vec<_>>()
        .join("\n");

    c.bench_function("ground_text_10_lines", |b| {
        b.iter(|| grounder.ground_text(black_box(&text)));
    });
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_pair");
    for depth in [10usize, 100] {
        let ontology: Arc<dyn OntologyGateway> = Arc::new(chain_ontology(depth + 1));
        let grounded = format!("MONDO:{depth:07}");

        group.bench_with_input(BenchmarkId::new("cold", depth), &grounded, |b, grounded| {
            b.iter(|| {
                let scorer = Scorer::new(
                    ontology.clone(),
                    ScoringConfig::default(),
                    Arc::new(MemoryStore::new(1024)),
                    Arc::new(MemoryStore::new(1024)),
                );
                scorer.score_pair(black_box(grounded), "OMIM:100000")
            });
        });

        let warm = Scorer::new(
            ontology.clone(),
            ScoringConfig::default(),
            Arc::new(MemoryStore::new(1024)),
            Arc::new(MemoryStore::new(1024)),
        );
        let _ = warm.score_pair(&grounded, "OMIM:100000");
        group.bench_with_input(BenchmarkId::new("warm", depth), &grounded, |b, grounded| {
            b.iter(|| warm.score_pair(black_box(grounded), "OMIM:100000"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_segment, bench_ground, bench_score);
criterion_main!(benches);

use criterion::{Criterion, criterion_group, criterion_main};
use news_rag::database::SearchResult;
use news_rag::documents::Document;
use news_rag::rag::ContextBuilder;
use std::hint::black_box;

fn sample_results(count: usize) -> Vec<SearchResult> {
    (0..count)
        .map(|n| SearchResult {
            document: Document::new(
                format!("Article {n}"),
                format!("https://news.example.com/{n}"),
                "Markets moved sharply today as investors weighed new data. ".repeat(n % 7 + 3),
            ),
            score: 1.0 / (n as f32 + 1.0),
        })
        .rev()
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let results = sample_results(20);
    let builder = ContextBuilder::new(4000);
    c.bench_function("context_build", |b| {
        b.iter(|| builder.build(black_box("what moved markets"), black_box(&results)))
    });

    let small = ContextBuilder::new(200);
    c.bench_function("context_build_truncating", |b| {
        b.iter(|| small.build(black_box("what moved markets"), black_box(&results)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use paperfind_core::{Config, Document, FieldValue, Index, QueryRequest};
use rand::Rng;
use tempfile::TempDir;

fn random_abstract(rng: &mut impl Rng, words: usize) -> String {
    let vocabulary = [
        "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "sort", "index",
        "query", "database", "segment", "posting",
    ];
    (0..words)
        .map(|_| vocabulary[rng.gen_range(0..vocabulary.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn paper(id: u64, rng: &mut impl Rng) -> Document {
    Document::new(format!("paper-{id}"))
        .with_field("title", FieldValue::Text(format!("Document {id}")))
        .with_field("abstract", FieldValue::Text(random_abstract(rng, 100)))
        .with_field(
            "subject",
            FieldValue::List(vec![format!("subject-{}", id % 10)]),
        )
}

fn open_index(storage: &TempDir) -> Index {
    let config = Config {
        storage_path: storage.path().to_path_buf(),
        ..Config::default()
    };
    Index::open(config).unwrap()
}

fn bench_single_insert(c: &mut Criterion) {
    let storage = TempDir::new().unwrap();
    let index = open_index(&storage);
    let mut rng = rand::thread_rng();

    c.bench_function("single_document_insert", |b| {
        let mut id = 0u64;
        b.iter(|| {
            let doc = paper(id, &mut rng);
            index.add_document(black_box(doc)).unwrap();
            id += 1;
        });
    });
}

fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");
    let mut rng = rand::thread_rng();

    for batch_size in [10, 50, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let storage = TempDir::new().unwrap();
                let index = open_index(&storage);
                let mut id_counter = 0u64;

                b.iter(|| {
                    let docs: Vec<Document> = (0..batch_size)
                        .map(|_| {
                            let doc = paper(id_counter, &mut rng);
                            id_counter += 1;
                            doc
                        })
                        .collect();
                    let _ = index.add_documents(docs);
                    index.save().unwrap();
                });
            },
        );
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let storage = TempDir::new().unwrap();
    let index = open_index(&storage);
    let mut rng = rand::thread_rng();

    for i in 0..1000 {
        index.add_document(paper(i, &mut rng)).unwrap();
    }
    index.save().unwrap();

    let mut group = c.benchmark_group("search");

    group.bench_function("single_term", |b| {
        let request = QueryRequest {
            query: "fox".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.bench_function("boolean_and", |b| {
        let request = QueryRequest {
            query: "quick AND brown".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.bench_function("boolean_or", |b| {
        let request = QueryRequest {
            query: "fox OR dog".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.bench_function("not_clause", |b| {
        let request = QueryRequest {
            query: "fox NOT lazy".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.bench_function("phrase_query", |b| {
        let request = QueryRequest {
            query: "\"quick brown fox\"".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.bench_function("proximity_query", |b| {
        let request = QueryRequest {
            query: "#5(quick,fox)".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.bench_function("natural_language", |b| {
        let request = QueryRequest {
            query: "quick brown fox jumps".to_string(),
            ..QueryRequest::default()
        };
        b.iter(|| index.search(black_box(&request)).unwrap());
    });

    group.finish();
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    group.sample_size(10);

    group.bench_function("merge_two_segments", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let storage = TempDir::new().unwrap();
                let config = Config {
                    storage_path: storage.path().to_path_buf(),
                    max_docs_per_segment: 200,
                    ..Config::default()
                };
                let index = Index::open(config).unwrap();
                let mut rng = rand::thread_rng();
                for i in 0..400 {
                    index.add_document(paper(i, &mut rng)).unwrap();
                }
                index.save().unwrap();

                let start = std::time::Instant::now();
                index.optimize().unwrap();
                total += start.elapsed();
            }
            total
        });
    });

    group.finish();
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("index_throughput", |b| {
        b.iter_custom(|iters| {
            let storage = TempDir::new().unwrap();
            let index = open_index(&storage);
            let mut rng = rand::thread_rng();
            let mut id = 0u64;

            let start = std::time::Instant::now();
            for _ in 0..iters {
                for _ in 0..100 {
                    index.add_document(paper(id, &mut rng)).unwrap();
                    id += 1;
                }
            }
            index.save().unwrap();
            start.elapsed()
        });
    });

    group.bench_function("query_throughput", |b| {
        let storage = TempDir::new().unwrap();
        let index = open_index(&storage);
        let mut rng = rand::thread_rng();
        for i in 0..5000 {
            index.add_document(paper(i, &mut rng)).unwrap();
        }
        index.save().unwrap();

        let queries = [
            "fox",
            "quick AND brown",
            "lazy OR dog",
            "quick brown fox jumps",
        ];
        let mut query_idx = 0;

        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            for _ in 0..iters {
                for _ in 0..100 {
                    let request = QueryRequest {
                        query: queries[query_idx % queries.len()].to_string(),
                        ..QueryRequest::default()
                    };
                    let _ = index.search(black_box(&request)).unwrap();
                    query_idx += 1;
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_insert,
    bench_search,
    bench_optimize,
    bench_throughput
);
criterion_main!(benches);

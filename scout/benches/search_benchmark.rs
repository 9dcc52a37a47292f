use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scout::{Document, EngineConfig, SearchEngine, SearchEngineApi, SearchOptions, SuggestOptions};

const INDEX: &str = "products";
const NUM_DOCS: i64 = 5_000;

const WORDS: &[&str] = &[
    "red", "blue", "leather", "waterproof", "running", "hiking", "shoes", "boots", "jacket", "backpack",
    "wireless", "headphones", "vintage", "lamp", "kettle", "organic", "cotton", "blanket", "portable", "speaker",
];

fn sentence(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect::<Vec<_>>().join(" ")
}

fn setup_engine() -> SearchEngine {
    // Caching off so every iteration runs the full query path
    let mut config = EngineConfig::default();
    config.cache.enabled = false;
    let engine = SearchEngine::in_memory(config).expect("Failed to create engine");

    let mut rng = StdRng::seed_from_u64(42);
    let docs: Vec<Document> = (1..=NUM_DOCS)
        .map(|id| {
            let title = sentence(&mut rng, 3);
            let body_len = rng.gen_range(10..60);
            Document::new(id, title, sentence(&mut rng, body_len))
        })
        .collect();
    for outcome in engine.index_documents(INDEX, &docs) {
        outcome.expect("Failed to index document");
    }
    engine
}

fn bench_search(c: &mut Criterion) {
    let engine = setup_engine();
    let rt = tokio::runtime::Runtime::new().unwrap();

    let queries = vec![
        ("single_term", "shoes"),
        ("multi_term", "red leather boots"),
        ("phrase", "\"running shoes\""),
        ("exclusion", "jacket -waterproof"),
        ("fuzzy_typo", "hedphones"),
        ("fuzzy_singular", "boot"),
        ("field_filter", "title:lamp kettle"),
    ];

    let mut group = c.benchmark_group("search");
    group.sample_size(20);

    for (name, query) in queries {
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    engine.search(INDEX.to_string(), query.to_string(), SearchOptions::default()).await.unwrap()
                })
            });
        });
    }
    group.finish();

    c.bench_function("suggest/prefix", |b| {
        b.iter(|| engine.suggest_sync("wire", INDEX, &SuggestOptions::default()).unwrap())
    });
}

fn bench_index(c: &mut Criterion) {
    let engine = SearchEngine::in_memory(EngineConfig::default()).expect("Failed to create engine");
    let mut rng = StdRng::seed_from_u64(7);
    let doc = Document::new(1, sentence(&mut rng, 4), sentence(&mut rng, 80));

    c.bench_function("index/replace_document", |b| {
        b.iter(|| engine.index_document_sync(INDEX, &doc).unwrap())
    });
}

criterion_group!(benches, bench_search, bench_index);
criterion_main!(benches);

//! Generate a performance test index with a synthetic product catalog.
//!
//! Documents go through the regular indexing path, so the resulting SQLite
//! file has exactly the layout the engine reads.
//!
//! Usage:
//!     cargo run --release --bin generate-perf-db [output_path] [num_docs]
//!
//! Default output: benches/synthetic_perf.sqlite

use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use rand::Rng;
use scout::{Document, EngineConfig, SearchEngine};
use std::env;
use std::path::PathBuf;

const INDEX: &str = "products";

/// Number of documents generated when no count is given
const DEFAULT_NUM_DOCS: usize = 20_000;

const BATCH_SIZE: usize = 500;

const ADJECTIVES: &[&str] = &[
    "red", "blue", "green", "black", "white", "leather", "waterproof", "lightweight", "vintage", "classic",
    "comfortable", "durable", "organic", "wireless", "portable", "compact", "premium", "handmade", "slim", "warm",
];

const NOUNS: &[&str] = &[
    "shoes", "boots", "jacket", "backpack", "headphones", "keyboard", "lamp", "kettle", "blanket", "watch",
    "sneakers", "umbrella", "wallet", "speaker", "mug", "notebook", "scarf", "gloves", "tent", "bicycle",
];

const PHRASES: &[&str] = &[
    "built for everyday use",
    "ships within two days",
    "made from recycled materials",
    "perfect for running and hiking",
    "designed in small batches",
    "backed by a lifetime warranty",
    "easy to clean and maintain",
    "fits most standard sizes",
];

const LANGUAGES: &[&str] = &["en", "en", "en", "de", "fr"];

const TYPES: &[&str] = &["product", "product", "product", "article", "faq"];

fn pick<'a>(rng: &mut impl Rng, words: &[&'a str]) -> &'a str {
    words[rng.gen_range(0..words.len())]
}

fn generate_document(rng: &mut impl Rng, element_id: i64) -> Document {
    let title = format!("{} {} {}", pick(rng, ADJECTIVES), pick(rng, ADJECTIVES), pick(rng, NOUNS));

    let sentences = rng.gen_range(3..=12);
    let body: Vec<String> = (0..sentences)
        .map(|_| format!("{} {} {}.", pick(rng, ADJECTIVES), pick(rng, NOUNS), pick(rng, PHRASES)))
        .collect();

    let published = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now)
        + Duration::days(rng.gen_range(0..1800));

    Document::new(element_id, title, body.join(" "))
        .with_language(pick(rng, LANGUAGES))
        .with_element_type(pick(rng, TYPES))
        .with_date(published)
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let output_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("benches").join("synthetic_perf.sqlite"),
    };
    let num_docs = match args.get(2) {
        Some(n) => n.parse::<usize>().context("document count must be a number")?,
        None => DEFAULT_NUM_DOCS,
    };

    if output_path.exists() {
        std::fs::remove_file(&output_path).context("Failed to remove existing database")?;
    }
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    println!("Generating performance test index...");
    println!("Output: {}", output_path.display());

    let engine = SearchEngine::open(&output_path, EngineConfig::default())?;
    let mut rng = rand::thread_rng();
    let mut total_length = 0u64;
    let mut failures = 0usize;

    let ids: Vec<i64> = (1..=num_docs as i64).collect();
    for (batch_no, chunk) in ids.chunks(BATCH_SIZE).enumerate() {
        let docs: Vec<Document> = chunk.iter().map(|&id| generate_document(&mut rng, id)).collect();
        for outcome in engine.index_documents(INDEX, &docs) {
            match outcome {
                Ok(stats) => total_length += stats.doc_length,
                Err(e) => {
                    failures += 1;
                    eprintln!("  index failed: {e}");
                }
            }
        }
        println!("  Indexed {}/{} documents...", ((batch_no + 1) * BATCH_SIZE).min(num_docs), num_docs);
    }

    let stats = engine.index_stats(INDEX, 1)?;
    println!();
    println!("Index created: {}", output_path.display());
    println!("  Documents: {}", stats.doc_count);
    println!("  Failures: {}", failures);
    println!("  Total terms: {}", total_length);
    println!("  Average document length: {:.1}", stats.avg_doc_len());
    Ok(())
}

//! Scout command line
//!
//! Operates on one SQLite index file. Results are printed as JSON.
//!
//! ```bash
//! scout --db shop.sqlite index --index products docs.jsonl
//! scout --db shop.sqlite search --index products "red shoes -boots"
//! scout --db shop.sqlite suggest --index products run
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scout::{
    Document, EngineConfig, SearchEngine, SearchEngineApi, SearchFilters, SearchOptions, SortOrder, SuggestOptions,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "scout", author, version, about = "Self-hosted lexical search engine", long_about = None)]
struct Args {
    /// SQLite index file, created if missing
    #[arg(long, default_value = "scout.sqlite")]
    db: PathBuf,

    /// JSON engine configuration; defaults apply to omitted keys
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index documents from a JSON-lines file (one document per line)
    Index {
        #[arg(short, long, default_value = "default")]
        index: String,
        file: PathBuf,
    },
    /// Ranked search
    Search {
        #[arg(short, long, default_value = "default")]
        index: String,
        #[arg(long, default_value_t = 1)]
        site: i64,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Only hits in this language (primary subtag match)
        #[arg(long)]
        lang: Option<String>,
        /// Only hits of this element type
        #[arg(long = "type")]
        element_type: Option<String>,
        #[arg(long, value_enum, default_value_t = SortArg::Relevance)]
        sort: SortArg,
        /// Disable fuzzy expansion for this query
        #[arg(long)]
        no_fuzzy: bool,
        /// Fuzzy expansion budget in milliseconds
        #[arg(long)]
        fuzzy_timeout_ms: Option<u64>,
        query: String,
    },
    /// Title suggestions for a prefix
    Suggest {
        #[arg(short, long, default_value = "default")]
        index: String,
        #[arg(long, default_value_t = 1)]
        site: i64,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        prefix: String,
    },
    /// Remove one document
    Remove {
        #[arg(short, long, default_value = "default")]
        index: String,
        #[arg(long, default_value_t = 1)]
        site: i64,
        element_id: i64,
    },
    /// Remove every document of an index
    Clear {
        #[arg(short, long, default_value = "default")]
        index: String,
    },
    /// Index counters, or one document's stats
    Stats {
        #[arg(short, long, default_value = "default")]
        index: String,
        #[arg(long, default_value_t = 1)]
        site: i64,
        #[arg(long)]
        element: Option<i64>,
        /// Recompute counters from postings first
        #[arg(long)]
        rebuild: bool,
    },
    /// Highlight terms in text and print snippets
    Highlight {
        /// Comma-separated terms
        #[arg(short, long, value_delimiter = ',')]
        terms: Vec<String>,
        text: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Relevance,
    DateDesc,
    DateAsc,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Relevance => SortOrder::Relevance,
            SortArg::DateDesc => SortOrder::DateDesc,
            SortArg::DateAsc => SortOrder::DateAsc,
        }
    }
}

#[derive(Serialize)]
struct IndexReport {
    indexed: usize,
    failed: usize,
    skipped_lines: usize,
}

#[derive(Serialize)]
struct HighlightReport {
    highlighted: String,
    snippets: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_documents(path: &PathBuf) -> Result<(Vec<Document>, usize)> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut documents = Vec::new();
    let mut skipped = 0;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Document>(&line) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                skipped += 1;
                warn!(line = line_no + 1, error = %e, "skipping malformed document");
            }
        }
    }
    Ok((documents, skipped))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("scout=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let engine = SearchEngine::open(&args.db, config)?;

    match args.command {
        Command::Index { index, file } => {
            let (documents, skipped_lines) = read_documents(&file)?;
            let outcomes = tokio::task::block_in_place(|| engine.index_documents(&index, &documents));
            let failed = outcomes.iter().filter(|o| o.is_err()).count();
            for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
                warn!(error = %err, "document not indexed");
            }
            info!(index = %index, indexed = outcomes.len() - failed, failed, "indexing finished");
            print_json(&IndexReport {
                indexed: outcomes.len() - failed,
                failed,
                skipped_lines,
            })?;
        }
        Command::Search {
            index,
            site,
            limit,
            offset,
            lang,
            element_type,
            sort,
            no_fuzzy,
            fuzzy_timeout_ms,
            query,
        } => {
            let options = SearchOptions {
                site_id: site,
                limit,
                offset,
                filters: SearchFilters { language: lang, element_type },
                sort: sort.into(),
                fuzzy: no_fuzzy.then_some(false),
                fuzzy_timeout: fuzzy_timeout_ms.map(Duration::from_millis),
            };
            let result = engine.search(index, query, options).await?;
            print_json(&result)?;
        }
        Command::Suggest { index, site, limit, prefix } => {
            let titles = engine.suggest(prefix, index, SuggestOptions { site_id: site, limit }).await?;
            print_json(&titles)?;
        }
        Command::Remove { index, site, element_id } => {
            engine.remove_document(index.clone(), site, element_id).await?;
            info!(index = %index, site, element_id, "removed");
        }
        Command::Clear { index } => {
            engine.clear_index(index.clone()).await?;
            info!(index = %index, "cleared");
        }
        Command::Stats { index, site, element, rebuild } => {
            if rebuild {
                engine.rebuild_metadata(&index)?;
            }
            match element {
                Some(element_id) => print_json(&engine.document_stats(&index, site, element_id)?)?,
                None => print_json(&engine.index_stats(&index, site)?)?,
            }
        }
        Command::Highlight { terms, text } => {
            print_json(&HighlightReport {
                highlighted: engine.highlight(&text, &terms),
                snippets: engine.snippets(&text, &terms),
            })?;
        }
    }
    Ok(())
}

//! SearchEngine - public façade over store, indexer, query execution and cache
//!
//! Async Cancellation Architecture:
//! Dropping a `search` future drops a DropGuard that triggers a
//! CancellationToken. The blocking query thread checks this token between
//! phases and inside fuzzy expansion, and aborts mid-flight.

use crate::analyzer::{normalize, Analyzer};
use crate::cache::QueryCache;
use crate::config::EngineConfig;
use crate::highlight::{HighlightOptions, Highlighter};
use crate::indexer::{validate_handle, Indexer};
use crate::interface::{DocStats, Document, EngineError, SearchEngineApi, SearchOptions, SearchResult, SuggestOptions};
use crate::query::QueryParser;
use crate::search::QueryExecutor;
use crate::stopwords::primary_subtag;
use crate::store::{IndexStore, MemoryStore, MetaCounters, SqliteStore};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Global fallback Tokio runtime for async calls made outside any runtime context.
/// Shared across all engines and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

static RAYON_INIT: Once = Once::new();

/// Initialize global Rayon thread pool with core reservation and lower priority
fn init_rayon() {
    RAYON_INIT.call_once(|| {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        // Reserve 2 cores for Tokio, but use at least 1 thread.
        let rayon_threads = num_threads.saturating_sub(2).max(1);

        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(rayon_threads)
            .thread_name(|i| format!("scout-rayon-{}", i))
            .start_handler(|_| {
                use thread_priority::*;
                let _ = set_current_thread_priority(ThreadPriority::Min);
            })
            .build_global();
    });
}

/// RAII guard that cancels a token when dropped.
struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// State shared with blocking worker threads.
struct EngineCore {
    store: Arc<dyn IndexStore>,
    config: EngineConfig,
    analyzer: Arc<Analyzer>,
    indexer: Indexer,
    cache: QueryCache,
}

impl EngineCore {
    fn require_index(&self, index: &str) -> Result<(), EngineError> {
        validate_handle(index)?;
        if !self.store.index_exists(index)? {
            return Err(EngineError::IndexNotFound(index.to_string()));
        }
        Ok(())
    }

    fn search(&self, index: &str, query: &str, options: &SearchOptions, token: CancellationToken) -> Result<SearchResult, EngineError> {
        let started = Instant::now();
        self.require_index(index)?;

        let languages = self.query_languages(index, options)?;
        let parsed = QueryParser::new(&self.analyzer).parse(query, &languages);

        // A query that needed recovery can normalize to the same form as a clean one
        let key = parsed
            .warnings
            .is_empty()
            .then(|| self.cache.search_key(index, &parsed.normalized(), options));
        if let Some(mut cached) = key.as_ref().and_then(|k| self.cache.get_search(k)) {
            cached.took_ms = started.elapsed().as_millis() as u64;
            debug!(index, query, "query cache hit");
            return Ok(cached);
        }

        let mut result = QueryExecutor::new(self.store.as_ref(), &self.analyzer, &self.config, token).execute(index, &parsed, options)?;
        if let Some(key) = key {
            self.cache.put_search(key, &result);
        }
        result.took_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Languages whose stop words a query is analyzed with: the filter language,
    /// or every language indexed in the site so no stop word dropped at index
    /// time is left as a required term.
    fn query_languages(&self, index: &str, options: &SearchOptions) -> Result<Vec<String>, EngineError> {
        if let Some(language) = &options.filters.language {
            return Ok(vec![primary_subtag(language)]);
        }
        let languages: BTreeSet<String> = self
            .store
            .languages(index, options.site_id)?
            .iter()
            .map(|l| primary_subtag(l))
            .collect();
        Ok(languages.into_iter().collect())
    }

    fn suggest(&self, prefix: &str, index: &str, options: &SuggestOptions) -> Result<Vec<String>, EngineError> {
        self.require_index(index)?;
        let prefix = normalize(prefix.trim());
        if prefix.is_empty() || options.limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.cache.suggest_key(index, &prefix, options);
        if let Some(titles) = self.cache.get_suggest(&key) {
            return Ok(titles);
        }
        let titles = self.store.suggest_titles(index, options.site_id, &prefix, options.limit)?;
        self.cache.put_suggest(key, &titles);
        Ok(titles)
    }

    fn index_document(&self, index: &str, document: &Document) -> Result<DocStats, EngineError> {
        let stats = self.indexer.index_document(index, document)?;
        self.cache.bump(index);
        Ok(stats)
    }

    fn remove_document(&self, index: &str, site_id: i64, element_id: i64) -> Result<(), EngineError> {
        self.require_index(index)?;
        if self.indexer.remove_document(index, site_id, element_id)? {
            self.cache.bump(index);
        }
        Ok(())
    }

    fn clear_index(&self, index: &str) -> Result<(), EngineError> {
        self.require_index(index)?;
        self.indexer.clear_index(index)?;
        self.cache.bump(index);
        Ok(())
    }
}

/// Thread-safe search engine
///
/// Concurrency Model:
/// - Store implementations handle their own locking (r2d2 pool or RwLock)
/// - Writers to the same document are serialized by striped locks
/// - Async operations run on tokio blocking threads
/// - Uses global FALLBACK_RUNTIME when called outside any runtime
pub struct SearchEngine {
    core: Arc<EngineCore>,
    highlighter: Highlighter,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn IndexStore>, config: EngineConfig) -> Result<Self, EngineError> {
        init_rayon();
        let config = config.validated()?;
        let analyzer = Arc::new(Analyzer::new(&config.analyzer));
        let highlighter = Highlighter::new(HighlightOptions::from(&config.highlight));
        let core = EngineCore {
            indexer: Indexer::new(store.clone(), analyzer.clone()),
            cache: QueryCache::new(&config.cache),
            store,
            config,
            analyzer,
        };
        Ok(Self {
            core: Arc::new(core),
            highlighter,
        })
    }

    /// Engine over a SQLite database file, created if missing.
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self, EngineError> {
        let store = SqliteStore::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened sqlite index store");
        Self::new(Arc::new(store), config)
    }

    /// Engine over process memory. Nothing is persisted.
    pub fn in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn highlighter(&self) -> &Highlighter {
        &self.highlighter
    }

    /// Get a tokio runtime handle - uses current runtime if available, otherwise global fallback
    fn runtime_handle(&self) -> tokio::runtime::Handle {
        tokio::runtime::Handle::try_current()
            .unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
    }

    /// Run blocking work off the async executor; a panicked or aborted task reads as cancellation.
    async fn run_blocking<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&EngineCore) -> Result<T, EngineError> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        match self.runtime_handle().spawn_blocking(move || work(&core)).await {
            Ok(result) => result,
            Err(_join_error) => Err(EngineError::Cancelled),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Synchronous API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn search_sync(&self, index: &str, query: &str, options: &SearchOptions) -> Result<SearchResult, EngineError> {
        self.core.search(index, query, options, CancellationToken::new())
    }

    /// Search that aborts with `Cancelled` once `token` fires.
    pub fn search_with_token(&self, index: &str, query: &str, options: &SearchOptions, token: CancellationToken) -> Result<SearchResult, EngineError> {
        self.core.search(index, query, options, token)
    }

    pub fn suggest_sync(&self, prefix: &str, index: &str, options: &SuggestOptions) -> Result<Vec<String>, EngineError> {
        self.core.suggest(prefix, index, options)
    }

    pub fn index_document_sync(&self, index: &str, document: &Document) -> Result<DocStats, EngineError> {
        self.core.index_document(index, document)
    }

    /// Index many documents in parallel. Outcomes are reported per document, in input order.
    pub fn index_documents(&self, index: &str, documents: &[Document]) -> Vec<Result<DocStats, EngineError>> {
        let results = self.core.indexer.index_documents(index, documents);
        if results.iter().any(Result::is_ok) {
            self.core.cache.bump(index);
        }
        results
    }

    pub fn remove_document_sync(&self, index: &str, site_id: i64, element_id: i64) -> Result<(), EngineError> {
        self.core.remove_document(index, site_id, element_id)
    }

    pub fn clear_index_sync(&self, index: &str) -> Result<(), EngineError> {
        self.core.clear_index(index)
    }

    /// Recompute document counts and length sums from the live postings.
    pub fn rebuild_metadata(&self, index: &str) -> Result<(), EngineError> {
        self.core.require_index(index)?;
        self.core.store.rebuild_metadata(index)?;
        self.core.cache.bump(index);
        info!(index, "metadata rebuilt");
        Ok(())
    }

    pub fn document_stats(&self, index: &str, site_id: i64, element_id: i64) -> Result<Option<DocStats>, EngineError> {
        self.core.require_index(index)?;
        self.core.indexer.document_stats(index, site_id, element_id)
    }

    pub fn index_stats(&self, index: &str, site_id: i64) -> Result<MetaCounters, EngineError> {
        self.core.require_index(index)?;
        Ok(self.core.store.metadata(index, site_id)?)
    }
}

#[async_trait::async_trait]
impl SearchEngineApi for SearchEngine {
    /// This is an async function that supports cancellation. When the caller
    /// drops the future, the DropGuard triggers the CancellationToken.
    async fn search(&self, index: String, query: String, options: SearchOptions) -> Result<SearchResult, EngineError> {
        let token = CancellationToken::new();
        let _guard = DropGuard::new(token.clone());
        self.run_blocking(move |core| core.search(&index, &query, &options, token)).await
    }

    async fn suggest(&self, prefix: String, index: String, options: SuggestOptions) -> Result<Vec<String>, EngineError> {
        self.run_blocking(move |core| core.suggest(&prefix, &index, &options)).await
    }

    fn highlight(&self, text: &str, terms: &[String]) -> String {
        self.highlighter.highlight(text, terms)
    }

    fn snippets(&self, text: &str, terms: &[String]) -> Vec<String> {
        self.highlighter.snippets(text, terms)
    }

    async fn index_document(&self, index: String, document: Document) -> Result<DocStats, EngineError> {
        self.run_blocking(move |core| core.index_document(&index, &document)).await
    }

    async fn remove_document(&self, index: String, site_id: i64, element_id: i64) -> Result<(), EngineError> {
        self.run_blocking(move |core| core.remove_document(&index, site_id, element_id)).await
    }

    async fn clear_index(&self, index: String) -> Result<(), EngineError> {
        self.run_blocking(move |core| core.clear_index(&index)).await
    }
}

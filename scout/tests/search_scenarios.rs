//! End-to-end search behavior through the public engine API, backed by an
//! on-disk SQLite index.

use scout::{
    Document, EngineConfig, EngineError, SearchEngine, SearchEngineApi, SearchFilters, SearchOptions, SearchResult,
    SearchWarning, SortOrder, SuggestOptions,
};
use std::time::Duration;
use tempfile::TempDir;

const PRODUCTS: &str = "products";

fn create_engine(config: EngineConfig) -> (SearchEngine, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let engine = SearchEngine::open(temp_dir.path().join("index.sqlite"), config).unwrap();
    (engine, temp_dir)
}

/// Helper to create an engine holding the given `(id, title, body)` documents
fn create_catalog(docs: &[(i64, &str, &str)]) -> (SearchEngine, TempDir) {
    let (engine, dir) = create_engine(EngineConfig::default());
    for (id, title, body) in docs {
        engine.index_document_sync(PRODUCTS, &Document::new(*id, *title, *body)).unwrap();
    }
    (engine, dir)
}

fn search(engine: &SearchEngine, query: &str) -> SearchResult {
    engine.search_sync(PRODUCTS, query, &SearchOptions::default()).unwrap()
}

fn ids(result: &SearchResult) -> Vec<i64> {
    result.hits.iter().map(|h| h.element_id).collect()
}

// ============================================================
// Ranking
// ============================================================

#[test]
fn red_shoes_title_match_ranks_first() {
    let (engine, _dir) = create_catalog(&[
        (2, "Blue Hat", "Goes well with red shoes"),
        (1, "Red Shoes", "Comfortable red running shoes"),
    ]);

    let result = search(&engine, "red shoes");
    assert_eq!(ids(&result), vec![1, 2]);
    assert_eq!(result.total_count, 2);
    assert!(result.hits[0].score > result.hits[1].score);
    assert!(result.warnings.is_empty());
}

#[test]
fn singular_query_finds_plural_through_fuzzy_expansion() {
    let (engine, _dir) = create_catalog(&[(1, "Red Shoes", "Comfortable red running shoes"), (3, "Wool Scarf", "Warm")]);

    let result = search(&engine, "shoe");
    assert_eq!(ids(&result), vec![1]);

    // raising the threshold above the shoe/shoes similarity (7/13) drops the match
    let mut strict = EngineConfig::default();
    strict.fuzzy.similarity_threshold = 0.6;
    let (strict_engine, _dir2) = create_engine(strict);
    strict_engine.index_document_sync(PRODUCTS, &Document::new(1, "Red Shoes", "")).unwrap();
    assert!(search(&strict_engine, "shoe").hits.is_empty());
}

#[test]
fn exact_postings_suppress_fuzzy_expansion() {
    let (engine, _dir) = create_catalog(&[(1, "Lamp", "shoes"), (2, "Kettle", "shoe")]);
    let result = search(&engine, "shoe");
    // doc 2 has the exact term; doc 1 only reaches the query through "shoes"
    assert_eq!(ids(&result), vec![2]);

    let result = search(&engine, "shoes");
    assert_eq!(ids(&result), vec![1]);
}

#[test]
fn fuzzy_timeout_returns_exact_results_with_warning() {
    let (engine, _dir) = create_catalog(&[(1, "Red Shoes", "Comfortable red running shoes"), (2, "Red Hat", "")]);
    let options = SearchOptions { fuzzy_timeout: Some(Duration::ZERO), ..SearchOptions::default() };

    let result = engine.search_sync(PRODUCTS, "red shoe", &options).unwrap();
    let mut found = ids(&result);
    found.sort();
    assert_eq!(found, vec![1, 2]);
    assert!(matches!(
        result.warnings.as_slice(),
        [SearchWarning::FuzzyTimeout { skipped_terms }] if skipped_terms == &vec!["shoe".to_string()]
    ));
}

// ============================================================
// Query syntax
// ============================================================

#[test]
fn phrases_exclusions_and_fields() {
    let (engine, _dir) = create_catalog(&[
        (1, "Trail Runner", "Lightweight running shoes for trails"),
        (2, "Court Classic", "Shoes for running errands, not for running"),
        (3, "Trail Guide", "Maps and notes"),
    ]);

    assert_eq!(ids(&search(&engine, "\"running shoes\"")), vec![1]);
    assert_eq!(ids(&search(&engine, "running -trails")), vec![2]);
    assert_eq!(ids(&search(&engine, "trail -\"running shoes\"")), vec![3]);
    let mut titled = ids(&search(&engine, "title:trail"));
    titled.sort();
    assert_eq!(titled, vec![1, 3]);
    assert_eq!(ids(&search(&engine, "running NOT classic")), vec![1]);
}

#[test]
fn unknown_field_is_searched_as_text_with_warning() {
    let (engine, _dir) = create_catalog(&[(1, "Color Guide", "Pick a color: teal")]);
    let result = search(&engine, "color:teal");
    assert_eq!(ids(&result), vec![1]);
    assert!(matches!(result.warnings.as_slice(), [SearchWarning::InvalidQuery { .. }]));
}

#[test]
fn unterminated_quote_does_not_fail() {
    let (engine, _dir) = create_catalog(&[(1, "Red Shoes", "")]);
    let result = search(&engine, "\"red shoes");
    assert_eq!(ids(&result), vec![1]);
}

#[test]
fn filters_language_and_type() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    engine.index_document_sync(PRODUCTS, &Document::new(1, "Laufschuhe Trail", "").with_language("de").with_element_type("Product")).unwrap();
    engine.index_document_sync(PRODUCTS, &Document::new(2, "Trail Shoes", "").with_language("en-US").with_element_type("Article")).unwrap();

    let options = |language: Option<&str>, element_type: Option<&str>| SearchOptions {
        filters: SearchFilters {
            language: language.map(str::to_string),
            element_type: element_type.map(str::to_string),
        },
        ..SearchOptions::default()
    };
    let run = |o: SearchOptions| ids(&engine.search_sync(PRODUCTS, "trail", &o).unwrap());

    assert_eq!(run(options(Some("de"), None)), vec![1]);
    assert_eq!(run(options(Some("en"), None)), vec![2]);
    assert_eq!(run(options(None, Some("product"))), vec![1]);
    assert_eq!(ids(&search(&engine, "trail type:article")), vec![2]);

    let hit = &engine.search_sync(PRODUCTS, "trail", &options(Some("en"), None)).unwrap().hits[0];
    assert_eq!(hit.language, "en-US");
}

#[test]
fn stop_words_follow_indexed_languages_without_filter() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    engine.index_document_sync(PRODUCTS, &Document::new(1, "Die Schuhe", "Die roten Schuhe").with_language("de")).unwrap();
    engine.index_document_sync(PRODUCTS, &Document::new(1, "Die Hard", "An action film").with_site(2)).unwrap();

    // "die" was dropped when the German document was indexed
    assert_eq!(ids(&search(&engine, "Schuhe")), vec![1]);
    assert_eq!(ids(&search(&engine, "die Schuhe")), vec![1]);

    // In an English-only site "die" is an ordinary word
    let english = SearchOptions::for_site(2);
    assert_eq!(ids(&engine.search_sync(PRODUCTS, "die hard", &english).unwrap()), vec![1]);
}

#[test]
fn phrase_does_not_span_title_and_body() {
    let (engine, _dir) = create_catalog(&[(1, "Red Shoes", "Comfortable red running shoes")]);
    assert!(search(&engine, "\"shoes comfortable\"").hits.is_empty());
    assert_eq!(ids(&search(&engine, "\"red running shoes\"")), vec![1]);
}

// ============================================================
// Ordering and paging
// ============================================================

#[test]
fn date_sort_and_pagination() {
    use chrono::{TimeZone, Utc};
    let (engine, _dir) = create_engine(EngineConfig::default());
    for day in 1..=12 {
        let doc = Document::new(day, "Daily Note", "note").with_date(Utc.with_ymd_and_hms(2024, 3, day as u32, 9, 0, 0).unwrap());
        engine.index_document_sync(PRODUCTS, &doc).unwrap();
    }

    let page = |offset, sort| {
        engine
            .search_sync(PRODUCTS, "note", &SearchOptions { limit: Some(5), offset, sort, ..SearchOptions::default() })
            .unwrap()
    };
    let first = page(0, SortOrder::DateDesc);
    assert_eq!(first.total_count, 12);
    assert_eq!(ids(&first), vec![12, 11, 10, 9, 8]);
    assert_eq!(ids(&page(10, SortOrder::DateDesc)), vec![2, 1]);
    assert_eq!(ids(&page(0, SortOrder::DateAsc)), vec![1, 2, 3, 4, 5]);
}

#[test]
fn limit_is_capped_by_config() {
    let mut config = EngineConfig::default();
    config.search.max_limit = 3;
    config.search.default_limit = 2;
    let (engine, _dir) = create_engine(config);
    for id in 1..=6 {
        engine.index_document_sync(PRODUCTS, &Document::new(id, "Widget", "")).unwrap();
    }
    assert_eq!(search(&engine, "widget").hits.len(), 2);
    let wide = engine.search_sync(PRODUCTS, "widget", &SearchOptions { limit: Some(100), ..SearchOptions::default() }).unwrap();
    assert_eq!(wide.hits.len(), 3);
    assert_eq!(wide.total_count, 6);
}

// ============================================================
// Index lifecycle
// ============================================================

#[test]
fn reindexing_is_idempotent() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    let doc = Document::new(1, "Red Shoes", "Comfortable red running shoes");
    let first = engine.index_document_sync(PRODUCTS, &doc).unwrap();
    let before = search(&engine, "shoes");
    let second = engine.index_document_sync(PRODUCTS, &doc).unwrap();

    assert!(first.is_new && !second.is_new);
    assert_eq!(engine.index_stats(PRODUCTS, 1).unwrap().doc_count, 1);
    assert_eq!(search(&engine, "shoes").hits, before.hits);
}

#[test]
fn removed_document_is_gone_everywhere() {
    let (engine, _dir) = create_catalog(&[(1, "Red Shoes", "Comfortable red running shoes"), (2, "Blue Hat", "")]);
    engine.remove_document_sync(PRODUCTS, 1, 1).unwrap();

    for query in ["red", "shoes", "shoe", "\"red shoes\"", "title:red"] {
        assert!(search(&engine, query).hits.is_empty(), "query {query:?} still matches");
    }
    assert!(engine.suggest_sync("red", PRODUCTS, &SuggestOptions::default()).unwrap().is_empty());
    let stats = engine.index_stats(PRODUCTS, 1).unwrap();
    assert_eq!((stats.doc_count, stats.length_sum), (1, 2));
}

#[test]
fn sites_are_isolated() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    engine.index_document_sync(PRODUCTS, &Document::new(1, "Red Shoes", "").with_site(1)).unwrap();
    engine.index_document_sync(PRODUCTS, &Document::new(1, "Red Boots", "").with_site(2)).unwrap();

    assert_eq!(ids(&search(&engine, "shoes")), vec![1]);
    assert!(engine.search_sync(PRODUCTS, "shoes", &SearchOptions::for_site(2)).unwrap().hits.is_empty());
    assert_eq!(
        engine.suggest_sync("red", PRODUCTS, &SuggestOptions { site_id: 2, limit: 5 }).unwrap(),
        vec!["Red Boots".to_string()]
    );
}

#[test]
fn stop_word_only_document_is_counted_without_postings() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    let stats = engine.index_document_sync(PRODUCTS, &Document::new(9, "The", "and of the")).unwrap();
    assert_eq!(stats.distinct_terms, 0);
    assert_eq!(engine.index_stats(PRODUCTS, 1).unwrap().doc_count, 1);
    assert!(search(&engine, "the").hits.is_empty());
}

#[test]
fn unknown_index_and_empty_handle() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    assert!(matches!(engine.search_sync("nope", "x", &SearchOptions::default()), Err(EngineError::IndexNotFound(_))));
    assert!(matches!(
        engine.index_document_sync("", &Document::new(1, "x", "")),
        Err(EngineError::InvalidInput(_))
    ));
}

// ============================================================
// Async surface
// ============================================================

#[tokio::test(flavor = "multi_thread")]
async fn async_roundtrip_with_highlighting() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    let body = "Comfortable red running shoes for long distances";
    engine.index_document(PRODUCTS.to_string(), Document::new(1, "Red Shoes", body)).await.unwrap();

    let result = engine.search(PRODUCTS.to_string(), "running".to_string(), SearchOptions::default()).await.unwrap();
    assert_eq!(ids(&result), vec![1]);

    let terms = vec!["running".to_string()];
    assert_eq!(
        engine.highlight(body, &terms),
        "Comfortable red <mark>running</mark> shoes for long distances"
    );
    let snippets = engine.snippets(body, &terms);
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0].contains("<mark>running</mark>"));

    engine.clear_index(PRODUCTS.to_string()).await.unwrap();
    let result = engine.search(PRODUCTS.to_string(), "running".to_string(), SearchOptions::default()).await.unwrap();
    assert!(result.hits.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn matched_terms_highlight_fuzzy_hits() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    let body = "Comfortable red running shoes";
    engine.index_document(PRODUCTS.to_string(), Document::new(1, "Trainers", body)).await.unwrap();

    let result = engine.search(PRODUCTS.to_string(), "shoe".to_string(), SearchOptions::default()).await.unwrap();
    assert_eq!(ids(&result), vec![1]);
    let terms = &result.hits[0].matched_terms;
    assert_eq!(terms, &vec!["shoes".to_string()]);
    assert_eq!(engine.highlight(body, terms), "Comfortable red running <mark>shoes</mark>");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_writers_on_distinct_documents() {
    let (engine, _dir) = create_engine(EngineConfig::default());
    let engine = std::sync::Arc::new(engine);

    let handles: Vec<_> = (1..=16)
        .map(|id| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .index_document(PRODUCTS.to_string(), Document::new(id, format!("Gadget {id}"), "portable gadget"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let result = engine.search(PRODUCTS.to_string(), "gadget".to_string(), SearchOptions::default()).await.unwrap();
    assert_eq!(result.total_count, 16);
    assert_eq!(engine.index_stats(PRODUCTS, 1).unwrap().doc_count, 16);
}

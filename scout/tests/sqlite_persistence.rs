//! The SQLite-backed index survives reopening and matches the in-memory store.

use scout::{Document, EngineConfig, FieldContent, MetaCounters, SearchEngine, SearchOptions, SuggestOptions};
use tempfile::TempDir;

fn catalog() -> Vec<Document> {
    vec![
        Document::new(1, "Red Shoes", "Comfortable red running shoes").with_element_type("product"),
        Document::new(2, "Blue Hat", "Goes well with red shoes").with_element_type("product"),
        Document::new(3, "Running Guide", "How to start running").with_element_type("article"),
    ]
}

fn ranked(engine: &SearchEngine, query: &str) -> Vec<(i64, f64)> {
    engine
        .search_sync("products", query, &SearchOptions::default())
        .unwrap()
        .hits
        .into_iter()
        .map(|h| (h.element_id, h.score))
        .collect()
}

#[test]
fn index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.sqlite");

    {
        let engine = SearchEngine::open(&path, EngineConfig::default()).unwrap();
        for outcome in engine.index_documents("products", &catalog()) {
            outcome.unwrap();
        }
        engine.remove_document_sync("products", 1, 3).unwrap();
    }

    let engine = SearchEngine::open(&path, EngineConfig::default()).unwrap();
    assert_eq!(engine.index_stats("products", 1).unwrap().doc_count, 2);
    assert_eq!(ranked(&engine, "shoes").iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(ranked(&engine, "guide").is_empty());
    assert_eq!(
        engine.suggest_sync("blue", "products", &SuggestOptions::default()).unwrap(),
        vec!["Blue Hat".to_string()]
    );
}

#[test]
fn sqlite_and_memory_rank_identically() {
    let dir = TempDir::new().unwrap();
    let on_disk = SearchEngine::open(dir.path().join("a.sqlite"), EngineConfig::default()).unwrap();
    let in_memory = SearchEngine::in_memory(EngineConfig::default()).unwrap();
    for doc in catalog() {
        on_disk.index_document_sync("products", &doc).unwrap();
        in_memory.index_document_sync("products", &doc).unwrap();
    }

    for query in ["shoes", "red", "shoe", "\"running shoes\"", "running -hat", "title:running"] {
        assert_eq!(ranked(&on_disk, query), ranked(&in_memory, query), "query {query:?}");
    }
}

#[test]
fn clear_keeps_index_registered() {
    let dir = TempDir::new().unwrap();
    let engine = SearchEngine::open(dir.path().join("c.sqlite"), EngineConfig::default()).unwrap();
    for doc in catalog() {
        engine.index_document_sync("products", &doc).unwrap();
    }
    engine.clear_index_sync("products").unwrap();

    assert_eq!(engine.index_stats("products", 1).unwrap(), MetaCounters::default());
    assert!(ranked(&engine, "shoes").is_empty());

    // reindexing after a clear starts from zero
    let stats = engine.index_document_sync("products", &catalog()[0]).unwrap();
    assert!(stats.is_new);
    assert_eq!(engine.index_stats("products", 1).unwrap(), MetaCounters { doc_count: 1, length_sum: 6 });
}

#[test]
fn structured_fields_are_searchable() {
    let dir = TempDir::new().unwrap();
    let engine = SearchEngine::open(dir.path().join("f.sqlite"), EngineConfig::default()).unwrap();
    let doc = Document::from_fields(
        11,
        "Trail Kit",
        vec![
            FieldContent::RichText("<p>Everything for the <b>mountains</b> &amp; forests</p>".into()),
            FieldContent::Keywords(vec!["camping".into(), "outdoor".into()]),
            FieldContent::relations(vec!["Tent".to_string(), "Lantern".to_string()]),
            FieldContent::PlainText(String::new()),
        ],
    );
    engine.index_document_sync("products", &doc).unwrap();

    for query in ["mountains", "forests", "camping", "lantern"] {
        assert_eq!(ranked(&engine, query).len(), 1, "query {query:?}");
    }
    assert!(ranked(&engine, "amp").is_empty());
}

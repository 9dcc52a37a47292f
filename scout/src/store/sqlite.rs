//! SQLite index store
//!
//! One table per entity shape. Uses r2d2 connection pooling so concurrent
//! searches read without blocking each other; WAL mode lets readers proceed
//! while a writer holds its transaction. Write transactions begin IMMEDIATE
//! so concurrent writers queue on the busy timeout instead of failing.

use super::{
    parse_counter, DocKey, DocumentRows, ElementSummary, IndexStore, MetaCounters, Posting, StoreResult,
    TermPosting, META_DOC_COUNT, META_LENGTH_SUM, META_SCHEMA_VERSION, SCHEMA_VERSION,
};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Upper bound on bound parameters per `IN (...)` list
const MAX_SQL_PARAMS: usize = 500;

/// Thread-safe SQLite store using connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open or create an index database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA busy_timeout=5000;
                PRAGMA cache_size=-32000;
            ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let store = Self { pool };
        store.setup_schema()?;
        Ok(store)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // In-memory needs single connection to maintain state
        let pool = Pool::builder().max_size(1).build(manager)?;

        let store = Self { pool };
        store.setup_schema()?;
        Ok(store)
    }

    fn get_conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> StoreResult<()> {
        let conn = self.get_conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS postings (
                indexHandle TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                elementId INTEGER NOT NULL,
                term TEXT NOT NULL,
                frequency INTEGER NOT NULL CHECK (frequency >= 1),
                language TEXT NOT NULL,
                PRIMARY KEY (indexHandle, siteId, elementId, term)
            );

            CREATE TABLE IF NOT EXISTS term_stats (
                indexHandle TEXT NOT NULL,
                term TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                elementId INTEGER NOT NULL,
                frequency INTEGER NOT NULL CHECK (frequency >= 1),
                language TEXT NOT NULL,
                PRIMARY KEY (indexHandle, term, siteId, elementId)
            );

            CREATE TABLE IF NOT EXISTS title_terms (
                indexHandle TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                elementId INTEGER NOT NULL,
                term TEXT NOT NULL,
                PRIMARY KEY (indexHandle, siteId, elementId, term)
            );

            CREATE TABLE IF NOT EXISTS ngrams (
                indexHandle TEXT NOT NULL,
                ngram TEXT NOT NULL,
                term TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                PRIMARY KEY (indexHandle, ngram, term, siteId)
            );

            CREATE TABLE IF NOT EXISTS ngram_counts (
                indexHandle TEXT NOT NULL,
                term TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                ngramCount INTEGER NOT NULL,
                PRIMARY KEY (indexHandle, term, siteId)
            );

            CREATE TABLE IF NOT EXISTS metadata (
                indexHandle TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                metaKey TEXT NOT NULL,
                metaValue TEXT NOT NULL,
                PRIMARY KEY (indexHandle, siteId, metaKey)
            );

            CREATE TABLE IF NOT EXISTS element_summaries (
                indexHandle TEXT NOT NULL,
                siteId INTEGER NOT NULL,
                elementId INTEGER NOT NULL,
                title TEXT NOT NULL,
                elementType TEXT,
                searchText TEXT NOT NULL,
                termSequence TEXT NOT NULL DEFAULT '',
                language TEXT NOT NULL,
                dateUnix INTEGER,
                PRIMARY KEY (indexHandle, siteId, elementId)
            );

            CREATE INDEX IF NOT EXISTS idx_ngrams_term ON ngrams(indexHandle, siteId, term);
            CREATE INDEX IF NOT EXISTS idx_summaries_search ON element_summaries(indexHandle, siteId, searchText);
        "#,
        )?;

        Ok(())
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> StoreResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    fn read_counters(conn: &Connection, index: &str, site_id: i64) -> StoreResult<MetaCounters> {
        let read = |key: &str| -> StoreResult<Option<String>> {
            Ok(conn
                .query_row(
                    "SELECT metaValue FROM metadata WHERE indexHandle = ?1 AND siteId = ?2 AND metaKey = ?3",
                    params![index, site_id, key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?)
        };
        let docs = read(META_DOC_COUNT)?;
        let length = read(META_LENGTH_SUM)?;
        Ok(MetaCounters {
            doc_count: parse_counter(docs.as_deref(), index, site_id, META_DOC_COUNT),
            length_sum: parse_counter(length.as_deref(), index, site_id, META_LENGTH_SUM),
        })
    }

    fn write_counters(conn: &Connection, index: &str, site_id: i64, counters: MetaCounters) -> StoreResult<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO metadata (indexHandle, siteId, metaKey, metaValue) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![index, site_id, META_DOC_COUNT, counters.doc_count.to_string()])?;
        stmt.execute(params![index, site_id, META_LENGTH_SUM, counters.length_sum.to_string()])?;
        stmt.execute(params![index, site_id, META_SCHEMA_VERSION, SCHEMA_VERSION])?;
        Ok(())
    }

    /// Delete every row keyed to the document. Returns (existed, previous length, previous terms).
    fn delete_document_rows(conn: &Connection, key: &DocKey) -> StoreResult<(bool, u64, Vec<String>)> {
        let existed = conn
            .query_row(
                "SELECT 1 FROM element_summaries WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3",
                params![key.index, key.site_id, key.element_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let mut stmt = conn.prepare_cached(
            "SELECT term, frequency FROM postings WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3",
        )?;
        let previous: Vec<(String, i64)> = stmt
            .query_map(params![key.index, key.site_id, key.element_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let previous_length: u64 = previous.iter().map(|(_, f)| (*f).max(0) as u64).sum();

        let doc_params = (key.index.as_str(), key.site_id, key.element_id);
        conn.execute(
            "DELETE FROM postings WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3",
            doc_params,
        )?;
        conn.execute(
            "DELETE FROM term_stats WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3",
            doc_params,
        )?;
        conn.execute(
            "DELETE FROM title_terms WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3",
            doc_params,
        )?;
        conn.execute(
            "DELETE FROM element_summaries WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3",
            doc_params,
        )?;

        let terms = previous.into_iter().map(|(t, _)| t).collect();
        Ok((existed || previous_length > 0, previous_length, terms))
    }

    /// Drop n-gram rows of terms no posting in the site uses any more
    fn remove_orphaned_ngrams(conn: &Connection, index: &str, site_id: i64, terms: &[String]) -> StoreResult<()> {
        let mut in_use = conn.prepare_cached(
            "SELECT 1 FROM term_stats WHERE indexHandle = ?1 AND term = ?2 AND siteId = ?3 LIMIT 1",
        )?;
        for term in terms {
            let used = in_use.query_row(params![index, term, site_id], |_| Ok(())).optional()?.is_some();
            if !used {
                conn.execute(
                    "DELETE FROM ngrams WHERE indexHandle = ?1 AND siteId = ?2 AND term = ?3",
                    params![index, site_id, term],
                )?;
                conn.execute(
                    "DELETE FROM ngram_counts WHERE indexHandle = ?1 AND term = ?2 AND siteId = ?3",
                    params![index, term, site_id],
                )?;
            }
        }
        Ok(())
    }

    fn insert_document_rows(conn: &Connection, key: &DocKey, rows: &DocumentRows) -> StoreResult<()> {
        let mut posting_stmt = conn.prepare_cached(
            "INSERT INTO postings (indexHandle, siteId, elementId, term, frequency, language) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut stats_stmt = conn.prepare_cached(
            "INSERT INTO term_stats (indexHandle, term, siteId, elementId, frequency, language) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for p in &rows.postings {
            posting_stmt.execute(params![key.index, key.site_id, key.element_id, p.term, p.frequency, p.language])?;
            stats_stmt.execute(params![key.index, p.term, key.site_id, key.element_id, p.frequency, p.language])?;
        }

        let mut title_stmt = conn.prepare_cached(
            "INSERT INTO title_terms (indexHandle, siteId, elementId, term) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for term in &rows.title_terms {
            title_stmt.execute(params![key.index, key.site_id, key.element_id, term])?;
        }

        let mut ngram_stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO ngrams (indexHandle, ngram, term, siteId) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut count_stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO ngram_counts (indexHandle, term, siteId, ngramCount) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (term, grams) in &rows.ngrams {
            for gram in grams {
                ngram_stmt.execute(params![key.index, gram, term, key.site_id])?;
            }
            count_stmt.execute(params![key.index, term, key.site_id, grams.len() as i64])?;
        }

        if let Some(summary) = &rows.summary {
            conn.execute(
                r#"INSERT INTO element_summaries
                   (indexHandle, siteId, elementId, title, elementType, searchText, termSequence, language, dateUnix)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                params![
                    key.index,
                    key.site_id,
                    key.element_id,
                    summary.title,
                    summary.element_type,
                    summary.search_text,
                    summary.term_sequence,
                    summary.language,
                    summary.date_unix,
                ],
            )?;
        }
        Ok(())
    }

    fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<ElementSummary> {
        Ok(ElementSummary {
            element_id: row.get(0)?,
            title: row.get(1)?,
            element_type: row.get(2)?,
            search_text: row.get(3)?,
            term_sequence: row.get(4)?,
            language: row.get(5)?,
            date_unix: row.get(6)?,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl IndexStore for SqliteStore {
    fn ensure_index(&self, index: &str, site_id: i64) -> StoreResult<()> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO metadata (indexHandle, siteId, metaKey, metaValue) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![index, site_id, META_SCHEMA_VERSION, SCHEMA_VERSION])?;
        stmt.execute(params![index, site_id, META_DOC_COUNT, "0"])?;
        stmt.execute(params![index, site_id, META_LENGTH_SUM, "0"])?;
        Ok(())
    }

    fn index_exists(&self, index: &str) -> StoreResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row("SELECT 1 FROM metadata WHERE indexHandle = ?1 LIMIT 1", [index], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn replace_document(&self, key: &DocKey, rows: &DocumentRows) -> StoreResult<Option<u64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (existed, previous_length, previous_terms) = Self::delete_document_rows(&tx, key)?;
        Self::insert_document_rows(&tx, key, rows)?;

        let current = rows.terms();
        let orphans: Vec<String> = previous_terms.into_iter().filter(|t| !current.contains(t.as_str())).collect();
        Self::remove_orphaned_ngrams(&tx, &key.index, key.site_id, &orphans)?;

        let docs_delta = if existed { 0 } else { 1 };
        let length_delta = rows.length() as i64 - previous_length as i64;
        let counters = Self::read_counters(&tx, &key.index, key.site_id)?
            .apply_delta(docs_delta, length_delta, &key.index, key.site_id);
        Self::write_counters(&tx, &key.index, key.site_id, counters)?;

        tx.commit()?;
        debug!(index = %key.index, site_id = key.site_id, element_id = key.element_id, terms = rows.postings.len(), "document replaced");
        Ok(existed.then_some(previous_length))
    }

    fn remove_document(&self, key: &DocKey) -> StoreResult<Option<u64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (existed, previous_length, previous_terms) = Self::delete_document_rows(&tx, key)?;
        if !existed {
            return Ok(None);
        }
        Self::remove_orphaned_ngrams(&tx, &key.index, key.site_id, &previous_terms)?;

        let counters = Self::read_counters(&tx, &key.index, key.site_id)?
            .apply_delta(-1, -(previous_length as i64), &key.index, key.site_id);
        Self::write_counters(&tx, &key.index, key.site_id, counters)?;

        tx.commit()?;
        Ok(Some(previous_length))
    }

    fn clear_index(&self, index: &str) -> StoreResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for table in ["postings", "term_stats", "title_terms", "ngrams", "ngram_counts", "element_summaries"] {
            tx.execute(&format!("DELETE FROM {} WHERE indexHandle = ?1", table), [index])?;
        }
        tx.execute(
            "UPDATE metadata SET metaValue = '0' WHERE indexHandle = ?1 AND metaKey IN (?2, ?3)",
            params![index, META_DOC_COUNT, META_LENGTH_SUM],
        )?;
        tx.commit()?;
        info!(index, "index cleared");
        Ok(())
    }

    fn metadata(&self, index: &str, site_id: i64) -> StoreResult<MetaCounters> {
        let conn = self.get_conn()?;
        Self::read_counters(&conn, index, site_id)
    }

    fn term_postings(&self, index: &str, site_id: i64, term: &str) -> StoreResult<Vec<TermPosting>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT elementId, frequency, language FROM term_stats WHERE indexHandle = ?1 AND term = ?2 AND siteId = ?3 ORDER BY elementId",
        )?;
        let postings = stmt
            .query_map(params![index, term, site_id], |row| {
                Ok(TermPosting {
                    element_id: row.get(0)?,
                    frequency: row.get(1)?,
                    language: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    fn document_postings(&self, key: &DocKey) -> StoreResult<Vec<Posting>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT term, frequency, language FROM postings WHERE indexHandle = ?1 AND siteId = ?2 AND elementId = ?3 ORDER BY term",
        )?;
        let postings = stmt
            .query_map(params![key.index, key.site_id, key.element_id], |row| {
                Ok(Posting {
                    term: row.get(0)?,
                    frequency: row.get(1)?,
                    language: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    fn document_lengths(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, u64>> {
        let conn = self.get_conn()?;
        let mut lengths = HashMap::with_capacity(element_ids.len());
        for chunk in element_ids.chunks(MAX_SQL_PARAMS) {
            let sql = format!(
                "SELECT elementId, SUM(frequency) FROM postings WHERE indexHandle = ? AND siteId = ? AND elementId IN ({}) GROUP BY elementId",
                placeholders(chunk.len())
            );
            let mut values: Vec<rusqlite::types::Value> = vec![index.to_string().into(), site_id.into()];
            values.extend(chunk.iter().map(|&id| rusqlite::types::Value::from(id)));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (id, len) = row?;
                lengths.insert(id, len.max(0) as u64);
            }
        }
        Ok(lengths)
    }

    fn title_markers(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, HashSet<String>>> {
        let conn = self.get_conn()?;
        let mut markers: HashMap<i64, HashSet<String>> = HashMap::new();
        for chunk in element_ids.chunks(MAX_SQL_PARAMS) {
            let sql = format!(
                "SELECT elementId, term FROM title_terms WHERE indexHandle = ? AND siteId = ? AND elementId IN ({})",
                placeholders(chunk.len())
            );
            let mut values: Vec<rusqlite::types::Value> = vec![index.to_string().into(), site_id.into()];
            values.extend(chunk.iter().map(|&id| rusqlite::types::Value::from(id)));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (id, term) = row?;
                markers.entry(id).or_default().insert(term);
            }
        }
        Ok(markers)
    }

    fn terms_sharing_ngrams(&self, index: &str, site_id: i64, ngrams: &[String]) -> StoreResult<HashMap<String, usize>> {
        let conn = self.get_conn()?;
        let mut shared: HashMap<String, usize> = HashMap::new();
        for chunk in ngrams.chunks(MAX_SQL_PARAMS) {
            let sql = format!(
                "SELECT term, COUNT(*) FROM ngrams WHERE indexHandle = ? AND siteId = ? AND ngram IN ({}) GROUP BY term",
                placeholders(chunk.len())
            );
            let mut values: Vec<rusqlite::types::Value> = vec![index.to_string().into(), site_id.into()];
            values.extend(chunk.iter().map(|g| rusqlite::types::Value::from(g.clone())));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (term, count) = row?;
                *shared.entry(term).or_default() += count.max(0) as usize;
            }
        }
        Ok(shared)
    }

    fn ngram_counts(&self, index: &str, site_id: i64, terms: &[String]) -> StoreResult<HashMap<String, usize>> {
        let conn = self.get_conn()?;
        let mut counts = HashMap::with_capacity(terms.len());
        for chunk in terms.chunks(MAX_SQL_PARAMS) {
            let sql = format!(
                "SELECT term, ngramCount FROM ngram_counts WHERE indexHandle = ? AND siteId = ? AND term IN ({})",
                placeholders(chunk.len())
            );
            let mut values: Vec<rusqlite::types::Value> = vec![index.to_string().into(), site_id.into()];
            values.extend(chunk.iter().map(|t| rusqlite::types::Value::from(t.clone())));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (term, count) = row?;
                counts.insert(term, count.max(0) as usize);
            }
        }
        Ok(counts)
    }

    fn summaries(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, ElementSummary>> {
        let conn = self.get_conn()?;
        let mut summaries = HashMap::with_capacity(element_ids.len());
        for chunk in element_ids.chunks(MAX_SQL_PARAMS) {
            let sql = format!(
                r#"SELECT elementId, title, elementType, searchText, termSequence, language, dateUnix
                   FROM element_summaries WHERE indexHandle = ? AND siteId = ? AND elementId IN ({})"#,
                placeholders(chunk.len())
            );
            let mut values: Vec<rusqlite::types::Value> = vec![index.to_string().into(), site_id.into()];
            values.extend(chunk.iter().map(|&id| rusqlite::types::Value::from(id)));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), Self::row_to_summary)?;
            for row in rows {
                let summary = row?;
                summaries.insert(summary.element_id, summary);
            }
        }
        Ok(summaries)
    }

    fn languages(&self, index: &str, site_id: i64) -> StoreResult<BTreeSet<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT language FROM element_summaries WHERE indexHandle = ?1 AND siteId = ?2",
        )?;
        let languages = stmt
            .query_map(params![index, site_id], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(languages)
    }

    fn suggest_titles(&self, index: &str, site_id: i64, prefix: &str, limit: usize) -> StoreResult<Vec<String>> {
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let escaped = escape_like(prefix);

        // Part 1: title starts with the prefix; Part 2: a later word does
        let mut stmt = conn.prepare_cached(
            r#"SELECT title, 0 AS bucket FROM element_summaries
               WHERE indexHandle = ?1 AND siteId = ?2 AND searchText LIKE ?3 ESCAPE '\'
               UNION ALL
               SELECT title, 1 AS bucket FROM element_summaries
               WHERE indexHandle = ?1 AND siteId = ?2 AND searchText NOT LIKE ?3 ESCAPE '\' AND searchText LIKE ?4 ESCAPE '\'
               ORDER BY bucket, title"#,
        )?;
        let rows = stmt.query_map(
            params![index, site_id, format!("{}%", escaped), format!("% {}%", escaped)],
            |row| row.get::<_, String>(0),
        )?;

        let mut seen = HashSet::new();
        let mut titles = Vec::with_capacity(limit);
        for row in rows {
            let title = row?;
            if seen.insert(title.clone()) {
                titles.push(title);
                if titles.len() >= limit {
                    break;
                }
            }
        }
        Ok(titles)
    }

    fn rebuild_metadata(&self, index: &str) -> StoreResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut stmt = tx.prepare("SELECT DISTINCT siteId FROM metadata WHERE indexHandle = ?1")?;
        let sites: Vec<i64> = stmt.query_map([index], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for site_id in sites {
            let doc_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM element_summaries WHERE indexHandle = ?1 AND siteId = ?2",
                params![index, site_id],
                |row| row.get(0),
            )?;
            let length_sum: i64 = tx.query_row(
                "SELECT COALESCE(SUM(frequency), 0) FROM postings WHERE indexHandle = ?1 AND siteId = ?2",
                params![index, site_id],
                |row| row.get(0),
            )?;
            let counters = MetaCounters {
                doc_count: doc_count.max(0) as u64,
                length_sum: length_sum.max(0) as u64,
            };
            Self::write_counters(&tx, index, site_id, counters)?;
            info!(index, site_id, doc_count = counters.doc_count, length_sum = counters.length_sum, "metadata rebuilt");
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;

    #[test]
    fn test_store_creation() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.database_size().unwrap() > 0);
        assert!(!store.index_exists("products").unwrap());
    }

    #[test]
    fn test_replace_then_remove() {
        contract_tests::replace_then_remove(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_shared_terms_keep_ngrams() {
        contract_tests::shared_terms_keep_ngrams(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_clear_and_rebuild() {
        contract_tests::clear_and_rebuild(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_languages_per_site() {
        contract_tests::languages_per_site(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_suggestions() {
        contract_tests::suggestions_prefer_title_prefix(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_negative_counter_is_clamped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_index("idx", 1).unwrap();
        {
            let conn = store.get_conn().unwrap();
            conn.execute(
                "UPDATE metadata SET metaValue = '-5' WHERE indexHandle = 'idx' AND metaKey = ?1",
                [META_DOC_COUNT],
            )
            .unwrap();
        }
        assert_eq!(store.metadata("idx", 1).unwrap().doc_count, 0);
    }

    #[test]
    fn test_like_wildcards_in_prefix_are_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_index("idx", 1).unwrap();
        let mut rows = contract_tests::rows(&[("x", 1)], &[]);
        if let Some(s) = rows.summary.as_mut() {
            s.element_id = 1;
            s.title = "Plain".into();
            s.search_text = "plain".into();
        }
        store.replace_document(&DocKey::new("idx", 1, 1), &rows).unwrap();
        assert!(store.suggest_titles("idx", 1, "%", 10).unwrap().is_empty());
        assert!(store.suggest_titles("idx", 1, "_lain", 10).unwrap().is_empty());
    }
}

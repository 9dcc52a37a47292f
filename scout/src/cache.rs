//! Query result cache with LRU eviction, TTL expiration and index generations.
//!
//! Every key carries the generation of its index at lookup time. Writes bump
//! the generation, so entries computed before a local mutation are never
//! found again and simply age out of the LRU.

use crate::config::CacheConfig;
use crate::interface::{SearchOptions, SearchResult, SuggestOptions};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Search,
    Suggest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    index: String,
    site_id: i64,
    generation: u64,
    kind: Kind,
    query: String,
    /// Serialized options; distinct options never share an entry
    options: String,
}

#[derive(Debug, Clone)]
enum Cached {
    Search(SearchResult),
    Suggest(Vec<String>),
}

struct CacheEntry {
    value: Cached,
    inserted_at: Instant,
}

pub struct QueryCache {
    inner: Option<Mutex<LruCache<CacheKey, CacheEntry>>>,
    generations: Mutex<HashMap<String, u64>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = NonZeroUsize::new(config.capacity)
            .filter(|_| config.enabled)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            inner,
            generations: Mutex::new(HashMap::new()),
            ttl: config.ttl(),
        }
    }

    pub fn generation(&self, index: &str) -> u64 {
        self.generations.lock().get(index).copied().unwrap_or(0)
    }

    /// Invalidate every entry of `index`.
    pub fn bump(&self, index: &str) -> u64 {
        let mut generations = self.generations.lock();
        let generation = generations.entry(index.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    pub fn search_key(&self, index: &str, normalized_query: &str, options: &SearchOptions) -> CacheKey {
        self.key(index, options.site_id, Kind::Search, normalized_query, serde_json::to_string(options).unwrap_or_default())
    }

    pub fn suggest_key(&self, index: &str, prefix: &str, options: &SuggestOptions) -> CacheKey {
        self.key(index, options.site_id, Kind::Suggest, prefix, options.limit.to_string())
    }

    fn key(&self, index: &str, site_id: i64, kind: Kind, query: &str, options: String) -> CacheKey {
        CacheKey {
            index: index.to_string(),
            site_id,
            generation: self.generation(index),
            kind,
            query: query.to_string(),
            options,
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Cached> {
        let mut cache = self.inner.as_ref()?.lock();
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            cache.pop(key);
        }
        None
    }

    fn put(&self, key: CacheKey, value: Cached) {
        if let Some(inner) = &self.inner {
            inner.lock().put(
                key,
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn get_search(&self, key: &CacheKey) -> Option<SearchResult> {
        match self.get(key)? {
            Cached::Search(result) => Some(result),
            Cached::Suggest(_) => None,
        }
    }

    /// Results carrying warnings describe a degraded run and are not kept.
    pub fn put_search(&self, key: CacheKey, result: &SearchResult) {
        if result.warnings.is_empty() {
            self.put(key, Cached::Search(result.clone()));
        }
    }

    pub fn get_suggest(&self, key: &CacheKey) -> Option<Vec<String>> {
        match self.get(key)? {
            Cached::Suggest(titles) => Some(titles),
            Cached::Search(_) => None,
        }
    }

    pub fn put_suggest(&self, key: CacheKey, titles: &[String]) {
        self.put(key, Cached::Suggest(titles.to_vec()));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.lock().len())
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("enabled", &self.inner.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{SearchHit, SearchWarning};
    use std::thread::sleep;

    fn result(id: i64) -> SearchResult {
        SearchResult {
            hits: vec![SearchHit { element_id: id, score: 1.0, language: "en".into(), matched_terms: vec!["shoes".into()] }],
            total_count: 1,
            ..SearchResult::default()
        }
    }

    fn cache(ttl_secs: u64) -> QueryCache {
        QueryCache::new(&CacheConfig { enabled: true, capacity: 4, ttl_secs })
    }

    #[test]
    fn test_hit_and_generation_miss() {
        let cache = cache(60);
        let options = SearchOptions::default();
        let key = cache.search_key("products", "shoes", &options);
        cache.put_search(key.clone(), &result(1));
        assert_eq!(cache.get_search(&key), Some(result(1)));

        cache.bump("products");
        let fresh = cache.search_key("products", "shoes", &options);
        assert_ne!(fresh, key);
        assert!(cache.get_search(&fresh).is_none());
    }

    #[test]
    fn test_generations_are_per_index() {
        let cache = cache(60);
        cache.bump("products");
        assert_eq!(cache.generation("products"), 1);
        assert_eq!(cache.generation("articles"), 0);
    }

    #[test]
    fn test_options_are_part_of_the_key() {
        let cache = cache(60);
        let a = cache.search_key("products", "shoes", &SearchOptions::default());
        let b = cache.search_key("products", "shoes", &SearchOptions { offset: 20, ..SearchOptions::default() });
        assert_ne!(a, b);
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = QueryCache::new(&CacheConfig { enabled: true, capacity: 4, ttl_secs: 0 });
        let key = cache.suggest_key("products", "sho", &SuggestOptions::default());
        cache.put_suggest(key.clone(), &["Shoes".to_string()]);
        sleep(Duration::from_millis(5));
        assert!(cache.get_suggest(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_degraded_results_not_cached() {
        let cache = cache(60);
        let key = cache.search_key("products", "shoe", &SearchOptions::default());
        let mut degraded = result(1);
        degraded.warnings.push(SearchWarning::FuzzyTimeout { skipped_terms: vec!["shoe".into()] });
        cache.put_search(key.clone(), &degraded);
        assert!(cache.get_search(&key).is_none());
    }

    #[test]
    fn test_lru_eviction_and_disabled() {
        let cache = cache(60);
        for i in 0..6 {
            let key = cache.search_key("products", &format!("q{i}"), &SearchOptions::default());
            cache.put_search(key, &result(i));
        }
        assert_eq!(cache.len(), 4);

        let off = QueryCache::new(&CacheConfig { enabled: false, ..CacheConfig::default() });
        let key = off.search_key("products", "shoes", &SearchOptions::default());
        off.put_search(key.clone(), &result(1));
        assert!(off.get_search(&key).is_none());
    }
}

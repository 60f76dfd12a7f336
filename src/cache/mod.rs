//! Query cache with hierarchical keys
//!
//! Reads are stored under a [`QueryKey`] such as `reviews/book/5`. A mutation
//! drops every entry under the prefixes it affects, so later reads go back to
//! the backend. A cache opened on a file keeps its entries between commands:
//! every change rewrites the index, and entries older than the TTL are
//! dropped on the next read.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MAX_ENTRIES: usize = 256;

/// Ordered key segments; a key matches every prefix of itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self(segments.into_iter().map(|s| s.to_string()).collect())
    }

    /// The empty key, which prefixes everything
    pub fn root() -> Self {
        Self::default()
    }

    /// Append a segment
    pub fn child(mut self, segment: impl ToString) -> Self {
        self.0.push(segment.to_string());
        self
    }

    /// Append a query string as one segment; empty queries add nothing
    pub fn with_query(self, query: &[(String, String)]) -> Self {
        if query.is_empty() {
            return self;
        }
        let joined = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        self.child(joined)
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Writes that make cached reads stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Review created or edited on a book
    ReviewSaved { book_id: i64 },
    /// Review removed; the book is known only when the review was cached
    ReviewDeleted { book_id: Option<i64> },
    /// Favorite added, removed or toggled
    FavoriteChanged { book_id: i64 },
    ProfileUpdated,
    RecommendationsRefreshed,
    /// Login, logout or expiry; nothing cached belongs to the new identity
    SessionChanged,
}

impl Mutation {
    /// Prefixes whose entries the mutation invalidates
    pub fn invalidates(&self) -> Vec<QueryKey> {
        match *self {
            Mutation::ReviewSaved { book_id } => vec![
                QueryKey::new(["reviews", "book"]).child(book_id),
                QueryKey::new(["reviews", "currentUser"]),
                QueryKey::new(["book"]).child(book_id),
                QueryKey::new(["user", "profile"]),
            ],
            Mutation::ReviewDeleted { book_id } => vec![
                QueryKey::new(["reviews"]),
                QueryKey::new(["user", "profile"]),
                match book_id {
                    Some(id) => QueryKey::new(["book"]).child(id),
                    None => QueryKey::new(["book"]),
                },
            ],
            Mutation::FavoriteChanged { book_id } => vec![
                QueryKey::new(["user", "favorite"]).child(book_id),
                QueryKey::new(["user", "favorites"]),
                QueryKey::new(["user", "stats"]),
                QueryKey::new(["user", "profile"]),
            ],
            Mutation::ProfileUpdated => vec![
                QueryKey::new(["user", "profile"]),
                QueryKey::new(["user", "stats"]),
            ],
            Mutation::RecommendationsRefreshed => vec![QueryKey::new(["recommendations"])],
            Mutation::SessionChanged => vec![QueryKey::root()],
        }
    }
}

struct CacheEntry {
    value: Value,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // A timestamp from the future means the clock moved; treat it as stale
        (now - self.stored_at)
            .to_std()
            .map(|age| age < ttl)
            .unwrap_or(false)
    }
}

/// One row of the on-disk index
#[derive(Debug, Serialize, Deserialize)]
struct StoredQuery {
    key: Vec<String>,
    stored_at: DateTime<Utc>,
    value: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    queries: Vec<StoredQuery>,
}

pub struct QueryCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<QueryKey, CacheEntry>,
    path: Option<PathBuf>,
}

impl QueryCache {
    /// Cache held in memory only. A zero `ttl` disables caching: every read
    /// misses
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: HashMap::new(),
            path: None,
        }
    }

    /// Cache backed by the index file at `path`
    ///
    /// A missing file starts empty. An unreadable one is logged and replaced
    /// on the next write.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let mut cache = Self::new(ttl);

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CacheIndex>(&content) {
                Ok(index) => {
                    for query in index.queries {
                        cache.entries.insert(
                            QueryKey(query.key),
                            CacheEntry {
                                value: query.value,
                                stored_at: query.stored_at,
                            },
                        );
                    }
                    tracing::debug!(
                        "Loaded {} cached queries from {}",
                        cache.entries.len(),
                        path.display()
                    );
                }
                Err(e) => tracing::warn!("Ignoring corrupt query cache {}: {}", path.display(), e),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not read query cache {}: {}", path.display(), e),
        }

        cache.path = Some(path);
        cache
    }

    /// Rewrite the index file; failures only cost future cache hits
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.write_index(path) {
            tracing::warn!("Could not write query cache {}: {}", path.display(), e);
        }
    }

    fn write_index(&self, path: &Path) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let index = CacheIndex {
            queries: self
                .entries
                .iter()
                .map(|(key, entry)| StoredQuery {
                    key: key.0.clone(),
                    stored_at: entry.stored_at,
                    value: entry.value.clone(),
                })
                .collect(),
        };
        let content = serde_json::to_string(&index)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Drop expired entries, returning how many went
    fn evict_stale(&mut self) -> usize {
        let ttl = self.ttl;
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(ttl, now));
        before - self.entries.len()
    }

    /// Fresh cached value for `key`
    pub fn get<T: DeserializeOwned>(&mut self, key: &QueryKey) -> Option<T> {
        if self.evict_stale() > 0 {
            self.persist();
        }
        let entry = self.entries.get(key)?;
        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                tracing::trace!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.entries.remove(key);
                self.persist();
                None
            }
        }
    }

    pub fn insert<T: Serialize>(&mut self, key: QueryKey, value: &T) {
        if self.ttl.is_zero() {
            return;
        }
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Not caching {}: {}", key, e);
                return;
            }
        };

        self.evict_stale();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Utc::now(),
            },
        );
        self.persist();
    }

    fn remove_under(&mut self, prefix: &QueryKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before - self.entries.len()
    }

    /// Drop every entry under `prefix`, returning how many were removed
    pub fn invalidate(&mut self, prefix: &QueryKey) -> usize {
        let removed = self.remove_under(prefix);
        if removed > 0 {
            self.persist();
        }
        removed
    }

    pub fn apply(&mut self, mutation: Mutation) {
        let removed: usize = mutation
            .invalidates()
            .iter()
            .map(|prefix| self.remove_under(prefix))
            .sum();
        if removed > 0 {
            self.persist();
        }
        tracing::debug!("{:?} invalidated {} cached queries", mutation, removed);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> QueryCache {
        QueryCache::new(Duration::from_secs(60))
    }

    fn keys() -> Vec<QueryKey> {
        vec![
            QueryKey::new(["book", "5"]),
            QueryKey::new(["book", "6"]),
            QueryKey::new(["reviews", "book", "5", "page=0"]),
            QueryKey::new(["reviews", "book", "6"]),
            QueryKey::new(["reviews", "currentUser", "page=0"]),
            QueryKey::new(["user", "profile"]),
            QueryKey::new(["user", "stats"]),
            QueryKey::new(["user", "favorite", "5"]),
            QueryKey::new(["user", "favorites", "page=0"]),
            QueryKey::new(["recommendations", "PERSONALIZED"]),
        ]
    }

    fn filled() -> QueryCache {
        let mut cache = cache();
        for key in keys() {
            cache.insert(key, &1);
        }
        cache
    }

    fn remaining(cache: &mut QueryCache) -> Vec<String> {
        let mut left: Vec<String> = keys()
            .into_iter()
            .filter(|key| cache.get::<i32>(key).is_some())
            .map(|key| key.to_string())
            .collect();
        left.sort();
        left
    }

    #[test]
    fn test_get_and_insert() {
        let mut cache = cache();
        let key = QueryKey::new(["book", "5"]);

        assert_eq!(cache.get::<String>(&key), None);
        cache.insert(key.clone(), &"Dune".to_string());
        assert_eq!(cache.get::<String>(&key).as_deref(), Some("Dune"));
    }

    #[test]
    fn test_zero_ttl_never_serves() {
        let mut cache = QueryCache::new(Duration::ZERO);
        let key = QueryKey::new(["user", "profile"]);

        cache.insert(key.clone(), &1);

        assert_eq!(cache.get::<i32>(&key), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_prefix_matching() {
        let key = QueryKey::new(["reviews", "book", "5"]);

        assert!(key.starts_with(&QueryKey::new(["reviews"])));
        assert!(key.starts_with(&QueryKey::root()));
        assert!(!key.starts_with(&QueryKey::new(["reviews", "book", "50"])));
        assert_eq!(key.to_string(), "reviews/book/5");
    }

    #[test]
    fn test_with_query_segment() {
        let query = vec![
            ("page".to_string(), "0".to_string()),
            ("size".to_string(), "20".to_string()),
        ];

        assert_eq!(QueryKey::new(["books"]).with_query(&query).to_string(), "books/page=0&size=20");
        assert_eq!(QueryKey::new(["books"]).with_query(&[]), QueryKey::new(["books"]));
    }

    #[test]
    fn test_review_saved_invalidation() {
        let mut cache = filled();

        cache.apply(Mutation::ReviewSaved { book_id: 5 });

        assert_eq!(
            remaining(&mut cache),
            vec![
                "book/6",
                "recommendations/PERSONALIZED",
                "reviews/book/6",
                "user/favorite/5",
                "user/favorites/page=0",
                "user/stats",
            ]
        );
    }

    #[test]
    fn test_review_deleted_invalidation() {
        let mut cache = filled();

        cache.apply(Mutation::ReviewDeleted { book_id: Some(5) });

        let left = remaining(&mut cache);
        assert!(left.iter().all(|key| !key.starts_with("reviews")));
        assert!(!left.contains(&"user/profile".to_string()));
        assert!(!left.contains(&"book/5".to_string()));
        assert!(left.contains(&"book/6".to_string()));
    }

    #[test]
    fn test_review_deleted_on_unknown_book() {
        let mut cache = filled();

        cache.apply(Mutation::ReviewDeleted { book_id: None });

        let left = remaining(&mut cache);
        assert!(left.iter().all(|key| !key.starts_with("book/")));
        assert!(left.contains(&"user/stats".to_string()));
    }

    #[test]
    fn test_favorite_changed_invalidation() {
        let mut cache = filled();

        cache.apply(Mutation::FavoriteChanged { book_id: 5 });

        let left = remaining(&mut cache);
        assert_eq!(left.iter().filter(|key| key.starts_with("user")).count(), 0);
        assert_eq!(left.len(), keys().len() - 4);
    }

    #[test]
    fn test_profile_and_recommendation_invalidation() {
        let mut cache = filled();

        cache.apply(Mutation::ProfileUpdated);
        cache.apply(Mutation::RecommendationsRefreshed);

        let left = remaining(&mut cache);
        assert!(!left.contains(&"user/profile".to_string()));
        assert!(!left.contains(&"user/stats".to_string()));
        assert!(!left.contains(&"recommendations/PERSONALIZED".to_string()));
        assert!(left.contains(&"user/favorites/page=0".to_string()));
    }

    #[test]
    fn test_session_change_clears_everything() {
        let mut cache = filled();

        cache.apply(Mutation::SessionChanged);

        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_oldest_entry_evicted_when_full() {
        let mut cache = cache();
        cache.max_entries = 2;

        cache.insert(QueryKey::new(["a"]), &1);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(QueryKey::new(["b"]), &2);
        cache.insert(QueryKey::new(["c"]), &3);

        assert_eq!(cache.get::<i32>(&QueryKey::new(["a"])), None);
        assert_eq!(cache.get::<i32>(&QueryKey::new(["c"])), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("queries.json");
        let key = QueryKey::new(["book", "5"]);

        let mut first = QueryCache::open(&path, Duration::from_secs(60));
        first.insert(key.clone(), &"Dune".to_string());

        let mut second = QueryCache::open(&path, Duration::from_secs(60));
        assert_eq!(second.get::<String>(&key).as_deref(), Some("Dune"));
    }

    #[test]
    fn test_invalidation_rewrites_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");

        let mut first = QueryCache::open(&path, Duration::from_secs(60));
        for key in keys() {
            first.insert(key, &1);
        }
        first.apply(Mutation::ReviewSaved { book_id: 5 });

        let mut second = QueryCache::open(&path, Duration::from_secs(60));
        assert_eq!(second.get::<i32>(&QueryKey::new(["book", "5"])), None);
        assert_eq!(second.get::<i32>(&QueryKey::new(["book", "6"])), Some(1));

        second.clear();
        assert_eq!(QueryCache::open(&path, Duration::from_secs(60)).len(), 0);
    }

    #[test]
    fn test_expired_entries_not_served_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        let stale = CacheIndex {
            queries: vec![StoredQuery {
                key: vec!["book".to_string(), "5".to_string()],
                stored_at: Utc::now() - chrono::Duration::seconds(120),
                value: Value::from(1),
            }],
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let mut cache = QueryCache::open(&path, Duration::from_secs(60));

        assert_eq!(cache.get::<i32>(&QueryKey::new(["book", "5"])), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut cache = QueryCache::open(&path, Duration::from_secs(60));
        assert_eq!(cache.len(), 0);

        cache.insert(QueryKey::new(["user", "profile"]), &1);
        let mut reopened = QueryCache::open(&path, Duration::from_secs(60));
        assert_eq!(reopened.get::<i32>(&QueryKey::new(["user", "profile"])), Some(1));
    }
}

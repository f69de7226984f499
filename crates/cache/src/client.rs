//! The cache client the pipeline talks to.
//!
//! Entries are JSON documents wrapping the cached payload with bookkeeping
//! (creation time, hit count, tags, format version). Auxiliary structures
//! live next to them in the same store:
//!
//! - `{prefix}:tag:{tag}`: set of keys carrying that tag
//! - `{prefix}:meta:tags`: set of tags in use
//! - `{prefix}:meta:hits`: hash of key → hit count since the last write
//! - `{prefix}:meta:recent`: capped list of recently cached queries
//!
//! A miss clears the key's hit count. Tag memberships of expired keys are
//! pruned every [`PRUNE_INTERVAL`] writes, or on demand with
//! [`CacheClient::prune`].

use crate::clock::{Clock, SystemClock};
use crate::key::CacheKey;
use crate::similarity::jaccard_similarity;
use crate::store::{InMemoryStore, KvStore};
use pathwise_config::CacheConfig;
use pathwise_core::error::CacheError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Bumped whenever the entry layout changes; older entries read as misses.
pub const ENTRY_VERSION: u32 = 1;

/// Writes between automatic [`CacheClient::prune`] passes.
pub const PRUNE_INTERVAL: u64 = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Value,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub hit_count: u64,
    pub tags: BTreeSet<String>,
    pub version: u32,
}

impl CacheEntry {
    /// Decode the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| CacheError::Encoding(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl: Duration,
    pub similarity_threshold: f64,
    pub similarity_scan_limit: usize,
    pub recent_query_limit: usize,
    pub key_prefix: String,
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            similarity_threshold: config.similarity_threshold,
            similarity_scan_limit: config.similarity_scan_limit,
            recent_query_limit: config.recent_query_limit,
            key_prefix: config.key_prefix.clone(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

/// A near-duplicate hit returned by [`CacheClient::find_similar`].
#[derive(Debug, Clone)]
pub struct SimilarHit {
    pub key: String,
    /// The cached query that matched
    pub query: String,
    pub similarity: f64,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub store_errors: u64,
    pub tracked_keys: usize,
}

#[derive(Serialize, Deserialize)]
struct RecentQuery {
    query: String,
    key: String,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    store_errors: AtomicU64,
}

pub struct CacheClient {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    counters: Counters,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, settings: CacheSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            counters: Counters::default(),
        }
    }

    /// An in-memory cache on the system clock.
    pub fn in_memory(settings: CacheSettings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        Self::new(store, clock, settings)
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::in_memory(CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Render a [`CacheKey`] under this client's prefix.
    pub fn key(&self, key: &CacheKey) -> String {
        key.render(&self.settings.key_prefix)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}:tag:{tag}", self.settings.key_prefix)
    }

    fn tags_key(&self) -> String {
        format!("{}:meta:tags", self.settings.key_prefix)
    }

    fn hits_key(&self) -> String {
        format!("{}:meta:hits", self.settings.key_prefix)
    }

    fn recent_key(&self) -> String {
        format!("{}:meta:recent", self.settings.key_prefix)
    }

    fn store_failed(&self, op: &str, key: &str, error: &CacheError) {
        self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, key, store = self.store.name(), error = %error, "Cache store failure");
    }

    async fn forget_hits(&self, key: &str) {
        if let Err(e) = self.store.hash_delete(&self.hits_key(), key).await {
            self.store_failed("hash_delete", key, &e);
        }
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// Look up an entry. Absent, expired, corrupt and outdated entries are
    /// misses, as is any store failure.
    ///
    /// A hit increments the entry's hit count and writes it back with its
    /// remaining time to live unchanged.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.settings.enabled {
            return None;
        }

        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.forget_hits(key).await;
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                self.store_failed("get", key, &e);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let mut entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt cache entry");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if entry.version != ENTRY_VERSION {
            debug!(key, version = entry.version, "Cache entry version mismatch");
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        entry.hit_count = match self.store.hash_incr(&self.hits_key(), key, 1).await {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                self.store_failed("hash_incr", key, &e);
                entry.hit_count + 1
            }
        };

        match serde_json::to_string(&entry) {
            Ok(updated) => {
                if let Err(e) = self.store.set_keep_ttl(key, updated).await {
                    self.store_failed("set_keep_ttl", key, &e);
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to re-encode cache entry"),
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key, hits = entry.hit_count, "Cache hit");
        Some(entry)
    }

    /// Look up and decode a payload. Undecodable payloads are misses.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.get(key).await?;
        match entry.decode() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached payload does not match the expected shape");
                None
            }
        }
    }

    // ── Writes ─────────────────────────────────────────────────────────

    /// Store a payload under `key`, indexing it under each tag.
    ///
    /// Returns whether the entry was written. Failures are logged, never raised.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        payload: &T,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> bool {
        if !self.settings.enabled {
            return false;
        }

        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache payload");
                return false;
            }
        };
        let entry = CacheEntry {
            payload,
            created_at: self.clock.now_millis(),
            hit_count: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            version: ENTRY_VERSION,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache entry");
                return false;
            }
        };

        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        if let Err(e) = self.store.set_ex(key, raw, ttl).await {
            self.store_failed("set_ex", key, &e);
            return false;
        }
        // Hits on a replaced entry do not carry over
        self.forget_hits(key).await;
        for tag in &entry.tags {
            if let Err(e) = self.store.set_add(&self.tag_key(tag), key).await {
                self.store_failed("set_add", key, &e);
            }
            if let Err(e) = self.store.set_add(&self.tags_key(), tag).await {
                self.store_failed("set_add", &self.tags_key(), &e);
            }
        }

        let writes = self.counters.writes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(key, ttl_secs = ttl.as_secs(), tags = ?entry.tags, "Cache write");
        if writes % PRUNE_INTERVAL == 0 {
            self.prune().await;
        }
        true
    }

    /// Like [`set`](Self::set), and also records `query` for
    /// [`find_similar`](Self::find_similar).
    pub async fn set_for_query<T: Serialize + ?Sized>(
        &self,
        query: &str,
        key: &str,
        payload: &T,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> bool {
        if !self.set(key, payload, ttl, tags).await {
            return false;
        }

        let record = RecentQuery {
            query: query.to_string(),
            key: key.to_string(),
        };
        match serde_json::to_string(&record) {
            Ok(raw) => {
                if let Err(e) = self
                    .store
                    .list_push_capped(&self.recent_key(), raw, self.settings.recent_query_limit)
                    .await
                {
                    self.store_failed("list_push_capped", key, &e);
                }
            }
            Err(e) => warn!(key, error = %e, "Failed to encode recent query"),
        }
        true
    }

    /// Delete every key indexed under any of `tags`. Returns how many
    /// entries were removed.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        let mut removed = 0;
        for tag in tags {
            let tag_key = self.tag_key(tag);
            let members = match self.store.set_members(&tag_key).await {
                Ok(members) => members,
                Err(e) => {
                    self.store_failed("set_members", &tag_key, &e);
                    continue;
                }
            };
            for key in members {
                match self.store.delete(&key).await {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => self.store_failed("delete", &key, &e),
                }
                if let Err(e) = self.store.hash_delete(&self.hits_key(), &key).await {
                    self.store_failed("hash_delete", &key, &e);
                }
            }
            if let Err(e) = self.store.delete(&tag_key).await {
                self.store_failed("delete", &tag_key, &e);
            }
            if let Err(e) = self.store.set_remove(&self.tags_key(), tag).await {
                self.store_failed("set_remove", &self.tags_key(), &e);
            }
        }
        debug!(?tags, removed, "Invalidated cache tags");
        removed
    }

    /// Drop tag memberships and hit counts of keys whose entries are gone.
    /// Returns how many dead keys were found.
    pub async fn prune(&self) -> usize {
        let mut dead: BTreeSet<String> = BTreeSet::new();

        let tags = match self.store.set_members(&self.tags_key()).await {
            Ok(tags) => tags,
            Err(e) => {
                self.store_failed("set_members", &self.tags_key(), &e);
                Vec::new()
            }
        };
        for tag in tags {
            let tag_key = self.tag_key(&tag);
            let members = match self.store.set_members(&tag_key).await {
                Ok(members) => members,
                Err(e) => {
                    self.store_failed("set_members", &tag_key, &e);
                    continue;
                }
            };
            let mut live = 0;
            for key in members {
                match self.store.get(&key).await {
                    Ok(Some(_)) => live += 1,
                    Ok(None) => {
                        if let Err(e) = self.store.set_remove(&tag_key, &key).await {
                            self.store_failed("set_remove", &tag_key, &e);
                        }
                        dead.insert(key);
                    }
                    Err(e) => self.store_failed("get", &key, &e),
                }
            }
            if live == 0 {
                if let Err(e) = self.store.set_remove(&self.tags_key(), &tag).await {
                    self.store_failed("set_remove", &self.tags_key(), &e);
                }
            }
        }

        match self.store.hash_get_all(&self.hits_key()).await {
            Ok(counts) => {
                for key in counts.into_keys() {
                    if dead.contains(&key) || matches!(self.store.get(&key).await, Ok(None)) {
                        dead.insert(key);
                    }
                }
            }
            Err(e) => self.store_failed("hash_get_all", &self.hits_key(), &e),
        }
        for key in &dead {
            self.forget_hits(key).await;
        }

        if !dead.is_empty() {
            debug!(dead = dead.len(), "Pruned expired cache keys");
        }
        dead.len()
    }

    // ── Near-duplicate lookup ──────────────────────────────────────────

    /// Scan the most recently cached queries for one similar enough to
    /// `query` and return its payload. Best effort only.
    pub async fn find_similar(&self, query: &str) -> Option<SimilarHit> {
        if !self.settings.enabled {
            return None;
        }

        let recent = match self
            .store
            .list_range(&self.recent_key(), self.settings.similarity_scan_limit)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                self.store_failed("list_range", &self.recent_key(), &e);
                return None;
            }
        };

        for raw in recent {
            let Ok(record) = serde_json::from_str::<RecentQuery>(&raw) else {
                continue;
            };
            let similarity = jaccard_similarity(query, &record.query);
            if similarity < self.settings.similarity_threshold {
                continue;
            }
            // The entry may have expired since it was recorded
            if let Some(entry) = self.get(&record.key).await {
                debug!(query, matched = %record.query, similarity, "Similar cached query");
                return Some(SimilarHit {
                    key: record.key,
                    query: record.query,
                    similarity,
                    payload: entry.payload,
                });
            }
        }
        None
    }

    // ── Introspection ──────────────────────────────────────────────────

    /// The `n` most read keys with their hit counts, highest first.
    pub async fn popular(&self, n: usize) -> Vec<(String, u64)> {
        let counts = match self.store.hash_get_all(&self.hits_key()).await {
            Ok(counts) => counts,
            Err(e) => {
                self.store_failed("hash_get_all", &self.hits_key(), &e);
                return Vec::new();
            }
        };
        let mut ranked: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(key, count)| (key, count.max(0) as u64))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub async fn stats(&self) -> CacheStats {
        let tracked_keys = self
            .store
            .hash_get_all(&self.hits_key())
            .await
            .map(|counts| counts.len())
            .unwrap_or(0);
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            tracked_keys,
        }
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("store", &self.store.name())
            .field("settings", &self.settings)
            .finish()
    }
}

//! Key-value store abstraction and the in-memory implementation.
//!
//! The primitive set mirrors a Redis-style server (plain values with
//! expiry, sets, capped lists, counter hashes) so a networked store can
//! slot in behind the same trait. Each primitive is atomic for its key.
//!
//! Expired values are removed when a read observes them, and swept in bulk
//! every [`PURGE_INTERVAL`] writes.

use async_trait::async_trait;
use pathwise_core::error::CacheError;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use crate::clock::{Clock, SystemClock};

#[async_trait]
pub trait KvStore: Send + Sync {
    /// The store name (e.g., "in_memory").
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Replace a live value without touching its expiry. Returns `false` if absent.
    async fn set_keep_ttl(&self, key: &str, value: String) -> Result<bool, CacheError>;

    /// Remaining time to live of a live value.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Delete a key of any kind. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// Remove a set member; an emptied set is deleted.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError>;

    /// Push to the front of a list, trimming it to `max_len`.
    async fn list_push_capped(&self, key: &str, value: String, max_len: usize) -> Result<(), CacheError>;

    /// Up to `limit` list items, newest first.
    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, CacheError>;

    /// Increment a counter field, returning the new value.
    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError>;

    /// Remove a counter field; an emptied hash is deleted.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError>;
}

/// Writes between bulk sweeps of expired values.
pub const PURGE_INTERVAL: usize = 128;

enum Slot {
    Value { data: String, expires_at: i64 },
    Set(BTreeSet<String>),
    List(VecDeque<String>),
    Hash(HashMap<String, i64>),
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Store(format!("WRONGTYPE operation against key '{key}'"))
}

/// A process-local store. Values expire according to the injected clock.
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Arc::new(RwLock::new(HashMap::new())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Drop expired values. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut slots = self.slots.write().await;
        purge(&mut slots, now)
    }

    /// Remove `key` if it still holds a value expired at `now`.
    async fn evict_expired(&self, key: &str, now: i64) {
        let mut slots = self.slots.write().await;
        if matches!(slots.get(key), Some(Slot::Value { expires_at, .. }) if *expires_at <= now) {
            slots.remove(key);
        }
    }

    /// Number of keys held, expired values included until observed or swept.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn purge(slots: &mut HashMap<String, Slot>, now: i64) -> usize {
    let before = slots.len();
    slots.retain(|_, slot| !matches!(slot, Slot::Value { expires_at, .. } if *expires_at <= now));
    before - slots.len()
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now_millis();
        {
            let slots = self.slots.read().await;
            match slots.get(key) {
                Some(Slot::Value { data, expires_at }) if *expires_at > now => return Ok(Some(data.clone())),
                Some(Slot::Value { .. }) => {}
                None => return Ok(None),
                Some(_) => return Err(wrong_type(key)),
            }
        }
        self.evict_expired(key, now).await;
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now_millis();
        let expires_at = now + ttl.as_millis() as i64;
        let mut slots = self.slots.write().await;
        slots.insert(key.to_string(), Slot::Value { data: value, expires_at });

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_INTERVAL == 0 {
            let removed = purge(&mut slots, now);
            if removed > 0 {
                debug!(removed, remaining = slots.len(), "Swept expired cache values");
            }
        }
        Ok(())
    }

    async fn set_keep_ttl(&self, key: &str, value: String) -> Result<bool, CacheError> {
        let now = self.clock.now_millis();
        let mut slots = self.slots.write().await;
        match slots.get_mut(key) {
            Some(Slot::Value { data, expires_at }) if *expires_at > now => {
                *data = value;
                Ok(true)
            }
            Some(Slot::Value { .. }) | None => Ok(false),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = self.clock.now_millis();
        let slots = self.slots.read().await;
        match slots.get(key) {
            Some(Slot::Value { expires_at, .. }) if *expires_at > now => {
                Ok(Some(Duration::from_millis((*expires_at - now) as u64)))
            }
            Some(Slot::Value { .. }) | None => Ok(None),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.slots.write().await.remove(key).is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut slots = self.slots.write().await;
        match slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Set(BTreeSet::new()))
        {
            Slot::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        match self.slots.read().await.get(key) {
            Some(Slot::Set(members)) => Ok(members.iter().cloned().collect()),
            None => Ok(Vec::new()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(key) {
            Some(Slot::Set(members)) => {
                members.remove(member);
                if members.is_empty() {
                    slots.remove(key);
                }
                Ok(())
            }
            None => Ok(()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn list_push_capped(&self, key: &str, value: String, max_len: usize) -> Result<(), CacheError> {
        let mut slots = self.slots.write().await;
        match slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::List(VecDeque::new()))
        {
            Slot::List(items) => {
                items.push_front(value);
                items.truncate(max_len);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, CacheError> {
        match self.slots.read().await.get(key) {
            Some(Slot::List(items)) => Ok(items.iter().take(limit).cloned().collect()),
            None => Ok(Vec::new()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError> {
        let mut slots = self.slots.write().await;
        match slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::Hash(HashMap::new()))
        {
            Slot::Hash(fields) => {
                let counter = fields.entry(field.to_string()).or_insert(0);
                *counter += by;
                Ok(*counter)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError> {
        match self.slots.read().await.get(key) {
            Some(Slot::Hash(fields)) => Ok(fields.clone()),
            None => Ok(HashMap::new()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(key) {
            Some(Slot::Hash(fields)) => {
                fields.remove(field);
                if fields.is_empty() {
                    slots.remove(key);
                }
                Ok(())
            }
            None => Ok(()),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

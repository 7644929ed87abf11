//! Expiring key/value store used for process-local shared state.
//!
//! Rate-limit counters and cached gateway credentials both live behind the
//! [`ExpiringStore`] trait so a distributed backend can replace the
//! in-memory one without touching call sites.
//!
//! # Eviction policy of [`InMemoryStore`]
//!
//! - Every entry carries an absolute expiry; expired entries are invisible
//!   and are dropped lazily when touched.
//! - When an insert would exceed `max_entries`, all expired entries are
//!   purged first; if the store is still full, the entries closest to expiry
//!   are evicted until there is room.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Key/value store whose entries expire after a per-entry TTL.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Get a live value.
    async fn get(&self, key: &str) -> Option<String>;
    /// Insert or replace a value that expires after `ttl`.
    async fn put(&self, key: &str, value: String, ttl: Duration);
    /// Remove a value if present.
    async fn remove(&self, key: &str);
    /// Increment a counter and return the new count.
    ///
    /// A missing or expired counter restarts at 1 with a fresh `ttl`; an
    /// existing counter keeps its original expiry (fixed window).
    async fn increment(&self, key: &str, ttl: Duration) -> u64;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local [`ExpiringStore`]. No cross-process coordination.
#[derive(Debug)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
}

impl InMemoryStore {
    /// Create a store bounded to `max_entries` (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of entries currently held, including not yet purged expired ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn make_room(entries: &mut HashMap<String, Entry>, max_entries: usize, now: Instant) {
        if entries.len() < max_entries {
            return;
        }
        entries.retain(|_, e| e.is_live(now));

        if entries.len() >= max_entries {
            let mut by_expiry: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.expires_at))
                .collect();
            by_expiry.sort_by_key(|(_, at)| *at);
            let excess = entries.len() + 1 - max_entries;
            for (key, _) in by_expiry.into_iter().take(excess) {
                entries.remove(&key);
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ExpiringStore for InMemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(e) if e.is_live(now) => return Some(e.value.clone()),
                None => return None,
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            Self::make_room(&mut entries, self.max_entries, now);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn increment(&self, key: &str, ttl: Duration) -> u64 {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_live(now) {
                let next = entry.value.parse::<u64>().unwrap_or(0) + 1;
                entry.value = next.to_string();
                return next;
            }
        } else {
            Self::make_room(&mut entries, self.max_entries, now);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: "1".to_string(),
                expires_at: now + ttl,
            },
        );
        1
    }
}

//! Snapshot and prefetch caches

use crate::snapshot::PageSnapshot;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use veer_net::{FetchResponse, Location};

/// Most-recently-used cache of page snapshots keyed by request URL.
/// Snapshots are cloned on the way in and on the way out, so nothing held
/// by a caller aliases a cached entry.
#[derive(Debug)]
pub struct SnapshotCache {
    capacity: usize,
    entries: HashMap<String, PageSnapshot>,
    /// Keys, least recently touched first
    order: VecDeque<String>,
}

impl SnapshotCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: HashMap::new(), order: VecDeque::new() }
    }

    pub fn has(&self, location: &Location) -> bool {
        self.entries.contains_key(&location.cache_key())
    }

    /// A copy of the cached snapshot; marks the entry most recently used
    pub fn get(&mut self, location: &Location) -> Option<PageSnapshot> {
        let key = location.cache_key();
        let snapshot = self.entries.get(&key)?.clone();
        self.touch(&key);
        tracing::debug!(%location, "snapshot cache hit");
        Some(snapshot)
    }

    /// Store a copy of `snapshot`, evicting the least recently used entry
    /// when full
    pub fn put(&mut self, location: &Location, snapshot: &PageSnapshot) {
        let key = location.cache_key();
        if self.entries.insert(key.clone(), snapshot.clone()).is_none() {
            self.order.push_back(key);
            while self.entries.len() > self.capacity {
                self.evict_one();
            }
        } else {
            self.touch(&key);
        }
        tracing::debug!(%location, size = self.entries.len(), "snapshot cached");
    }

    pub fn remove(&mut self, location: &Location) -> Option<PageSnapshot> {
        let key = location.cache_key();
        self.order.retain(|k| *k != key);
        self.entries.remove(&key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached keys, least recently used first
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_one(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            tracing::debug!(url = %oldest, "snapshot evicted");
            self.entries.remove(&oldest);
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(10)
    }
}

#[derive(Debug, Clone)]
struct PrefetchEntry {
    location: Location,
    response: FetchResponse,
    expires_at: Instant,
}

/// Holds at most one prefetched response, valid for a fixed time
#[derive(Debug)]
pub struct PrefetchCache {
    ttl: Duration,
    entry: Option<PrefetchEntry>,
}

impl PrefetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Replace the slot
    pub fn put(&mut self, location: &Location, response: FetchResponse) {
        self.put_at(location, response, Instant::now());
    }

    pub(crate) fn put_at(&mut self, location: &Location, response: FetchResponse, now: Instant) {
        self.entry = Some(PrefetchEntry {
            location: location.without_anchor(),
            response,
            expires_at: now + self.ttl,
        });
    }

    /// Take the response for `location` if it is still fresh. A hit empties
    /// the slot.
    pub fn take(&mut self, location: &Location) -> Option<FetchResponse> {
        self.take_at(location, Instant::now())
    }

    pub(crate) fn take_at(&mut self, location: &Location, now: Instant) -> Option<FetchResponse> {
        let entry = self.entry.as_ref()?;
        if now >= entry.expires_at {
            self.entry = None;
            return None;
        }
        if !entry.location.is_same_page(location) {
            return None;
        }
        self.entry.take().map(|e| e.response)
    }

    /// Whether a fresh entry for `location` exists
    pub fn has(&self, location: &Location) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|e| Instant::now() < e.expires_at && e.location.is_same_page(location))
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

impl Default for PrefetchCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

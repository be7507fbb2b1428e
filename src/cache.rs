//! Bounded, time-limited cache for query results.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted: Instant,
    seq: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Insertion order, oldest first. May hold stale slots for keys
    /// that were purged or re-inserted; `seq` tells them apart.
    order: VecDeque<(K, u64)>,
    next_seq: u64,
    /// Bumped by every clear.
    generation: u64,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    fn is_live(&self, key: &K, seq: u64) -> bool {
        self.entries.get(key).is_some_and(|e| e.seq == seq)
    }
}

/// Thread-safe cache with a fixed capacity and per-entry TTL.
///
/// Expired entries are dropped lazily on access. When full, the oldest
/// insertion is evicted. A capacity of zero disables the cache entirely.
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
                generation: 0,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0 && !self.ttl.is_zero()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let mut inner = self.inner.lock().ok()?;
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.is_enabled() {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        self.insert_locked(&mut inner, key, value);
    }

    /// Current clear counter. Read it before computing a value, then hand it
    /// to [`insert_if_current`](Self::insert_if_current).
    pub fn generation(&self) -> u64 {
        self.inner.lock().map(|i| i.generation).unwrap_or(0)
    }

    /// Insert unless the cache was cleared after `generation` was read.
    /// Returns whether the value was stored.
    pub fn insert_if_current(&self, generation: u64, key: K, value: V) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if inner.generation != generation {
            return false;
        }
        self.insert_locked(&mut inner, key, value);
        true
    }

    fn insert_locked(&self, inner: &mut Inner<K, V>, key: K, value: V) {
        let now = Instant::now();
        self.purge_expired(inner, now);

        // Re-inserting refreshes the entry; its old order slot goes stale
        inner.entries.remove(&key);
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some((old, seq)) => {
                    if inner.is_live(&old, seq) {
                        inner.entries.remove(&old);
                    }
                }
                None => break,
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((key.clone(), seq));
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted: now,
                seq,
            },
        );
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
            inner.order.clear();
            inner.generation += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, inner: &mut Inner<K, V>, now: Instant) {
        while let Some((key, seq)) = inner.order.front() {
            let expired = match inner.entries.get(key) {
                Some(entry) if entry.seq == *seq => {
                    if now.duration_since(entry.inserted) < self.ttl {
                        break;
                    }
                    true
                }
                _ => false,
            };
            let Some((key, _)) = inner.order.pop_front() else {
                break;
            };
            if expired {
                inner.entries.remove(&key);
            }
        }
    }
}

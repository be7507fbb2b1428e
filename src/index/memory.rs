//! In-memory index, used for tests and throwaway sessions.

use super::{FingerprintIndex, IndexError, NewTrack, Result, TrackRecord};
use crate::fingerprint::Couple;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    next_id: i64,
    tracks: BTreeMap<i64, TrackRecord>,
    fingerprints: HashMap<u32, Vec<Couple>>,
}

/// Thread-safe in-memory [`FingerprintIndex`] with optional failure injection.
#[derive(Default)]
pub struct MemoryIndex {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
    fail_lookups: AtomicBool,
    /// When non-zero, every n-th `get_couples` call fails.
    fail_every_nth_lookup: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `store_fingerprints` fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every `get_couples` call fail.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make every n-th `get_couples` call fail (0 disables).
    pub fn set_fail_every_nth_lookup(&self, n: usize) {
        self.fail_every_nth_lookup.store(n, Ordering::SeqCst);
    }

    pub fn fingerprint_count(&self) -> usize {
        self.read()
            .map(|inner| inner.fingerprints.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| IndexError::Unavailable("memory index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| IndexError::Unavailable("memory index lock poisoned".into()))
    }
}

impl FingerprintIndex for MemoryIndex {
    fn store_fingerprints(&self, fingerprints: &BTreeMap<u32, Couple>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::Storage("injected write failure".into()));
        }
        let mut inner = self.write()?;
        for (&address, &couple) in fingerprints {
            inner.fingerprints.entry(address).or_default().push(couple);
        }
        Ok(())
    }

    fn get_couples(&self, addresses: &BTreeSet<u32>) -> Result<HashMap<u32, Vec<Couple>>> {
        let call = self.lookup_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let nth = self.fail_every_nth_lookup.load(Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) || (nth > 0 && call % nth == 0) {
            return Err(IndexError::Unavailable("injected lookup failure".into()));
        }

        let inner = self.read()?;
        Ok(addresses
            .iter()
            .filter_map(|a| inner.fingerprints.get(a).map(|c| (*a, c.clone())))
            .collect())
    }

    fn register_track(&self, track: &NewTrack) -> Result<i64> {
        let key = track.key();
        let mut inner = self.write()?;
        if inner.tracks.values().any(|t| t.key == key) {
            return Err(IndexError::Duplicate { key });
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tracks.insert(
            id,
            TrackRecord {
                id,
                title: track.title.clone(),
                artist: track.artist.clone(),
                external_ref: track.external_ref.clone(),
                key,
                content_hash: track.content_hash.clone(),
                duration_secs: track.duration_secs,
            },
        );
        Ok(id)
    }

    fn delete_track(&self, track_id: i64) -> Result<()> {
        let mut inner = self.write()?;
        inner.tracks.remove(&track_id);
        inner.fingerprints.retain(|_, couples| {
            couples.retain(|c| c.track_id != track_id);
            !couples.is_empty()
        });
        Ok(())
    }

    fn get_track(&self, track_id: i64) -> Result<Option<TrackRecord>> {
        Ok(self.read()?.tracks.get(&track_id).cloned())
    }

    fn find_track_by_key(&self, key: &str) -> Result<Option<TrackRecord>> {
        Ok(self.read()?.tracks.values().find(|t| t.key == key).cloned())
    }

    fn find_track_by_hash(&self, content_hash: &str) -> Result<Option<TrackRecord>> {
        Ok(self
            .read()?
            .tracks
            .values()
            .find(|t| t.content_hash.as_deref() == Some(content_hash))
            .cloned())
    }

    fn track_count(&self) -> Result<u64> {
        Ok(self.read()?.tracks.len() as u64)
    }
}

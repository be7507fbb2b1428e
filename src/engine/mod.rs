//! Recognizer facade: index and search raw sample buffers against a
//! [`FingerprintIndex`].

#[cfg(test)]
mod tests;

use crate::cache::TtlCache;
use crate::config::{CacheConfig, MatcherConfig};
use crate::decode::DecodeError;
use crate::fingerprint::{self, FingerprintError};
use crate::index::{FingerprintIndex, IndexError, NewTrack};
use crate::matcher::{self, Match};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("Failed to index \"{title}\" by {artist} (track {track_id}), registration rolled back: {source}")]
    PartialIndexFailure {
        track_id: i64,
        title: String,
        artist: String,
        source: IndexError,
    },
    #[error("Track already indexed: \"{title}\" by {artist}")]
    DuplicateTrack { title: String, artist: String },
}

impl From<FingerprintError> for EngineError {
    fn from(e: FingerprintError) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}

impl From<DecodeError> for EngineError {
    fn from(e: DecodeError) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Duplicate { key } => {
                let (title, artist) = key.split_once("---").unwrap_or((key.as_str(), ""));
                EngineError::DuplicateTrack {
                    title: title.to_string(),
                    artist: artist.to_string(),
                }
            }
            other => EngineError::IndexUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// What to do when a track with the same normalized (title, artist) exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail with [`EngineError::DuplicateTrack`].
    #[default]
    Reject,
    /// Delete the existing track and index the new audio in its place.
    Overwrite,
}

/// Result of a search. Zero matches is a valid outcome, not an error.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub matches: Vec<Match>,
    pub elapsed: Duration,
    /// Served from the query cache.
    pub cached: bool,
}

impl SearchOutcome {
    pub fn is_no_match(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn best(&self) -> Option<&Match> {
        self.matches.first()
    }
}

/// Outcome of registering and indexing one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedTrack {
    pub track_id: i64,
    pub fingerprints: usize,
    /// An existing registration was replaced.
    pub replaced: bool,
}

type QueryKey = [u8; 32];

pub struct Recognizer<I> {
    index: I,
    config: MatcherConfig,
    cache: TtlCache<QueryKey, Vec<Match>>,
}

impl<I: FingerprintIndex> Recognizer<I> {
    pub fn new(index: I) -> Self {
        Self::with_config(index, MatcherConfig::default(), &CacheConfig::default())
    }

    pub fn with_config(index: I, config: MatcherConfig, cache: &CacheConfig) -> Self {
        Self {
            index,
            config,
            cache: TtlCache::new(cache.capacity, cache.ttl()),
        }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Fingerprint `samples` and store them under an already registered id.
    /// Returns the number of addresses written.
    pub fn index_track(
        &self,
        samples: &[f32],
        sample_rate: u32,
        duration_secs: f64,
        track_id: i64,
    ) -> Result<usize> {
        let peaks = fingerprint::peaks_for(samples, sample_rate, duration_secs)?;
        let fingerprints = fingerprint::fingerprint(&peaks, sample_rate, track_id);
        if !fingerprints.is_empty() {
            self.index.store_fingerprints(&fingerprints)?;
            self.cache.clear();
        }
        log::debug!(
            "Track {}: {} peaks, {} fingerprints",
            track_id,
            peaks.len(),
            fingerprints.len()
        );
        Ok(fingerprints.len())
    }

    /// Register `track` and index its audio as one unit.
    ///
    /// If storing fingerprints fails the registration is deleted again, so
    /// the index never keeps a track without its fingerprints.
    pub fn register_and_index(
        &self,
        track: &NewTrack,
        samples: &[f32],
        sample_rate: u32,
        duration_secs: f64,
        policy: DuplicatePolicy,
    ) -> Result<IndexedTrack> {
        // Bad audio must never leave a registration behind
        let peaks = fingerprint::peaks_for(samples, sample_rate, duration_secs)?;

        let mut replaced = false;
        if let Some(existing) = self.index.find_track_by_key(&track.key())? {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(EngineError::DuplicateTrack {
                        title: track.title.clone(),
                        artist: track.artist.clone(),
                    });
                }
                DuplicatePolicy::Overwrite => {
                    log::info!(
                        "Replacing track {} ({} - {})",
                        existing.id,
                        existing.title,
                        existing.artist
                    );
                    self.index.delete_track(existing.id)?;
                    replaced = true;
                }
            }
        }

        let track_id = self.index.register_track(track).map_err(|e| match e {
            IndexError::Duplicate { .. } => EngineError::DuplicateTrack {
                title: track.title.clone(),
                artist: track.artist.clone(),
            },
            other => other.into(),
        })?;

        let fingerprints = fingerprint::fingerprint(&peaks, sample_rate, track_id);
        let stored = if fingerprints.is_empty() {
            Ok(())
        } else {
            self.index.store_fingerprints(&fingerprints)
        };
        self.cache.clear();

        if let Err(source) = stored {
            if let Err(e) = self.index.delete_track(track_id) {
                log::error!("Rollback of track {} failed: {}", track_id, e);
            }
            self.cache.clear();
            return Err(EngineError::PartialIndexFailure {
                track_id,
                title: track.title.clone(),
                artist: track.artist.clone(),
                source,
            });
        }

        if fingerprints.is_empty() {
            log::warn!(
                "\"{}\" by {} produced no fingerprints",
                track.title,
                track.artist
            );
        }
        Ok(IndexedTrack {
            track_id,
            fingerprints: fingerprints.len(),
            replaced,
        })
    }

    /// Identify `samples` against the index.
    pub fn search(
        &self,
        samples: &[f32],
        sample_rate: u32,
        duration_secs: f64,
    ) -> Result<SearchOutcome> {
        let start = Instant::now();
        let key = query_key(samples, sample_rate, duration_secs);
        if let Some(matches) = self.cache.get(&key) {
            return Ok(SearchOutcome {
                matches,
                elapsed: start.elapsed(),
                cached: true,
            });
        }

        // A write that lands while we match makes this result stale
        let generation = self.cache.generation();
        let peaks = fingerprint::peaks_for(samples, sample_rate, duration_secs)?;
        let query = fingerprint::query_fingerprints(&peaks, sample_rate);
        let (matches, _) = matcher::match_fingerprints(&query, &self.index, &self.config)?;
        if !self.cache.insert_if_current(generation, key, matches.clone()) {
            log::debug!("Index changed during search, result not cached");
        }

        Ok(SearchOutcome {
            matches,
            elapsed: start.elapsed(),
            cached: false,
        })
    }

    /// Remove a track and its fingerprints.
    pub fn delete_track(&self, track_id: i64) -> Result<()> {
        self.index.delete_track(track_id)?;
        self.cache.clear();
        Ok(())
    }

    /// Drop all cached search results, e.g. after writing to the index
    /// behind the recognizer's back.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

/// Samples hashed per `update` call.
const KEY_CHUNK: usize = 1024;

fn query_key(samples: &[f32], sample_rate: u32, duration_secs: f64) -> QueryKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&sample_rate.to_le_bytes());
    hasher.update(&duration_secs.to_le_bytes());
    let mut buf = [0u8; KEY_CHUNK * 4];
    for chunk in samples.chunks(KEY_CHUNK) {
        for (dst, s) in buf.chunks_exact_mut(4).zip(chunk) {
            dst.copy_from_slice(&s.to_le_bytes());
        }
        hasher.update(&buf[..chunk.len() * 4]);
    }
    *hasher.finalize().as_bytes()
}

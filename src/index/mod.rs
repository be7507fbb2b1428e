pub mod memory;

use crate::fingerprint::Couple;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),
    #[error("Track already registered: {key}")]
    Duplicate { key: String },
    #[error("Index storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Registration data for a track.
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    pub external_ref: String,
    /// BLAKE3 hex digest of the source file, when known.
    pub content_hash: Option<String>,
    pub duration_secs: Option<f64>,
}

impl NewTrack {
    pub fn new(title: &str, artist: &str, external_ref: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            external_ref: external_ref.to_string(),
            content_hash: None,
            duration_secs: None,
        }
    }

    pub fn key(&self) -> String {
        track_key(&self.title, &self.artist)
    }
}

/// A registered track as stored in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub external_ref: String,
    pub key: String,
    pub content_hash: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Storage boundary for fingerprints and track registrations.
///
/// Implementations must be shareable across worker threads. Track ids are
/// assigned by `register_track` and never reused after `delete_track`.
pub trait FingerprintIndex: Send + Sync {
    /// Bulk append; existing rows for the same addresses are kept.
    fn store_fingerprints(&self, fingerprints: &BTreeMap<u32, Couple>) -> Result<()>;

    /// Batched reverse lookup. Addresses without hits are absent from the result.
    fn get_couples(&self, addresses: &BTreeSet<u32>) -> Result<HashMap<u32, Vec<Couple>>>;

    /// Fails with [`IndexError::Duplicate`] when the normalized key is taken.
    fn register_track(&self, track: &NewTrack) -> Result<i64>;

    /// Remove a track and all of its fingerprints. Deleting an unknown id is a no-op.
    fn delete_track(&self, track_id: i64) -> Result<()>;

    fn get_track(&self, track_id: i64) -> Result<Option<TrackRecord>>;

    fn find_track_by_key(&self, key: &str) -> Result<Option<TrackRecord>>;

    fn find_track_by_hash(&self, content_hash: &str) -> Result<Option<TrackRecord>>;

    fn track_count(&self) -> Result<u64>;

    fn track_exists_by_key(&self, key: &str) -> Result<bool> {
        Ok(self.find_track_by_key(key)?.is_some())
    }
}

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let stripped = NON_WORD.replace_all(&lower, "");
    SPACES.replace_all(stripped.trim(), " ").into_owned()
}

/// Normalized composite key used for the per-library uniqueness constraint.
pub fn track_key(title: &str, artist: &str) -> String {
    format!("{}---{}", normalize(title), normalize(artist))
}

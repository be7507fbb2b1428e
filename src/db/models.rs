use crate::index::TrackRecord;

/// Library statistics.
#[derive(Debug, Default)]
pub struct LibraryStats {
    pub total_tracks: i64,
    pub total_fingerprints: i64,
    pub distinct_addresses: i64,
    pub tracks_with_hash: i64,
}

impl LibraryStats {
    /// Average number of stored fingerprints per track.
    pub fn fingerprints_per_track(&self) -> f64 {
        if self.total_tracks == 0 {
            0.0
        } else {
            self.total_fingerprints as f64 / self.total_tracks as f64
        }
    }
}

/// Track listing row with its fingerprint count.
#[derive(Debug, Clone)]
pub struct TrackSummary {
    pub track: TrackRecord,
    pub fingerprints: i64,
    pub created_at: String,
}

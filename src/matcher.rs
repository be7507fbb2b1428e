//! Time-aligned candidate scoring.
//!
//! Every query address votes for each indexed couple sharing it, in a
//! per-track histogram keyed by the (bucketed) offset between the indexed
//! anchor time and the query anchor time. An address votes at most once per
//! offset, however often it repeats in the query. A real match piles its
//! votes into one bucket; chance collisions scatter.

use crate::config::MatcherConfig;
use crate::engine::EngineError;
use crate::fingerprint::QueryFingerprint;
use crate::index::FingerprintIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Fewest aligned addresses a confident match needs.
pub const MIN_ALIGNED_VOTES: f64 = 5.0;

/// Share of the query's distinct addresses that must agree on one offset.
/// Chance agreement grows with query and track length, so a fixed vote count
/// alone can't separate it from a real match.
pub const MIN_CONFIDENCE: f64 = 0.15;

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub title: String,
    pub artist: String,
    pub score: f64,
    pub external_ref: String,
    /// Position (ms) in the indexed track where the query starts.
    pub timestamp: u32,
    pub track_id: i64,
    /// `score` over the number of distinct addresses in the query.
    #[serde(skip)]
    pub confidence: f64,
}

impl Match {
    pub fn is_confident(&self) -> bool {
        self.score >= MIN_ALIGNED_VOTES && self.confidence >= MIN_CONFIDENCE
    }
}

/// Winning histogram bucket for one candidate track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Alignment {
    track_id: i64,
    bucket: i64,
    count: u32,
}

/// Score `query` against `index` and return ranked matches plus elapsed time.
///
/// Lookup batches that fail are skipped; only when every batch fails is the
/// whole match reported as [`EngineError::IndexUnavailable`].
pub fn match_fingerprints<I: FingerprintIndex + ?Sized>(
    query: &[QueryFingerprint],
    index: &I,
    config: &MatcherConfig,
) -> Result<(Vec<Match>, Duration), EngineError> {
    let start = Instant::now();

    // address → every query anchor time it occurred at
    let mut occurrences: HashMap<u32, Vec<u32>> = HashMap::new();
    for fp in query {
        occurrences.entry(fp.address).or_default().push(fp.anchor_time_ms);
    }
    if occurrences.is_empty() {
        return Ok((Vec::new(), start.elapsed()));
    }

    let addresses: Vec<u32> = occurrences
        .keys()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let bucket_ms = i64::from(config.bucket_ms.max(1));

    let mut histograms: HashMap<i64, HashMap<i64, u32>> = HashMap::new();
    let mut batches = 0usize;
    let mut failed = 0usize;
    let mut last_error = None;

    for chunk in addresses.chunks(config.lookup_batch_size.max(1)) {
        batches += 1;
        let batch: BTreeSet<u32> = chunk.iter().copied().collect();
        let couples = match index.get_couples(&batch) {
            Ok(couples) => couples,
            Err(e) => {
                log::warn!("Lookup of {} addresses failed, skipping: {}", batch.len(), e);
                failed += 1;
                last_error = Some(e);
                continue;
            }
        };

        for (address, hits) in &couples {
            let Some(query_times) = occurrences.get(address) else {
                continue;
            };
            let mut votes: BTreeSet<(i64, i64)> = BTreeSet::new();
            for hit in hits {
                for &query_time in query_times {
                    let delta = i64::from(hit.anchor_time_ms) - i64::from(query_time);
                    votes.insert((hit.track_id, bucket_of(delta, bucket_ms)));
                }
            }
            for (track_id, bucket) in votes {
                *histograms.entry(track_id).or_default().entry(bucket).or_insert(0) += 1;
            }
        }
    }

    if failed == batches {
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        return Err(EngineError::IndexUnavailable(reason));
    }

    let mut ranked: Vec<Alignment> = histograms
        .into_iter()
        .filter_map(|(track_id, histogram)| best_alignment(track_id, &histogram))
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.track_id.cmp(&b.track_id)));

    let mut matches = Vec::with_capacity(ranked.len().min(config.max_results));
    for alignment in ranked {
        if matches.len() >= config.max_results {
            break;
        }
        let track = match index.get_track(alignment.track_id) {
            Ok(Some(track)) => track,
            Ok(None) => {
                log::debug!("Track {} vanished during search", alignment.track_id);
                continue;
            }
            Err(e) => {
                log::warn!("Could not resolve track {}: {}", alignment.track_id, e);
                continue;
            }
        };
        matches.push(Match {
            title: track.title,
            artist: track.artist,
            score: f64::from(alignment.count),
            external_ref: track.external_ref,
            timestamp: (alignment.bucket * bucket_ms).clamp(0, i64::from(u32::MAX)) as u32,
            track_id: alignment.track_id,
            confidence: f64::from(alignment.count) / addresses.len() as f64,
        });
    }

    log::debug!(
        "Scored {} query fingerprints ({} distinct) in {:?}: {} matches",
        query.len(),
        addresses.len(),
        start.elapsed(),
        matches.len()
    );
    Ok((matches, start.elapsed()))
}

fn bucket_of(delta_ms: i64, bucket_ms: i64) -> i64 {
    (delta_ms as f64 / bucket_ms as f64).round() as i64
}

/// Highest bucket; ties go to the smallest offset.
fn best_alignment(track_id: i64, histogram: &HashMap<i64, u32>) -> Option<Alignment> {
    histogram
        .iter()
        .map(|(&bucket, &count)| Alignment {
            track_id,
            bucket,
            count,
        })
        .max_by(|a, b| a.count.cmp(&b.count).then(b.bucket.cmp(&a.bucket)))
}

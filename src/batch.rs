use crate::decode;
use crate::engine::{DuplicatePolicy, EngineError, Recognizer};
use crate::index::{FingerprintIndex, NewTrack};
use crate::scanner::IndexJob;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A track that could not be indexed, and why.
#[derive(Debug, Clone)]
pub struct Failure {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub indexed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub fingerprints: u64,
    pub failures: Vec<Failure>,
}

enum Outcome {
    Indexed(usize),
    Skipped(String),
    Failed(String),
}

/// Index files in parallel, one full decode → register → fingerprint → store
/// pipeline per track.
///
/// Work is handed to a fixed pool of `workers` threads in chunks of
/// `workers * 2`; the next chunk is only submitted once the current one is
/// done, so at most one chunk of decoded audio is in memory at a time.
pub fn index_files<I: FingerprintIndex>(
    recognizer: &Recognizer<I>,
    jobs: &[IndexJob],
    workers: usize,
    policy: DuplicatePolicy,
) -> Result<BatchResult, BatchError> {
    let mut result = BatchResult::default();
    if jobs.is_empty() {
        log::info!("No files to index");
        return Ok(result);
    }

    let workers = workers.max(1);
    log::info!("Indexing {} files with {} workers", jobs.len(), workers);

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;

    for chunk in jobs.chunks(workers * 2) {
        let outcomes: Vec<Outcome> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|job| {
                    let outcome = index_one(recognizer, job, policy);
                    pb.inc(1);
                    outcome
                })
                .collect()
        });

        for (job, outcome) in chunk.iter().zip(outcomes) {
            match outcome {
                Outcome::Indexed(n) => {
                    result.indexed += 1;
                    result.fingerprints += n as u64;
                }
                Outcome::Skipped(why) => {
                    log::info!("Skipped {}: {}", job.path.display(), why);
                    result.skipped += 1;
                }
                Outcome::Failed(reason) => {
                    log::warn!("Failed to index {}: {}", job.path.display(), reason);
                    result.failed += 1;
                    result.failures.push(Failure {
                        path: job.path.clone(),
                        title: job.title.clone(),
                        artist: job.artist.clone(),
                        reason,
                    });
                }
            }
        }

        pb.set_message(format!(
            "{} indexed, {} skipped, {} failed",
            result.indexed, result.skipped, result.failed
        ));
    }

    pb.finish_with_message(format!(
        "Done: {} indexed, {} skipped, {} failed",
        result.indexed, result.skipped, result.failed
    ));
    Ok(result)
}

fn index_one<I: FingerprintIndex>(
    recognizer: &Recognizer<I>,
    job: &IndexJob,
    policy: DuplicatePolicy,
) -> Outcome {
    let hash = match decode::content_hash(&job.path) {
        Ok(h) => h,
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    if policy == DuplicatePolicy::Reject {
        match recognizer.index().find_track_by_hash(&hash) {
            Ok(Some(existing)) => {
                return Outcome::Skipped(format!(
                    "same audio already indexed as \"{}\" by {}",
                    existing.title, existing.artist
                ));
            }
            Ok(None) => {}
            Err(e) => return Outcome::Failed(e.to_string()),
        }
    }

    let audio = match decode::load_audio(&job.path) {
        Ok(a) => a,
        Err(e) => return Outcome::Failed(EngineError::from(e).to_string()),
    };

    let track = NewTrack {
        title: job.title.clone(),
        artist: job.artist.clone(),
        external_ref: job.external_ref.clone(),
        content_hash: Some(hash),
        duration_secs: Some(audio.duration_secs),
    };

    match recognizer.register_and_index(
        &track,
        &audio.samples,
        audio.sample_rate,
        audio.duration_secs,
        policy,
    ) {
        Ok(indexed) => Outcome::Indexed(indexed.fingerprints),
        Err(e @ EngineError::DuplicateTrack { .. }) => Outcome::Skipped(e.to_string()),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

//! Pure fingerprinting stages: samples → spectrogram → peaks → addresses.
//!
//! Every function in this module is stateless and safe to call from any
//! number of threads at once. The constants below define the analysis grid
//! and the address layout; changing any of them invalidates existing indexes.

pub mod hashing;
pub mod peaks;
pub mod spectrogram;

pub use hashing::{QueryFingerprint, fingerprint, pack_address, query_fingerprints, unpack_address};
pub use peaks::{Peak, extract};
pub use spectrogram::{Spectrogram, generate};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample rate every signal is converted to before analysis.
pub const CANONICAL_SAMPLE_RATE: u32 = 11_025;

/// Transform size in samples. Frames hold `WINDOW_SIZE / 2` bins.
pub const WINDOW_SIZE: usize = 1024;

/// Distance between successive window starts.
pub const HOP_SIZE: usize = 512;

/// Number of magnitude bins per frame (non-negative frequencies only).
pub const FRAME_BINS: usize = WINDOW_SIZE / 2;

#[derive(Error, Debug, PartialEq)]
pub enum FingerprintError {
    #[error("Sample buffer is empty")]
    EmptyInput,
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
}

/// Payload stored per address in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Couple {
    pub track_id: i64,
    pub anchor_time_ms: u32,
}

/// Convert a frame index to milliseconds from the start of the signal.
pub fn frame_to_ms(frame_index: usize, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    let ms = (frame_index as u64 * HOP_SIZE as u64 * 1000) / sample_rate as u64;
    ms.min(u32::MAX as u64) as u32
}

/// Run the whole pure pipeline for a buffer and return its peaks.
pub fn peaks_for(
    samples: &[f32],
    sample_rate: u32,
    duration_secs: f64,
) -> Result<Vec<Peak>, FingerprintError> {
    let spectrogram = generate(samples, sample_rate)?;
    Ok(extract(&spectrogram, duration_secs))
}

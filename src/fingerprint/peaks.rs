use super::spectrogram::Spectrogram;
use serde::{Deserialize, Serialize};

/// A locally dominant frequency component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub frame_index: usize,
    pub frequency_bin: usize,
    pub magnitude: f32,
}

/// Frequency bands as half-open bin ranges. Narrow at the bottom, wide at the
/// top, doubling in width like octaves.
pub const BANDS: [(usize, usize); 6] = [
    (0, 10),
    (10, 20),
    (20, 40),
    (40, 80),
    (80, 160),
    (160, 512),
];

/// Fraction of the running average a candidate must exceed.
const RUNNING_FLOOR_RATIO: f32 = 0.25;

/// Smoothing factor of the running average of frame means.
const RUNNING_AVERAGE_ALPHA: f32 = 0.1;

/// Absolute floor; anything at or below is treated as silence.
const MIN_PEAK_MAGNITUDE: f32 = 1e-3;

/// Neighborhood used to suppress clustered peaks.
const MIN_BIN_SEPARATION: usize = 2;
const MIN_FRAME_SEPARATION: usize = 2;

/// A peak in a preceding frame this many times stronger masks a candidate
/// at (almost) the same bin.
const DECAY_RATIO: f32 = 2.0;

/// Pick salient points from a spectrogram, ordered by frame then bin.
///
/// Each frame contributes at most one peak per band. A band maximum survives
/// only if it clears the adaptive floor: the frame's mean band maximum, a
/// fraction of the running mean over previous frames, and an absolute floor.
/// Frames starting at or after `duration_secs` are ignored when it is positive.
pub fn extract(spectrogram: &Spectrogram, duration_secs: f64) -> Vec<Peak> {
    let limit = if duration_secs.is_finite() && duration_secs > 0.0 {
        (0..spectrogram.frame_count())
            .take_while(|&t| spectrogram.frame_start_secs(t) < duration_secs)
            .count()
    } else {
        spectrogram.frame_count()
    };

    let mut peaks: Vec<Peak> = Vec::new();
    let mut running: Option<f32> = None;

    for (t, frame) in spectrogram.frames.iter().enumerate().take(limit) {
        let mut candidates = band_maxima(frame);
        if candidates.is_empty() {
            continue;
        }

        let frame_mean =
            candidates.iter().map(|&(_, m)| m).sum::<f32>() / candidates.len() as f32;
        let running_mean = running.unwrap_or(frame_mean);
        let floor = frame_mean
            .max(running_mean * RUNNING_FLOOR_RATIO)
            .max(MIN_PEAK_MAGNITUDE);
        running = Some(running_mean + RUNNING_AVERAGE_ALPHA * (frame_mean - running_mean));

        candidates.retain(|&(_, m)| m > floor);
        // Strongest first so the separation check always sees the winner
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let frame_start = peaks.len();
        for (bin, magnitude) in candidates {
            if is_masked(&peaks, t, bin, magnitude) {
                continue;
            }
            peaks.push(Peak {
                frame_index: t,
                frequency_bin: bin,
                magnitude,
            });
        }
        peaks[frame_start..].sort_by_key(|p| p.frequency_bin);
    }

    log::trace!("Extracted {} peaks from {} frames", peaks.len(), limit);
    peaks
}

/// Loudest bin of each band. Ties keep the lowest bin.
fn band_maxima(frame: &[f32]) -> Vec<(usize, f32)> {
    BANDS
        .iter()
        .filter_map(|&(lo, hi)| {
            let hi = hi.min(frame.len());
            if lo >= hi {
                return None;
            }
            frame[lo..hi]
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, f32)>, (i, &m)| match best {
                    Some((_, bm)) if bm >= m => best,
                    _ => Some((lo + i, m)),
                })
        })
        .collect()
}

/// Whether an already retained peak near (frame, bin) masks this candidate.
fn is_masked(retained: &[Peak], frame: usize, bin: usize, magnitude: f32) -> bool {
    retained
        .iter()
        .rev()
        .take_while(|p| p.frame_index + MIN_FRAME_SEPARATION >= frame)
        .filter(|p| p.frequency_bin.abs_diff(bin) <= MIN_BIN_SEPARATION)
        .any(|p| {
            if p.frame_index == frame {
                p.magnitude >= magnitude
            } else {
                p.magnitude >= magnitude * DECAY_RATIO
            }
        })
}

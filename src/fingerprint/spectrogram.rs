use super::{FRAME_BINS, FingerprintError, HOP_SIZE, WINDOW_SIZE};
use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;

/// Time–frequency magnitude matrix. Every frame holds exactly `FRAME_BINS`
/// magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Center frequency of a bin in Hz.
    pub fn bin_hz(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / WINDOW_SIZE as f32
    }

    /// Start time of a frame in seconds.
    pub fn frame_start_secs(&self, frame_index: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (frame_index * HOP_SIZE) as f64 / self.sample_rate as f64
    }
}

/// Number of frames produced for a buffer of `len` samples:
/// `ceil((len - window) / hop) + 1`, and one zero-padded frame for short input.
pub fn frame_count(len: usize) -> usize {
    if len == 0 {
        0
    } else if len <= WINDOW_SIZE {
        1
    } else {
        (len - WINDOW_SIZE).div_ceil(HOP_SIZE) + 1
    }
}

/// Slide a Hann-tapered window across the buffer and keep the magnitude of the
/// non-negative half of each transform.
pub fn generate(samples: &[f32], sample_rate: u32) -> Result<Spectrogram, FingerprintError> {
    if samples.is_empty() {
        return Err(FingerprintError::EmptyInput);
    }
    if sample_rate == 0 {
        return Err(FingerprintError::InvalidSampleRate(sample_rate));
    }

    let n_frames = frame_count(samples.len());
    let window = hann_window(WINDOW_SIZE);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(WINDOW_SIZE);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); WINDOW_SIZE];

    let mut frames = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let start = i * HOP_SIZE;
        let end = (start + WINDOW_SIZE).min(samples.len());

        buffer.fill(Complex::new(0.0, 0.0));
        for (offset, &sample) in samples[start..end].iter().enumerate() {
            buffer[offset] = Complex::new(sample * window[offset], 0.0);
        }

        fft.process_with_scratch(&mut buffer, &mut scratch);

        let magnitudes: Vec<f32> = buffer[..FRAME_BINS].iter().map(|c| c.norm()).collect();
        frames.push(magnitudes);
    }

    log::trace!(
        "Spectrogram: {} samples -> {} frames x {} bins",
        samples.len(),
        frames.len(),
        FRAME_BINS
    );

    Ok(Spectrogram {
        frames,
        sample_rate,
    })
}

fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1.0)).cos()))
        .collect()
}

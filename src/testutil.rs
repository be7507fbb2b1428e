//! Deterministic synthetic signals for tests.

use std::f32::consts::PI;

/// Minimal linear congruential generator; tests must not depend on OS entropy.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 23) as f32
    }

    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }
}

pub fn sine(freq: f32, amplitude: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
    let n = (secs * sample_rate as f32) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Sum signals sample by sample; the result is as long as the longest input.
pub fn mix(signals: &[Vec<f32>]) -> Vec<f32> {
    let len = signals.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = vec![0.0; len];
    for signal in signals {
        for (o, s) in out.iter_mut().zip(signal) {
            *o += s;
        }
    }
    out
}

/// Frequency ranges (Hz) for the two voices of a melody.
#[derive(Clone, Copy)]
pub struct Voices {
    pub low: (f32, f32),
    pub high: (f32, f32),
}

/// Voices whose peaks fall in the 430–860 Hz and 1.7–5.5 kHz bands.
pub const VOICES_A: Voices = Voices {
    low: (470.0, 840.0),
    high: (1900.0, 5000.0),
};

/// Voices that never share a bin with [`VOICES_A`].
pub const VOICES_B: Voices = Voices {
    low: (230.0, 420.0),
    high: (900.0, 1650.0),
};

/// A two-voice sequence of 250 ms notes with pitches drawn from `seed`.
/// Each note has short linear fades so note changes don't splatter.
pub fn melody(seed: u64, voices: Voices, secs: f32, sample_rate: u32) -> Vec<f32> {
    let mut rng = Lcg::new(seed);
    let total = (secs * sample_rate as f32) as usize;
    let note_len = sample_rate as usize / 4;
    let fade = sample_rate as usize / 200;

    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        let f_low = rng.range(voices.low.0, voices.low.1);
        let f_high = rng.range(voices.high.0, voices.high.1);
        for i in 0..note_len {
            if out.len() == total {
                break;
            }
            let env = if i < fade {
                i as f32 / fade as f32
            } else if i >= note_len - fade {
                (note_len - i) as f32 / fade as f32
            } else {
                1.0
            };
            let t = i as f32 / sample_rate as f32;
            let s = 0.35 * (2.0 * PI * f_low * t).sin() + 0.35 * (2.0 * PI * f_high * t).sin();
            out.push(env * s);
        }
    }
    out
}

/// Add uniform noise in [-level, level].
pub fn add_noise(samples: &[f32], level: f32, seed: u64) -> Vec<f32> {
    let mut rng = Lcg::new(seed);
    samples
        .iter()
        .map(|&s| s + rng.range(-level, level))
        .collect()
}

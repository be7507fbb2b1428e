use crate::fingerprint::CANONICAL_SAMPLE_RATE;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("FLAC decode error: {0}")]
    Flac(#[from] claxon::Error),
    #[error("Resampling failed: {0}")]
    Resample(String),
    #[error("File contains no audio")]
    Empty,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono samples at the analysis rate, ready for fingerprinting.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Decode a WAV or FLAC file, downmix to mono and resample to the
/// analysis rate.
pub fn load_audio(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let (interleaved, sample_rate, channels) = match ext.as_str() {
        "wav" | "wave" => read_wav(path)?,
        "flac" => read_flac(path)?,
        other => return Err(DecodeError::UnsupportedFormat(other.to_string())),
    };
    if interleaved.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(DecodeError::Empty);
    }

    let mono = to_mono(&interleaved, channels);
    let duration_secs = mono.len() as f64 / sample_rate as f64;
    let samples = resample(&mono, sample_rate, CANONICAL_SAMPLE_RATE)?;
    log::debug!(
        "Decoded {}: {} ch @ {} Hz, {:.1}s",
        path.display(),
        channels,
        sample_rate,
        duration_secs
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: CANONICAL_SAMPLE_RATE,
        duration_secs,
    })
}

/// BLAKE3 hex digest of the file bytes.
pub fn content_hash(path: &Path) -> Result<String, DecodeError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32, usize), DecodeError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok((samples, spec.sample_rate, spec.channels as usize))
}

fn read_flac(path: &Path) -> Result<(Vec<f32>, u32, usize), DecodeError> {
    let mut reader = claxon::FlacReader::open(path)?;
    let info = reader.streaminfo();
    let scale = int_scale(info.bits_per_sample as u16);
    let samples = reader
        .samples()
        .map(|s| s.map(|v| v as f32 * scale))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((samples, info.sample_rate, info.channels as usize))
}

/// Factor mapping a signed integer sample of `bits` width into [-1, 1).
fn int_scale(bits: u16) -> f32 {
    1.0 / (1u64 << bits.saturating_sub(1).min(31)) as f32
}

fn to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Band-limited sinc resampling. The output has exactly
/// `round(len * to / from)` samples, aligned with the input.
fn resample(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>, DecodeError> {
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to as f64 / from as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let expected = (input.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    for chunk in input.chunks(RESAMPLE_CHUNK) {
        let block = if chunk.len() == RESAMPLE_CHUNK {
            resampler.process(&[chunk], None)
        } else {
            resampler.process_partial(Some(&[chunk]), None)
        }
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
        out.extend_from_slice(&block[0]);
    }
    // Flush the filter tail
    while out.len() < expected + delay {
        let block = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        if block[0].is_empty() {
            break;
        }
        out.extend_from_slice(&block[0]);
    }

    let mut out = out.split_off(delay.min(out.len()));
    out.resize(expected, 0.0);
    Ok(out)
}

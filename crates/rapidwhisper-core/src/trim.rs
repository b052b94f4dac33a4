use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TrimError {
    #[error("Failed to read WAV: {0}")]
    Read(String),
    #[error("Failed to write WAV: {0}")]
    Write(String),
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Analysis window, in frames. RMS is computed per 1024-frame chunk.
const CHUNK_FRAMES: usize = 1024;

/// Interleaved samples in their on-disk representation, kept so the file
/// can be rewritten without changing its sample format.
enum RawSamples {
    Int16(Vec<i16>),
    Float32(Vec<f32>),
}

impl RawSamples {
    fn len(&self) -> usize {
        match self {
            RawSamples::Int16(v) => v.len(),
            RawSamples::Float32(v) => v.len(),
        }
    }
}

/// Remove silent stretches from a WAV file, keeping every audible segment
/// plus `padding_ms` of context on each side.
///
/// The file is rewritten in place in its original sample format. Returns the
/// path and the number of seconds removed. Files that are entirely silent,
/// or too short to hold a single analysis chunk, are left untouched with
/// `removed = 0`.
pub fn trim_silence(
    path: &Path,
    threshold: f32,
    padding_ms: u32,
) -> Result<(PathBuf, f64), TrimError> {
    let reader = hound::WavReader::open(path).map_err(|e| TrimError::Read(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let sample_rate = spec.sample_rate;

    let raw = read_raw(reader, &spec)?;
    let total_frames = raw.len() / channels;
    let mono = to_mono_f32(&raw, channels);

    let n_chunks = total_frames / CHUNK_FRAMES;
    if n_chunks == 0 {
        warn!("file too short to trim ({total_frames} frames), leaving as is");
        return Ok((path.to_path_buf(), 0.0));
    }

    // Chunks with RMS strictly above the threshold carry speech.
    let is_sound: Vec<bool> = (0..n_chunks)
        .map(|i| {
            let chunk = &mono[i * CHUNK_FRAMES..(i + 1) * CHUNK_FRAMES];
            chunk_rms(chunk) > threshold
        })
        .collect();

    if !is_sound.iter().any(|&s| s) {
        warn!("file is entirely silence, leaving as is");
        return Ok((path.to_path_buf(), 0.0));
    }

    let padding_chunks = padding_in_chunks(padding_ms, sample_rate);
    let segments = speech_segments(&is_sound, padding_chunks);
    debug!("{} speech segment(s), padding {padding_chunks} chunk(s)", segments.len());

    // Frame ranges to keep. When the last segment reaches the final chunk,
    // the trailing partial chunk is kept with it.
    let mut kept_frames = 0usize;
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(segments.len());
    for &(start_chunk, end_chunk) in &segments {
        let start = start_chunk * CHUNK_FRAMES;
        let end = if end_chunk == n_chunks {
            total_frames
        } else {
            end_chunk * CHUNK_FRAMES
        };
        kept_frames += end - start;
        ranges.push((start, end));
    }

    let removed_frames = total_frames - kept_frames;
    if removed_frames == 0 {
        return Ok((path.to_path_buf(), 0.0));
    }

    write_ranges(path, &spec, &raw, channels, &ranges)?;

    let removed = removed_frames as f64 / sample_rate as f64;
    info!(
        "trimmed {removed:.2}s of silence ({:.2}s -> {:.2}s)",
        total_frames as f64 / sample_rate as f64,
        kept_frames as f64 / sample_rate as f64
    );
    Ok((path.to_path_buf(), removed))
}

fn read_raw<R: std::io::Read>(
    mut reader: hound::WavReader<R>,
    spec: &hound::WavSpec,
) -> Result<RawSamples, TrimError> {
    match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
            Ok(RawSamples::Int16(
                samples.map_err(|e| TrimError::Read(e.to_string()))?,
            ))
        }
        (hound::SampleFormat::Float, 32) => {
            let samples: Result<Vec<f32>, _> = reader.samples::<f32>().collect();
            Ok(RawSamples::Float32(
                samples.map_err(|e| TrimError::Read(e.to_string()))?,
            ))
        }
        (format, bits) => Err(TrimError::UnsupportedFormat(format!("{format:?}/{bits}-bit"))),
    }
}

/// Collapse interleaved channels to mono f32 in [-1, 1] for analysis.
fn to_mono_f32(raw: &RawSamples, channels: usize) -> Vec<f32> {
    match raw {
        RawSamples::Int16(samples) => samples
            .chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32 / i16::MAX as f32).sum();
                sum / channels as f32
            })
            .collect(),
        RawSamples::Float32(samples) => samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect(),
    }
}

fn chunk_rms(chunk: &[f32]) -> f32 {
    let mean_sq: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
    mean_sq.sqrt()
}

fn padding_in_chunks(padding_ms: u32, sample_rate: u32) -> usize {
    let padding_frames = (padding_ms as u64 * sample_rate as u64).div_ceil(1000) as usize;
    padding_frames.div_ceil(CHUNK_FRAMES)
}

/// Expand each contiguous run of speech chunks by the padding on both sides
/// (clamped to the file) and merge runs that overlap after expansion.
/// Returned ranges are half-open chunk indices.
fn speech_segments(is_sound: &[bool], padding_chunks: usize) -> Vec<(usize, usize)> {
    let n = is_sound.len();
    let mut segments: Vec<(usize, usize)> = Vec::new();
    let mut run_start: Option<usize> = None;

    for i in 0..=n {
        let sound = i < n && is_sound[i];
        match (run_start, sound) {
            (None, true) => run_start = Some(i),
            (Some(start), false) => {
                let padded_start = start.saturating_sub(padding_chunks);
                let padded_end = (i + padding_chunks).min(n);
                match segments.last_mut() {
                    Some(last) if padded_start <= last.1 => last.1 = last.1.max(padded_end),
                    _ => segments.push((padded_start, padded_end)),
                }
                run_start = None;
            }
            _ => {}
        }
    }

    segments
}

fn write_ranges(
    path: &Path,
    spec: &hound::WavSpec,
    raw: &RawSamples,
    channels: usize,
    frame_ranges: &[(usize, usize)],
) -> Result<(), TrimError> {
    let mut writer =
        hound::WavWriter::create(path, *spec).map_err(|e| TrimError::Write(e.to_string()))?;

    for &(start, end) in frame_ranges {
        let (lo, hi) = (start * channels, end * channels);
        match raw {
            RawSamples::Int16(samples) => {
                for &s in &samples[lo..hi] {
                    writer.write_sample(s).map_err(|e| TrimError::Write(e.to_string()))?;
                }
            }
            RawSamples::Float32(samples) => {
                for &s in &samples[lo..hi] {
                    writer.write_sample(s).map_err(|e| TrimError::Write(e.to_string()))?;
                }
            }
        }
    }

    writer.finalize().map_err(|e| TrimError::Write(e.to_string()))
}

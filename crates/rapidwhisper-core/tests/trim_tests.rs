// Tests for rapidwhisper_core::trim — silence removal with padding, merge
// behavior, and the pass-through cases (clean, silent, too short).

use std::path::Path;

use rapidwhisper_core::trim::trim_silence;
use tempfile::TempDir;

const RATE: u32 = 16000;
const CHUNK: usize = 1024;

/// Write a mono 16-bit WAV made of constant-amplitude blocks, each
/// `chunks` analysis chunks long.
fn write_blocks(path: &Path, blocks: &[(i16, usize)]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &(amplitude, chunks) in blocks {
        for _ in 0..chunks * CHUNK {
            writer.write_sample(amplitude).unwrap();
        }
    }
    writer.finalize().unwrap();
}

fn frames_of(path: &Path) -> u32 {
    hound::WavReader::open(path).unwrap().duration()
}

// Amplitude 12000 is RMS ~0.37, far above the 0.02 threshold.
const LOUD: i16 = 12000;

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

/// Silence on both sides of speech is removed, keeping 100ms (2 chunks) of
/// padding around the audible run.
#[test]
fn trims_surrounding_silence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    write_blocks(&path, &[(0, 16), (LOUD, 16), (0, 16)]);

    let (out, removed) = trim_silence(&path, 0.02, 100).unwrap();

    assert_eq!(out, path);
    // 16 + 16 + 16 chunks down to 20 (16 speech + 2 padding each side).
    assert_eq!(frames_of(&path), (20 * CHUNK) as u32);
    let expected = (28 * CHUNK) as f64 / RATE as f64;
    assert!((removed - expected).abs() < 1e-9, "removed {removed}");
}

/// Leading silence is removed; trailing speech keeps the file tail.
#[test]
fn trims_leading_silence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    write_blocks(&path, &[(0, 10), (LOUD, 10)]);

    let (_, removed) = trim_silence(&path, 0.02, 100).unwrap();

    assert_eq!(frames_of(&path), (12 * CHUNK) as u32);
    assert!((removed - (8 * CHUNK) as f64 / RATE as f64).abs() < 1e-9);
}

/// Two speech runs whose padded ranges touch are merged; the gap between
/// them survives.
#[test]
fn close_speech_runs_merge() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    // Gap of 3 chunks between runs; padding of 2 chunks per side bridges it.
    write_blocks(&path, &[(LOUD, 4), (0, 3), (LOUD, 4), (0, 16)]);

    let (_, removed) = trim_silence(&path, 0.02, 100).unwrap();

    // Kept: chunks 0..13 (both runs plus bridged gap plus trailing pad).
    assert_eq!(frames_of(&path), (13 * CHUNK) as u32);
    assert!(removed > 0.0);
}

// ---------------------------------------------------------------------------
// Pass-through cases
// ---------------------------------------------------------------------------

/// A file where every chunk is above the threshold is returned unchanged
/// with removed = 0, including any trailing partial chunk.
#[test]
fn clean_audio_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    write_blocks(&path, &[(LOUD, 10)]);
    // Partial trailing chunk.
    {
        let mut writer = hound::WavWriter::append(&path).unwrap();
        for _ in 0..500 {
            writer.write_sample(LOUD).unwrap();
        }
        writer.finalize().unwrap();
    }
    let before = frames_of(&path);

    let (out, removed) = trim_silence(&path, 0.02, 100).unwrap();

    assert_eq!(out, path);
    assert_eq!(removed, 0.0);
    assert_eq!(frames_of(&path), before);
}

/// An entirely silent file is left alone.
#[test]
fn fully_silent_file_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    write_blocks(&path, &[(0, 8)]);

    let (_, removed) = trim_silence(&path, 0.02, 100).unwrap();

    assert_eq!(removed, 0.0);
    assert_eq!(frames_of(&path), (8 * CHUNK) as u32);
}

/// Files shorter than one analysis chunk pass through untouched.
#[test]
fn too_short_file_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..500 {
        writer.write_sample(LOUD).unwrap();
    }
    writer.finalize().unwrap();

    let (_, removed) = trim_silence(&path, 0.02, 100).unwrap();

    assert_eq!(removed, 0.0);
    assert_eq!(frames_of(&path), 500);
}

// ---------------------------------------------------------------------------
// Sample formats
// ---------------------------------------------------------------------------

/// Float WAVs are trimmed and rewritten in their original format.
#[test]
fn float_format_is_preserved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audio.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..16 * CHUNK {
        writer.write_sample(0.0f32).unwrap();
    }
    for _ in 0..16 * CHUNK {
        writer.write_sample(0.4f32).unwrap();
    }
    writer.finalize().unwrap();

    let (_, removed) = trim_silence(&path, 0.02, 100).unwrap();

    assert!(removed > 0.0);
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
    assert_eq!(reader.spec().bits_per_sample, 32);
}

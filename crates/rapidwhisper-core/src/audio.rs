use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No input device available")]
    MicrophoneUnavailable,
    #[error("No supported input config")]
    NoSupportedConfig,
    #[error("Failed to build stream: {0}")]
    StreamBuild(String),
    #[error("Failed to play stream: {0}")]
    StreamPlay(String),
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Recording captured no audio")]
    EmptyRecording,
    #[error("Recording too short: {0:.2}s")]
    RecordingTooShort(f64),
    #[error("Failed to write WAV: {0}")]
    WavWrite(String),
}

/// Hard floor below which a stop yields `EmptyRecording` regardless of the
/// configured minimum.
const EMPTY_RECORDING_FLOOR: f64 = 0.3;

/// How many recent RMS values the visualization ring keeps.
const WAVEFORM_CAPACITY: usize = 512;

/// Configuration for a capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate of the finalized WAV.
    pub sample_rate: u32,
    /// Samples per RMS chunk.
    pub chunk_size: usize,
    /// Directory that receives finalized WAV files.
    pub recordings_dir: PathBuf,
    /// Recordings shorter than this stop with `RecordingTooShort`.
    pub min_recording_duration: f64,
    /// Ring buffer capacity between the device callback and the capture
    /// thread, in samples.
    pub buffer_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_size: 1024,
            recordings_dir: PathBuf::from("./recordings"),
            min_recording_duration: EMPTY_RECORDING_FLOOR,
            // 30 seconds at 16kHz
            buffer_capacity: 16000 * 30,
        }
    }
}

/// One loudness reading, timestamped in seconds since the session started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmsSample {
    pub rms: f32,
    pub timestamp: f64,
}

/// Stream of observations out of the capture thread.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Rms(RmsSample),
    /// The input device failed mid-capture; the stream is over.
    DeviceError(String),
}

/// A finalized recording on disk.
#[derive(Debug, Clone)]
pub struct RecordingFile {
    pub path: PathBuf,
    /// Duration computed from the captured sample count. The WAV header is
    /// only consulted for files we did not produce ourselves.
    pub duration_seconds: f64,
    pub sample_rate: u32,
}

enum Control {
    Stop,
    Cancel,
}

/// Handle to a running capture session.
///
/// The cpal stream lives inside the handle and is not `Send`; the handle is
/// created, stopped, and cancelled on the thread that owns the state
/// machine. A dedicated capture thread drains the device ring buffer,
/// computes per-chunk RMS, and materializes the WAV on stop.
pub struct CaptureHandle {
    _stream: cpal::Stream,
    control: Sender<Control>,
    worker: Option<JoinHandle<Result<Option<RecordingFile>, AudioError>>>,
    waveform: Arc<Mutex<VecDeque<f32>>>,
}

impl CaptureHandle {
    /// Open the default input device and start capturing. RMS samples and
    /// terminal device errors arrive on `events`.
    pub fn start(
        config: CaptureConfig,
        events: Sender<CaptureEvent>,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::MicrophoneUnavailable)?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!("using input device: {device_name}");

        let supported_config = device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig)?;
        let device_sample_rate = supported_config.sample_rate().0;
        let device_channels = supported_config.channels();
        info!(
            "device config: {device_sample_rate}Hz, {device_channels}ch, {:?}",
            supported_config.sample_format()
        );

        let rb = HeapRb::<f32>::new(config.buffer_capacity);
        let (producer, consumer) = rb.split();

        let running = Arc::new(AtomicBool::new(true));
        let device_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let stream = build_stream(
            &device,
            &supported_config,
            producer,
            running.clone(),
            device_error.clone(),
            config.sample_rate,
            device_channels,
            device_sample_rate,
        )?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        let (control_tx, control_rx) = unbounded();
        let waveform = Arc::new(Mutex::new(VecDeque::with_capacity(WAVEFORM_CAPACITY)));

        let worker = std::thread::spawn({
            let waveform = waveform.clone();
            move || capture_loop(config, consumer, control_rx, events, running, device_error, waveform)
        });

        info!("audio capture started");
        Ok(Self {
            _stream: stream,
            control: control_tx,
            worker: Some(worker),
            waveform,
        })
    }

    /// Stop capturing and finalize the WAV. Fails with `EmptyRecording`
    /// when less than one chunk (or less than 0.3 s) was captured, and with
    /// `RecordingTooShort` below the configured floor.
    pub fn stop(mut self) -> Result<RecordingFile, AudioError> {
        let _ = self.control.send(Control::Stop);
        match self.join() {
            Ok(Some(file)) => Ok(file),
            Ok(None) => Err(AudioError::EmptyRecording),
            Err(e) => Err(e),
        }
    }

    /// Stop capturing and discard everything; no file is produced.
    pub fn cancel(mut self) {
        let _ = self.control.send(Control::Cancel);
        if let Err(e) = self.join() {
            warn!("cancel: capture thread reported {e}");
        }
        info!("recording cancelled, buffer discarded");
    }

    /// Most recent RMS values, oldest first. For UI waveform collaborators.
    pub fn waveform_snapshot(&self) -> Vec<f32> {
        match self.waveform.lock() {
            Ok(ring) => ring.iter().copied().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn join(&mut self) -> Result<Option<RecordingFile>, AudioError> {
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(AudioError::Device("capture thread panicked".into()))),
            None => Err(AudioError::Device("capture already finished".into())),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.control.send(Control::Cancel);
            let _ = self.join();
        }
    }
}

/// The capture thread: drain the device ring, cut fixed-size chunks, emit
/// RMS, buffer PCM, and finalize or discard on command.
fn capture_loop(
    config: CaptureConfig,
    mut consumer: HeapCons<f32>,
    control: Receiver<Control>,
    events: Sender<CaptureEvent>,
    running: Arc<AtomicBool>,
    device_error: Arc<Mutex<Option<String>>>,
    waveform: Arc<Mutex<VecDeque<f32>>>,
) -> Result<Option<RecordingFile>, AudioError> {
    let mut pcm: Vec<i16> = Vec::new();
    let mut pending: Vec<f32> = Vec::new();
    let mut chunks_emitted: u64 = 0;

    let finish = loop {
        if let Some(message) = device_error.lock().ok().and_then(|mut slot| slot.take()) {
            running.store(false, Ordering::Release);
            let _ = events.send(CaptureEvent::DeviceError(message.clone()));
            return Err(AudioError::Device(message));
        }

        match control.try_recv() {
            Ok(ctrl) => break ctrl,
            Err(crossbeam_channel::TryRecvError::Empty) => {}
            Err(crossbeam_channel::TryRecvError::Disconnected) => break Control::Cancel,
        }

        let available = consumer.occupied_len();
        if available == 0 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            continue;
        }

        let mut buf = vec![0.0f32; available];
        let read = consumer.pop_slice(&mut buf);
        buf.truncate(read);
        pending.extend_from_slice(&buf);

        while pending.len() >= config.chunk_size {
            let chunk: Vec<f32> = pending.drain(..config.chunk_size).collect();
            process_chunk(
                &chunk,
                &mut pcm,
                &mut chunks_emitted,
                &config,
                &events,
                &waveform,
            );
        }
    };

    running.store(false, Ordering::Release);

    match finish {
        Control::Cancel => Ok(None),
        Control::Stop => {
            // Flush whatever the device delivered before the stop arrived.
            let remaining = consumer.occupied_len();
            if remaining > 0 {
                let mut buf = vec![0.0f32; remaining];
                let read = consumer.pop_slice(&mut buf);
                pending.extend_from_slice(&buf[..read]);
            }
            while pending.len() >= config.chunk_size {
                let chunk: Vec<f32> = pending.drain(..config.chunk_size).collect();
                process_chunk(
                    &chunk,
                    &mut pcm,
                    &mut chunks_emitted,
                    &config,
                    &events,
                    &waveform,
                );
            }
            // The final chunk may be short; it goes into the file as is.
            pcm.extend(pending.iter().map(|&s| f32_to_i16(s)));

            finalize_recording(&config, &pcm, chunks_emitted).map(Some)
        }
    }
}

fn process_chunk(
    chunk: &[f32],
    pcm: &mut Vec<i16>,
    chunks_emitted: &mut u64,
    config: &CaptureConfig,
    events: &Sender<CaptureEvent>,
    waveform: &Arc<Mutex<VecDeque<f32>>>,
) {
    let rms = chunk_rms(chunk);
    *chunks_emitted += 1;
    let timestamp =
        (*chunks_emitted * config.chunk_size as u64) as f64 / config.sample_rate as f64;

    let _ = events.send(CaptureEvent::Rms(RmsSample { rms, timestamp }));

    if let Ok(mut ring) = waveform.lock() {
        if ring.len() == WAVEFORM_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(rms);
    }

    pcm.extend(chunk.iter().map(|&s| f32_to_i16(s)));
}

fn finalize_recording(
    config: &CaptureConfig,
    pcm: &[i16],
    chunks_emitted: u64,
) -> Result<RecordingFile, AudioError> {
    let duration = pcm.len() as f64 / config.sample_rate as f64;

    if chunks_emitted == 0 || duration < EMPTY_RECORDING_FLOOR {
        debug!("discarding empty recording ({duration:.2}s, {chunks_emitted} chunks)");
        return Err(AudioError::EmptyRecording);
    }
    if duration < config.min_recording_duration {
        return Err(AudioError::RecordingTooShort(duration));
    }

    let path = fresh_recording_path(&config.recordings_dir);
    write_wav(&path, pcm, config.sample_rate)?;

    info!("recording saved: {} ({duration:.2}s)", path.display());
    Ok(RecordingFile {
        path,
        duration_seconds: duration,
        sample_rate: config.sample_rate,
    })
}

fn fresh_recording_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let tag = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("recording_{stamp}_{}.wav", &tag[..8]))
}

/// Write mono 16-bit PCM with the canonical RIFF/WAVE layout.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), AudioError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AudioError::WavWrite(e.to_string()))?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| AudioError::WavWrite(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| AudioError::WavWrite(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::WavWrite(e.to_string()))
}

/// Duration read from a WAV header. Fallback for files this process did not
/// capture itself; our own recordings carry their duration in
/// [`RecordingFile`].
pub fn wav_duration_secs(path: &Path) -> Result<f64, AudioError> {
    let reader = hound::WavReader::open(path).map_err(|e| AudioError::WavWrite(e.to_string()))?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// RMS of one chunk of [-1, 1] samples, so the result lands in [0, 1].
pub fn chunk_rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let mean_sq: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
    mean_sq.sqrt()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Build a cpal input stream that writes resampled mono samples into the
/// ring buffer. Device errors land in the shared error slot for the capture
/// thread to surface.
#[allow(clippy::too_many_arguments)]
fn build_stream(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    mut producer: HeapProd<f32>,
    running: Arc<AtomicBool>,
    device_error: Arc<Mutex<Option<String>>>,
    target_rate: u32,
    channels: u16,
    device_rate: u32,
) -> Result<cpal::Stream, AudioError> {
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.clone().into();

    // Linear interpolation state for downsampling to the target rate.
    let ratio = device_rate as f64 / target_rate as f64;
    let mut resample_pos: f64 = 0.0;

    macro_rules! build_input_stream {
        ($sample_type:ty, $to_f32:expr) => {{
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[$sample_type], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }

                        // Convert to mono f32
                        let mono: Vec<f32> = data
                            .chunks(channels as usize)
                            .map(|frame| {
                                let sum: f32 = frame.iter().map(|s| $to_f32(*s)).sum();
                                sum / channels as f32
                            })
                            .collect();

                        if device_rate == target_rate {
                            let _ = producer.push_slice(&mono);
                        } else {
                            let mut resampled = Vec::new();
                            while (resample_pos as usize) < mono.len().saturating_sub(1) {
                                let idx = resample_pos as usize;
                                let frac = resample_pos - idx as f64;
                                let sample = mono[idx] * (1.0 - frac as f32)
                                    + mono[idx + 1] * frac as f32;
                                resampled.push(sample);
                                resample_pos += ratio;
                            }
                            resample_pos -= mono.len() as f64;
                            if resample_pos < 0.0 {
                                resample_pos = 0.0;
                            }
                            let _ = producer.push_slice(&resampled);
                        }
                    },
                    {
                        let device_error = device_error.clone();
                        move |err| {
                            error!("audio input error: {err}");
                            if let Ok(mut slot) = device_error.lock() {
                                slot.get_or_insert_with(|| err.to_string());
                            }
                        }
                    },
                    None,
                )
                .map_err(|e| AudioError::StreamBuild(e.to_string()))?
        }};
    }

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input_stream!(f32, |s: f32| s),
        cpal::SampleFormat::I16 => {
            build_input_stream!(i16, |s: i16| s as f32 / i16::MAX as f32)
        }
        cpal::SampleFormat::U16 => {
            build_input_stream!(u16, |s: u16| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
        }
        _ => {
            return Err(AudioError::StreamBuild(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_rms_bounds() {
        assert_eq!(chunk_rms(&[]), 0.0);
        assert_eq!(chunk_rms(&[0.0; 1024]), 0.0);
        let full = chunk_rms(&[1.0; 1024]);
        assert!((full - 1.0).abs() < 1e-6);
        let half = chunk_rms(&[0.5; 1024]);
        assert!((half - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }
}

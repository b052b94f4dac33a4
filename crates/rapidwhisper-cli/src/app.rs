use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rapidwhisper_core::audio::{AudioError, CaptureConfig, CaptureEvent, CaptureHandle, RecordingFile};
use rapidwhisper_core::clipboard::ClipboardSink;
use rapidwhisper_core::config::{self, AppConfig};
use rapidwhisper_core::hotkey::{self, HotkeyBindings};
use rapidwhisper_core::state::{event_queue, AppEvent, AppState, StateMachine, UiDelegate};
use rapidwhisper_core::stats::StatisticsLedger;
use rapidwhisper_core::transcribe::{
    self, PostProcessingConfig, Provider, TranscriptionOutcome, WorkerConfig,
};
use rapidwhisper_core::vad::{SilenceConfig, SilenceDetector};
use rapidwhisper_core::AppError;

/// Run the application: register hotkeys, then drain the event queue on
/// this thread until ctrl-c.
pub fn run() -> anyhow::Result<()> {
    let config = config::load_config();
    let config_dir = config::config_dir().context("cannot determine config directory")?;
    std::fs::create_dir_all(&config_dir)?;

    let ledger = Arc::new(Mutex::new(StatisticsLedger::new(&config_dir)));
    let (events, queue) = event_queue();

    let delegate = Dictation::new(config.clone(), events.clone(), ledger.clone());
    let mut machine = StateMachine::new(Box::new(delegate));

    let bindings = HotkeyBindings::from_strs(
        &config.hotkey,
        &config.cancel_key,
        Some(&config.format_hotkey),
    )
    .context("invalid hotkey configuration")?;
    hotkey::spawn_listener(bindings, events.clone());

    let shutdown = spawn_ctrl_c_watcher();

    info!(
        "ready — {} starts/stops dictation, {} cancels",
        config.hotkey, config.cancel_key
    );

    loop {
        crossbeam_channel::select! {
            recv(queue) -> event => {
                let Ok(event) = event else { break };

                // Statistics are written from this thread only, and only
                // for results the machine is actually going to consume.
                if let AppEvent::TranscriptionComplete { session_id, outcome } = &event {
                    if machine.state() == AppState::Processing
                        && machine.session_id() == Some(*session_id)
                    {
                        record_outcome(&ledger, outcome);
                    }
                }

                machine.handle(event);
            }
            recv(shutdown) -> _ => {
                info!("shutting down");
                machine.cleanup();
                break;
            }
        }
    }

    Ok(())
}

fn spawn_ctrl_c_watcher() -> Receiver<()> {
    let (tx, rx) = bounded::<()>(1);
    std::thread::spawn(move || {
        let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        else {
            return;
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            let _ = tx.send(());
        }
    });
    rx
}

fn record_outcome(ledger: &Arc<Mutex<StatisticsLedger>>, outcome: &TranscriptionOutcome) {
    if let Some(reason) = &outcome.post_processing_degraded {
        warn!("post-processing skipped, raw transcription kept: {reason}");
    }

    match ledger.lock() {
        Ok(mut ledger) => {
            if let Err(e) =
                ledger.track_transcription(outcome.audio_duration_seconds, &outcome.text)
            {
                warn!("failed to record transcription statistics: {e}");
            }
            if outcome.removed_silence_seconds > 0.0 {
                if let Err(e) = ledger.track_silence_removal(outcome.removed_silence_seconds) {
                    warn!("failed to record silence-removal statistics: {e}");
                }
            }
        }
        Err(_) => warn!("statistics ledger lock poisoned"),
    }
}

/// The UI delegate: owns the capture handle, spawns the VAD monitor and
/// transcription workers, and writes results to the clipboard. Everything
/// here runs on the event-loop thread; worker threads talk back through the
/// event queue.
struct Dictation {
    config: AppConfig,
    events: Sender<AppEvent>,
    ledger: Arc<Mutex<StatisticsLedger>>,
    capture: Option<CaptureHandle>,
    last_recording: Option<RecordingFile>,
    /// Bumped on every display so stale auto-hide timers miss.
    display_epoch: Arc<AtomicU64>,
}

impl Dictation {
    fn new(
        config: AppConfig,
        events: Sender<AppEvent>,
        ledger: Arc<Mutex<StatisticsLedger>>,
    ) -> Self {
        Self {
            config,
            events,
            ledger,
            capture: None,
            last_recording: None,
            display_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Feed capture output to the silence detector on its own thread. In
    /// manual-stop mode only device errors are watched.
    fn spawn_capture_monitor(&self, rx: Receiver<CaptureEvent>) {
        let events = self.events.clone();
        let manual_stop = self.config.manual_stop;
        let mut detector = SilenceDetector::new(SilenceConfig {
            threshold: self.config.silence_threshold,
            silence_duration: self.config.silence_duration,
            min_speech_duration: self.config.min_speech_duration,
        });

        std::thread::spawn(move || {
            for event in rx {
                match event {
                    CaptureEvent::Rms(sample) => {
                        if !manual_stop && detector.update(sample.rms, sample.timestamp) {
                            let _ = events.send(AppEvent::SilenceDetected);
                            break;
                        }
                    }
                    CaptureEvent::DeviceError(message) => {
                        let _ = events.send(AppEvent::Fatal(AppError::Audio(
                            AudioError::Device(message),
                        )));
                        break;
                    }
                }
            }
            debug!("capture monitor finished");
        });
    }

    fn worker_config(&self) -> WorkerConfig {
        let provider = self.config.ai_provider;
        let post_processing = if self.config.enable_post_processing {
            let pp_provider = self.config.post_processing_provider.unwrap_or(provider);
            Some(PostProcessingConfig {
                provider: pp_provider,
                api_key: self.config.api_key_for(pp_provider),
                base_url: (pp_provider == Provider::Custom)
                    .then(|| self.config.llm_base_url.clone())
                    .flatten(),
                model: self.config.post_processing_model.clone(),
                prompt: self.config.post_processing_prompt.clone(),
            })
        } else {
            None
        };

        WorkerConfig {
            provider,
            api_key: self.config.api_key_for(provider),
            base_url: (provider == Provider::Custom)
                .then(|| self.config.custom_base_url.clone())
                .flatten(),
            model: self.config.custom_model.clone(),
            trim_silence: self.config.manual_stop,
            silence_threshold: self.config.silence_threshold,
            keep_recordings: self.config.keep_recordings,
            post_processing,
        }
    }
}

impl UiDelegate for Dictation {
    fn on_show_window(&mut self) {
        // The floating window is an external collaborator.
        debug!("show window requested");
    }

    fn on_hide_window(&mut self) {
        debug!("hide window requested");
    }

    fn on_start_recording(&mut self) {
        // Reload so settings edits apply from the next recording onwards.
        self.config = config::load_config();

        let capture_config = CaptureConfig {
            sample_rate: self.config.sample_rate,
            chunk_size: self.config.chunk_size,
            recordings_dir: self.config.effective_recordings_dir(),
            ..CaptureConfig::default()
        };

        let (capture_tx, capture_rx) = crossbeam_channel::unbounded();
        match CaptureHandle::start(capture_config, capture_tx) {
            Ok(handle) => {
                self.capture = Some(handle);
                self.spawn_capture_monitor(capture_rx);
            }
            Err(e) => {
                let _ = self.events.send(AppEvent::Fatal(AppError::Audio(e)));
            }
        }
    }

    fn on_stop_recording(&mut self) -> Option<PathBuf> {
        let Some(handle) = self.capture.take() else {
            warn!("stop requested but no capture is running");
            return None;
        };

        match handle.stop() {
            Ok(file) => {
                match self.ledger.lock() {
                    Ok(mut ledger) => {
                        if let Err(e) = ledger.track_recording(file.duration_seconds) {
                            warn!("failed to record recording statistics: {e}");
                        }
                    }
                    Err(_) => warn!("statistics ledger lock poisoned"),
                }
                let path = file.path.clone();
                self.last_recording = Some(file);
                Some(path)
            }
            Err(e) => {
                let _ = self.events.send(AppEvent::Fatal(AppError::Audio(e)));
                None
            }
        }
    }

    fn on_cancel_recording(&mut self) {
        if let Some(handle) = self.capture.take() {
            handle.cancel();
        }
        self.last_recording = None;
    }

    fn on_start_transcription(&mut self, session_id: Uuid, audio_path: &Path) {
        let recording = match self.last_recording.take() {
            Some(file) if file.path == audio_path => file,
            _ => {
                // A path we did not capture ourselves: the header is the
                // only duration source available.
                let duration = rapidwhisper_core::audio::wav_duration_secs(audio_path)
                    .unwrap_or_default();
                RecordingFile {
                    path: audio_path.to_path_buf(),
                    duration_seconds: duration,
                    sample_rate: self.config.sample_rate,
                }
            }
        };

        transcribe::spawn_worker(
            session_id,
            recording,
            self.worker_config(),
            self.events.clone(),
        );
    }

    fn on_display_result(&mut self, text: &str) {
        if !ClipboardSink::copy_plain(text) {
            warn!("failed to copy result to clipboard");
        }
        info!("result ready ({} chars)", text.chars().count());

        let epoch = self.display_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = self.display_epoch.clone();
        let events = self.events.clone();
        let delay = Duration::from_secs_f64(self.config.auto_hide_delay.max(0.0));
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if guard.load(Ordering::SeqCst) == epoch {
                let _ = events.send(AppEvent::DisplayTimeoutElapsed);
            }
        });
    }

    fn on_show_error(&mut self, error: &AppError) {
        // Tray notifications are an external collaborator; the terminal
        // line is this binary's rendering of the (kind, fields) tuple.
        error!("{error}");
    }
}

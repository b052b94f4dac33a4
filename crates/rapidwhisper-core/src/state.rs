use std::path::{Path, PathBuf};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transcribe::{ApiError, TranscriptionOutcome};
use crate::AppError;

/// Application states. Transitions follow a fixed table; anything else is
/// ignored with a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Recording,
    Processing,
    Displaying,
    Error,
}

impl AppState {
    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Idle => "idle",
            AppState::Recording => "recording",
            AppState::Processing => "processing",
            AppState::Displaying => "displaying",
            AppState::Error => "error",
        }
    }
}

/// Everything that can happen to the state machine. Producers on other
/// threads post these onto the queue; the owning thread drains it.
#[derive(Debug)]
pub enum AppEvent {
    HotkeyPressed,
    CancelPressed,
    SilenceDetected,
    FormatSelectionRequested,
    TranscriptionComplete {
        session_id: Uuid,
        outcome: TranscriptionOutcome,
    },
    TranscriptionError {
        session_id: Uuid,
        error: ApiError,
    },
    DisplayTimeoutElapsed,
    Fatal(AppError),
}

/// Create the application event queue.
pub fn event_queue() -> (Sender<AppEvent>, Receiver<AppEvent>) {
    unbounded()
}

/// One press-to-release dictation attempt. At most one exists at a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub started_at: Instant,
}

/// The UI collaborator. All methods are invoked on the thread that owns the
/// state machine; they must not re-enter the machine synchronously —
/// anything they trigger comes back through the event queue.
pub trait UiDelegate {
    fn on_show_window(&mut self);
    fn on_hide_window(&mut self);
    fn on_start_recording(&mut self);
    /// Stop the capture and return the finalized WAV path, or `None` when
    /// finalization failed (the failure itself arrives as a `Fatal` event).
    fn on_stop_recording(&mut self) -> Option<PathBuf>;
    fn on_cancel_recording(&mut self);
    /// Launch the transcription worker for the given session.
    fn on_start_transcription(&mut self, session_id: Uuid, audio_path: &Path);
    fn on_display_result(&mut self, text: &str);
    fn on_show_error(&mut self, error: &AppError);
}

/// Publish-only observer for lifecycle event points. Hook runtimes live
/// outside the core; failures there cannot reach the session.
pub trait EventHook {
    fn on_event(&self, event: &str, session_id: Option<Uuid>);
}

/// Coordinates hotkey, silence, transcription, and display events around a
/// single session, invoking the UI delegate on every transition.
pub struct StateMachine {
    state: AppState,
    previous_state: Option<AppState>,
    session: Option<Session>,
    /// Optional format tag set by a collaborator before recording starts,
    /// cleared when the session ends or is cancelled.
    manual_format: Option<String>,
    delegate: Box<dyn UiDelegate>,
    hook: Option<Box<dyn EventHook>>,
}

impl StateMachine {
    pub fn new(delegate: Box<dyn UiDelegate>) -> Self {
        Self {
            state: AppState::Idle,
            previous_state: None,
            session: None,
            manual_format: None,
            delegate,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn EventHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn previous_state(&self) -> Option<AppState> {
        self.previous_state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn set_manual_format(&mut self, format_id: &str) {
        info!("manual format selection set: {format_id}");
        self.manual_format = Some(format_id.to_string());
    }

    pub fn manual_format(&self) -> Option<&str> {
        self.manual_format.as_deref()
    }

    pub fn clear_manual_format(&mut self) {
        if let Some(format) = self.manual_format.take() {
            info!("manual format selection cleared: {format}");
        }
    }

    /// Dispatch one queued event.
    pub fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::HotkeyPressed => self.on_hotkey_pressed(),
            AppEvent::CancelPressed => self.on_cancel_pressed(),
            AppEvent::SilenceDetected => self.on_silence_detected(),
            AppEvent::FormatSelectionRequested => {
                self.publish_hook("format_selection_requested");
            }
            AppEvent::TranscriptionComplete {
                session_id,
                outcome,
            } => self.on_transcription_complete(session_id, &outcome.text),
            AppEvent::TranscriptionError { session_id, error } => {
                self.on_transcription_error(session_id, error)
            }
            AppEvent::DisplayTimeoutElapsed => self.on_display_timeout(),
            AppEvent::Fatal(error) => self.on_fatal(error),
        }
    }

    pub fn on_hotkey_pressed(&mut self) {
        debug!("hotkey pressed in state {}", self.state.as_str());
        match self.state {
            AppState::Idle => {
                let session_id = self.start_session();
                self.publish_hook_for("before_recording", Some(session_id));
                self.delegate.on_show_window();
                self.delegate.on_start_recording();
                self.transition_to(AppState::Recording);
            }
            AppState::Recording => self.stop_and_process(),
            AppState::Displaying => {
                self.delegate.on_hide_window();
                self.transition_to(AppState::Idle);
            }
            AppState::Processing | AppState::Error => {
                debug!("hotkey ignored in state {}", self.state.as_str());
            }
        }
    }

    pub fn on_cancel_pressed(&mut self) {
        match self.state {
            AppState::Recording => {
                info!("recording cancelled");
                self.delegate.on_cancel_recording();
                self.delegate.on_hide_window();
                self.end_session();
                self.transition_to(AppState::Idle);
            }
            _ => debug!("cancel ignored in state {}", self.state.as_str()),
        }
    }

    pub fn on_silence_detected(&mut self) {
        match self.state {
            AppState::Recording => {
                info!("silence detected, stopping recording");
                self.stop_and_process();
            }
            _ => warn!("silence detected in state {}, ignoring", self.state.as_str()),
        }
    }

    pub fn on_transcription_complete(&mut self, session_id: Uuid, text: &str) {
        if self.state != AppState::Processing || self.session_id() != Some(session_id) {
            debug!("stale transcription result for session {session_id}, discarding");
            return;
        }

        self.publish_hook_for("task_completed", Some(session_id));
        self.end_session();
        self.delegate.on_display_result(text);
        self.transition_to(AppState::Displaying);
    }

    pub fn on_transcription_error(&mut self, session_id: Uuid, error: ApiError) {
        if self.state != AppState::Processing || self.session_id() != Some(session_id) {
            debug!("stale transcription error for session {session_id}, discarding");
            return;
        }

        let error = AppError::from(error);
        self.transition_to(AppState::Error);
        self.delegate.on_show_error(&error);
        self.end_session();
        self.transition_to(AppState::Idle);
    }

    pub fn on_display_timeout(&mut self) {
        match self.state {
            AppState::Displaying => {
                self.delegate.on_hide_window();
                self.transition_to(AppState::Idle);
            }
            _ => debug!("display timeout ignored in state {}", self.state.as_str()),
        }
    }

    /// A component died outside the normal flow. Show the error and return
    /// to Idle so the next hotkey press starts clean.
    pub fn on_fatal(&mut self, error: AppError) {
        warn!("fatal error in state {}: {error}", self.state.as_str());
        if self.state == AppState::Idle {
            self.delegate.on_show_error(&error);
            return;
        }

        if self.state == AppState::Recording {
            self.delegate.on_cancel_recording();
        }
        self.transition_to(AppState::Error);
        self.delegate.on_show_error(&error);
        self.delegate.on_hide_window();
        self.end_session();
        self.transition_to(AppState::Idle);
    }

    /// Shutdown path: stop whatever is in flight and settle in Idle.
    pub fn cleanup(&mut self) {
        info!("cleaning up state machine");
        if self.state == AppState::Recording {
            self.delegate.on_cancel_recording();
        }
        if self.state != AppState::Idle {
            self.delegate.on_hide_window();
        }
        self.end_session();
        self.transition_to(AppState::Idle);
    }

    fn stop_and_process(&mut self) {
        let Some(session_id) = self.session_id() else {
            warn!("stop requested without an active session");
            self.transition_to(AppState::Idle);
            return;
        };

        let audio_path = self.delegate.on_stop_recording();
        match audio_path {
            Some(path) => {
                self.transition_to(AppState::Processing);
                self.delegate.on_start_transcription(session_id, &path);
            }
            None => {
                // The stop failure arrives separately as a Fatal event.
                warn!("stop produced no audio file");
                self.transition_to(AppState::Processing);
            }
        }
    }

    fn start_session(&mut self) -> Uuid {
        let session = Session {
            id: Uuid::new_v4(),
            started_at: Instant::now(),
        };
        let id = session.id;
        info!("recording session started: {id}");
        if let Some(format) = &self.manual_format {
            info!("  manual format selection active: {format}");
        }
        self.session = Some(session);
        id
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                "recording session ended: {} ({:.1}s)",
                session.id,
                session.started_at.elapsed().as_secs_f64()
            );
        }
        self.clear_manual_format();
    }

    fn transition_to(&mut self, new_state: AppState) {
        if new_state == self.state {
            debug!("already in state {}", new_state.as_str());
            return;
        }
        self.previous_state = Some(self.state);
        info!("state: {} -> {}", self.state.as_str(), new_state.as_str());
        self.state = new_state;
    }

    fn publish_hook(&self, event: &str) {
        self.publish_hook_for(event, self.session_id());
    }

    fn publish_hook_for(&self, event: &str, session_id: Option<Uuid>) {
        if let Some(hook) = &self.hook {
            hook.on_event(event, session_id);
        }
    }
}

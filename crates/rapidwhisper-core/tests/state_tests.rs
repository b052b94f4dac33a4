// Tests for rapidwhisper_core::state — transition table, session lifecycle,
// manual format selection, stale-result handling, and fatal recovery.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rapidwhisper_core::state::{AppEvent, AppState, EventHook, StateMachine, UiDelegate};
use rapidwhisper_core::transcribe::{ApiError, TranscriptionOutcome};
use rapidwhisper_core::AppError;
use uuid::Uuid;

/// Delegate that records every callback by name for later assertions.
struct TestDelegate {
    calls: Arc<Mutex<Vec<String>>>,
    stop_result: Option<PathBuf>,
}

impl TestDelegate {
    fn new(calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            calls,
            stop_result: Some(PathBuf::from("/tmp/test-recording.wav")),
        }
    }

    fn push(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl UiDelegate for TestDelegate {
    fn on_show_window(&mut self) {
        self.push("show_window");
    }
    fn on_hide_window(&mut self) {
        self.push("hide_window");
    }
    fn on_start_recording(&mut self) {
        self.push("start_recording");
    }
    fn on_stop_recording(&mut self) -> Option<PathBuf> {
        self.push("stop_recording");
        self.stop_result.clone()
    }
    fn on_cancel_recording(&mut self) {
        self.push("cancel_recording");
    }
    fn on_start_transcription(&mut self, _session_id: Uuid, audio_path: &Path) {
        self.push(&format!("start_transcription:{}", audio_path.display()));
    }
    fn on_display_result(&mut self, text: &str) {
        self.push(&format!("display_result:{text}"));
    }
    fn on_show_error(&mut self, error: &AppError) {
        self.push(&format!("show_error:{error}"));
    }
}

fn machine() -> (StateMachine, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let machine = StateMachine::new(Box::new(TestDelegate::new(calls.clone())));
    (machine, calls)
}

fn outcome(text: &str) -> TranscriptionOutcome {
    TranscriptionOutcome {
        text: text.to_string(),
        audio_duration_seconds: 1.0,
        character_count: text.chars().count() as u64,
        word_count: text.split_whitespace().count() as u64,
        removed_silence_seconds: 0.0,
        post_processing_degraded: None,
    }
}

fn calls_of(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    calls.lock().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Idle -> Recording
// ---------------------------------------------------------------------------

/// The first hotkey press starts a session, shows the window, and starts
/// recording.
#[test]
fn hotkey_in_idle_starts_recording() {
    let (mut machine, calls) = machine();
    assert_eq!(machine.state(), AppState::Idle);
    assert!(machine.session_id().is_none());

    machine.on_hotkey_pressed();

    assert_eq!(machine.state(), AppState::Recording);
    assert!(machine.session_id().is_some());
    assert_eq!(calls_of(&calls), vec!["show_window", "start_recording"]);
}

// ---------------------------------------------------------------------------
// Recording -> Processing
// ---------------------------------------------------------------------------

/// A hotkey press during recording stops the capture and hands the audio
/// to the transcription worker.
#[test]
fn hotkey_in_recording_stops_and_transcribes() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();

    assert_eq!(machine.state(), AppState::Processing);
    let calls = calls_of(&calls);
    assert!(calls.contains(&"stop_recording".to_string()));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("start_transcription:")));
}

/// Silence detection during recording takes the same path as the hotkey.
#[test]
fn silence_in_recording_stops_and_transcribes() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_silence_detected();

    assert_eq!(machine.state(), AppState::Processing);
    assert!(calls_of(&calls).contains(&"stop_recording".to_string()));
}

/// The session id is stable from Recording through Processing.
#[test]
fn session_id_stable_across_stop() {
    let (mut machine, _calls) = machine();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();
    machine.on_hotkey_pressed();
    assert_eq!(machine.session_id(), Some(id));
}

/// Silence detected outside Recording is ignored.
#[test]
fn silence_outside_recording_is_ignored() {
    let (mut machine, calls) = machine();
    machine.on_silence_detected();
    assert_eq!(machine.state(), AppState::Idle);
    assert!(calls_of(&calls).is_empty());
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// Cancelling during recording discards the audio and returns to Idle with
/// no session left behind.
#[test]
fn cancel_in_recording_returns_to_idle() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_cancel_pressed();

    assert_eq!(machine.state(), AppState::Idle);
    assert!(machine.session_id().is_none());
    let calls = calls_of(&calls);
    assert!(calls.contains(&"cancel_recording".to_string()));
    // No transcription is started for a cancelled recording.
    assert!(!calls.iter().any(|c| c.starts_with("start_transcription:")));
}

/// Cancel outside Recording does nothing.
#[test]
fn cancel_in_idle_is_ignored() {
    let (mut machine, calls) = machine();
    machine.on_cancel_pressed();
    assert_eq!(machine.state(), AppState::Idle);
    assert!(calls_of(&calls).is_empty());
}

// ---------------------------------------------------------------------------
// Processing -> Displaying -> Idle
// ---------------------------------------------------------------------------

/// A matching transcription result displays the text and ends the session.
#[test]
fn transcription_complete_displays_result() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();

    machine.on_transcription_complete(id, "hello world");

    assert_eq!(machine.state(), AppState::Displaying);
    assert!(machine.session_id().is_none());
    assert!(calls_of(&calls).contains(&"display_result:hello world".to_string()));
}

/// A result for a different session id is discarded without a transition.
#[test]
fn stale_transcription_result_is_discarded() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();

    machine.on_transcription_complete(Uuid::new_v4(), "stale");

    assert_eq!(machine.state(), AppState::Processing);
    assert!(!calls_of(&calls).iter().any(|c| c.starts_with("display_result:")));
}

/// A result arriving in Idle (after a fatal recovery) is discarded.
#[test]
fn transcription_complete_in_idle_is_discarded() {
    let (mut machine, _calls) = machine();
    machine.on_transcription_complete(Uuid::new_v4(), "nobody asked");
    assert_eq!(machine.state(), AppState::Idle);
}

/// A hotkey press while displaying hides the window and returns to Idle.
#[test]
fn hotkey_in_displaying_hides_window() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();
    machine.on_transcription_complete(id, "done");

    machine.on_hotkey_pressed();

    assert_eq!(machine.state(), AppState::Idle);
    assert!(calls_of(&calls).contains(&"hide_window".to_string()));
}

/// The display timeout hides the window as well.
#[test]
fn display_timeout_hides_window() {
    let (mut machine, _calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();
    machine.on_transcription_complete(id, "done");

    machine.on_display_timeout();
    assert_eq!(machine.state(), AppState::Idle);
}

/// A timeout that arrives late, after the window is already hidden, is a
/// no-op.
#[test]
fn late_display_timeout_is_ignored() {
    let (mut machine, _calls) = machine();
    machine.on_display_timeout();
    assert_eq!(machine.state(), AppState::Idle);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A transcription error shows the error and recovers to Idle.
#[test]
fn transcription_error_recovers_to_idle() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();

    machine.on_transcription_error(id, ApiError::Timeout(30));

    assert_eq!(machine.state(), AppState::Idle);
    assert!(machine.session_id().is_none());
    assert!(calls_of(&calls).iter().any(|c| c.starts_with("show_error:")));
}

/// A fatal error during recording cancels the capture before recovering.
#[test]
fn fatal_during_recording_cancels_capture() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();

    machine.on_fatal(AppError::Api(ApiError::Network("down".to_string())));

    assert_eq!(machine.state(), AppState::Idle);
    let calls = calls_of(&calls);
    assert!(calls.contains(&"cancel_recording".to_string()));
    assert!(calls.iter().any(|c| c.starts_with("show_error:")));
}

/// Error display after a transcription error records the Error state as
/// the previous one.
#[test]
fn error_state_is_passed_through() {
    let (mut machine, _calls) = machine();
    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();
    machine.on_transcription_error(id, ApiError::EmptyResponse);

    assert_eq!(machine.state(), AppState::Idle);
    assert_eq!(machine.previous_state(), Some(AppState::Error));
}

// ---------------------------------------------------------------------------
// Manual format selection
// ---------------------------------------------------------------------------

/// The manual format tag survives into the session and is cleared when the
/// session ends.
#[test]
fn manual_format_cleared_on_completion() {
    let (mut machine, _calls) = machine();
    machine.set_manual_format("markdown");
    machine.on_hotkey_pressed();
    assert_eq!(machine.manual_format(), Some("markdown"));

    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();
    machine.on_transcription_complete(id, "text");

    assert_eq!(machine.manual_format(), None);
}

/// Cancelling also clears the manual format tag.
#[test]
fn manual_format_cleared_on_cancel() {
    let (mut machine, _calls) = machine();
    machine.set_manual_format("whatsapp");
    machine.on_hotkey_pressed();
    machine.on_cancel_pressed();
    assert_eq!(machine.manual_format(), None);
}

// ---------------------------------------------------------------------------
// Event queue dispatch
// ---------------------------------------------------------------------------

/// handle() routes queue events through the same transition table.
#[test]
fn handle_dispatches_events() {
    let (mut machine, _calls) = machine();
    machine.handle(AppEvent::HotkeyPressed);
    assert_eq!(machine.state(), AppState::Recording);

    machine.handle(AppEvent::HotkeyPressed);
    assert_eq!(machine.state(), AppState::Processing);

    let id = machine.session_id().unwrap();
    machine.handle(AppEvent::TranscriptionComplete {
        session_id: id,
        outcome: outcome("queued result"),
    });
    assert_eq!(machine.state(), AppState::Displaying);

    machine.handle(AppEvent::DisplayTimeoutElapsed);
    assert_eq!(machine.state(), AppState::Idle);
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

struct TestHook {
    published: Arc<Mutex<Vec<String>>>,
}

impl EventHook for TestHook {
    fn on_event(&self, event: &str, session_id: Option<Uuid>) {
        self.published
            .lock()
            .unwrap()
            .push(format!("{event}:{}", session_id.is_some()));
    }
}

/// before_recording and task_completed are published with a session id.
#[test]
fn hooks_fire_around_the_session() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let published = Arc::new(Mutex::new(Vec::new()));
    let mut machine = StateMachine::new(Box::new(TestDelegate::new(calls)))
        .with_hook(Box::new(TestHook {
            published: published.clone(),
        }));

    machine.on_hotkey_pressed();
    machine.on_hotkey_pressed();
    let id = machine.session_id().unwrap();
    machine.on_transcription_complete(id, "text");

    let published = published.lock().unwrap().clone();
    assert_eq!(
        published,
        vec!["before_recording:true", "task_completed:true"]
    );
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// cleanup() from mid-recording cancels and settles in Idle.
#[test]
fn cleanup_from_recording() {
    let (mut machine, calls) = machine();
    machine.on_hotkey_pressed();

    machine.cleanup();

    assert_eq!(machine.state(), AppState::Idle);
    assert!(machine.session_id().is_none());
    assert!(calls_of(&calls).contains(&"cancel_recording".to_string()));
}

// Tests for rapidwhisper_core::stats — tracking, aggregation, time-period
// filtering, persistence round-trips, and corrupted-file recovery.

use chrono::{Duration, Local};
use rapidwhisper_core::stats::{Period, StatisticsLedger};
use tempfile::TempDir;

fn ledger_in(dir: &TempDir) -> StatisticsLedger {
    StatisticsLedger::new(dir.path())
}

// ---------------------------------------------------------------------------
// Tracking and aggregation
// ---------------------------------------------------------------------------

/// Recording, transcription, and silence-removal events aggregate to the
/// documented per-field sums.
#[test]
fn full_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut ledger = ledger_in(&dir);

    ledger.track_recording(125.5).unwrap();
    ledger
        .track_transcription(125.5, "This is a test transcription")
        .unwrap();
    ledger.track_silence_removal(15.3).unwrap();

    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 1);
    assert_eq!(stats.transcriptions_count, 1);
    assert!((stats.total_recording_seconds - 125.5).abs() < 1e-9);
    assert!((stats.total_transcribed_seconds - 125.5).abs() < 1e-9);
    assert_eq!(stats.total_characters, 28);
    assert_eq!(stats.total_words, 5);
    assert!((stats.total_removed_silence_seconds - 15.3).abs() < 1e-9);
}

/// Character counts are Unicode codepoints, not bytes.
#[test]
fn character_count_uses_codepoints() {
    let dir = TempDir::new().unwrap();
    let mut ledger = ledger_in(&dir);

    ledger.track_transcription(1.0, "привет мир").unwrap();

    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.total_characters, 10);
    assert_eq!(stats.total_words, 2);
}

/// Negative durations are clamped to zero but the event still counts.
#[test]
fn negative_durations_clamp_to_zero() {
    let dir = TempDir::new().unwrap();
    let mut ledger = ledger_in(&dir);

    ledger.track_recording(-5.0).unwrap();
    ledger.track_transcription(-1.0, "text").unwrap();
    ledger.track_silence_removal(-0.5).unwrap();

    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 1);
    assert_eq!(stats.transcriptions_count, 1);
    assert_eq!(stats.total_recording_seconds, 0.0);
    assert_eq!(stats.total_transcribed_seconds, 0.0);
    assert_eq!(stats.total_removed_silence_seconds, 0.0);
}

/// An untouched ledger aggregates to all zeros.
#[test]
fn empty_ledger_aggregates_to_zero() {
    let dir = TempDir::new().unwrap();
    let mut ledger = ledger_in(&dir);

    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 0);
    assert_eq!(stats.transcriptions_count, 0);
    assert_eq!(stats.total_recording_seconds, 0.0);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Events written by one ledger instance are read back by the next.
#[test]
fn events_survive_reload() {
    let dir = TempDir::new().unwrap();
    {
        let mut ledger = ledger_in(&dir);
        ledger.track_recording(10.0).unwrap();
        ledger.track_transcription(10.0, "one two three").unwrap();
    }

    let mut reloaded = ledger_in(&dir);
    let stats = reloaded.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 1);
    assert_eq!(stats.transcriptions_count, 1);
    assert!((stats.total_recording_seconds - 10.0).abs() < 1e-9);
    assert_eq!(stats.total_words, 3);
}

/// The on-disk shape is `{"events": [...]}` with type-tagged entries, and
/// non-ASCII text is stored unescaped.
#[test]
fn storage_shape_is_stable() {
    let dir = TempDir::new().unwrap();
    let mut ledger = ledger_in(&dir);
    ledger.track_recording(1.5).unwrap();

    let raw = std::fs::read_to_string(ledger.storage_path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let events = value["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "recording");
    assert!((events[0]["duration_seconds"].as_f64().unwrap() - 1.5).abs() < 1e-9);
    assert!(events[0]["timestamp"].is_string());
}

// ---------------------------------------------------------------------------
// Time-period filtering
// ---------------------------------------------------------------------------

fn write_events_file(dir: &TempDir, events: &[serde_json::Value]) {
    let data = serde_json::json!({ "events": events });
    std::fs::write(
        dir.path().join("statistics.json"),
        serde_json::to_string_pretty(&data).unwrap(),
    )
    .unwrap();
}

fn recording_event(age: Duration, duration: f64) -> serde_json::Value {
    serde_json::json!({
        "type": "recording",
        "timestamp": (Local::now() - age).to_rfc3339(),
        "duration_seconds": duration,
    })
}

/// Only events at or after the period's lower bound are aggregated.
#[test]
fn period_filtering_excludes_old_events() {
    let dir = TempDir::new().unwrap();
    write_events_file(
        &dir,
        &[
            recording_event(Duration::minutes(5), 1.0),
            recording_event(Duration::days(10), 2.0),
            recording_event(Duration::days(100), 4.0),
        ],
    );

    let mut ledger = ledger_in(&dir);

    let last7 = ledger.get_statistics(Period::Last7Days);
    assert_eq!(last7.recordings_count, 1);
    assert!((last7.total_recording_seconds - 1.0).abs() < 1e-9);

    let last30 = ledger.get_statistics(Period::Last30Days);
    assert_eq!(last30.recordings_count, 2);
    assert!((last30.total_recording_seconds - 3.0).abs() < 1e-9);

    let last365 = ledger.get_statistics(Period::Last365Days);
    assert_eq!(last365.recordings_count, 3);

    let all = ledger.get_statistics(Period::AllTime);
    assert_eq!(all.recordings_count, 3);
    assert!((all.total_recording_seconds - 7.0).abs() < 1e-9);
}

/// Today starts at local midnight: yesterday's events are out.
#[test]
fn today_starts_at_midnight() {
    let dir = TempDir::new().unwrap();
    write_events_file(
        &dir,
        &[
            recording_event(Duration::seconds(30), 1.0),
            recording_event(Duration::days(2), 2.0),
        ],
    );

    let mut ledger = ledger_in(&dir);
    let today = ledger.get_statistics(Period::Today);
    assert_eq!(today.recordings_count, 1);
    assert!((today.total_recording_seconds - 1.0).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Corruption recovery
// ---------------------------------------------------------------------------

/// Invalid JSON is backed up and the ledger starts empty; tracking works
/// again immediately afterwards.
#[test]
fn invalid_json_is_backed_up() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statistics.json");
    std::fs::write(&path, "{invalid json").unwrap();

    let mut ledger = ledger_in(&dir);
    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 0);
    assert!(dir.path().join("statistics.json.backup").exists());

    ledger.track_recording(10.0).unwrap();
    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 1);
}

/// A non-object root is treated as corruption.
#[test]
fn non_object_root_is_backed_up() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("statistics.json"), "[1, 2, 3]").unwrap();

    let mut ledger = ledger_in(&dir);
    assert_eq!(ledger.event_count(), 0);
    assert!(dir.path().join("statistics.json.backup").exists());
}

/// A non-list `events` value is treated as corruption.
#[test]
fn non_list_events_is_backed_up() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("statistics.json"),
        r#"{"events": "not a list"}"#,
    )
    .unwrap();

    let mut ledger = ledger_in(&dir);
    assert_eq!(ledger.event_count(), 0);
    assert!(dir.path().join("statistics.json.backup").exists());
}

/// Individually malformed events are skipped; valid neighbours survive and
/// no backup is made.
#[test]
fn malformed_events_are_skipped() {
    let dir = TempDir::new().unwrap();
    write_events_file(
        &dir,
        &[
            recording_event(Duration::minutes(1), 3.0),
            serde_json::json!({ "type": "recording" }),
            serde_json::json!({ "type": "unknown_kind", "timestamp": "now" }),
            recording_event(Duration::minutes(2), 4.0),
        ],
    );

    let mut ledger = ledger_in(&dir);
    let stats = ledger.get_statistics(Period::AllTime);
    assert_eq!(stats.recordings_count, 2);
    assert!((stats.total_recording_seconds - 7.0).abs() < 1e-9);
    assert!(!dir.path().join("statistics.json.backup").exists());
}

/// A missing file is simply an empty ledger, not an error.
#[test]
fn missing_file_is_empty_ledger() {
    let dir = TempDir::new().unwrap();
    let mut ledger = ledger_in(&dir);
    assert_eq!(ledger.event_count(), 0);
    assert!(!dir.path().join("statistics.json.backup").exists());
}

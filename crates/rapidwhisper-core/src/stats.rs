use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One recorded user-visible operation. Appended on completion, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatsEvent {
    Recording {
        timestamp: DateTime<Local>,
        duration_seconds: f64,
    },
    Transcription {
        timestamp: DateTime<Local>,
        duration_seconds: f64,
        character_count: u64,
        word_count: u64,
    },
    SilenceRemoved {
        timestamp: DateTime<Local>,
        removed_duration_seconds: f64,
    },
}

impl StatsEvent {
    fn timestamp(&self) -> DateTime<Local> {
        match self {
            StatsEvent::Recording { timestamp, .. }
            | StatsEvent::Transcription { timestamp, .. }
            | StatsEvent::SilenceRemoved { timestamp, .. } => *timestamp,
        }
    }
}

/// Time window for aggregation queries. Every period is an inclusive lower
/// bound on event timestamps; `AllTime` has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Last7Days,
    Last30Days,
    Last365Days,
    AllTime,
}

impl Period {
    fn cutoff(self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        match self {
            Period::Today => {
                let midnight = now.date_naive().and_hms_opt(0, 0, 0)?;
                midnight.and_local_timezone(Local).single()
            }
            Period::Last7Days => Some(now - Duration::days(7)),
            Period::Last30Days => Some(now - Duration::days(30)),
            Period::Last365Days => Some(now - Duration::days(365)),
            Period::AllTime => None,
        }
    }
}

/// Field-wise sums over a filtered event set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedStats {
    pub recordings_count: u64,
    pub transcriptions_count: u64,
    pub total_recording_seconds: f64,
    pub total_transcribed_seconds: f64,
    pub total_characters: u64,
    pub total_words: u64,
    pub total_removed_silence_seconds: f64,
}

/// Durable append-only ledger over `statistics.json`.
///
/// The file is loaded lazily on the first call that needs it. A structurally
/// corrupt file (not JSON, non-object root, non-array `events`) is renamed
/// to `statistics.json.backup` and the ledger starts empty; individually
/// malformed events are skipped and the valid remainder survives.
pub struct StatisticsLedger {
    storage_path: PathBuf,
    events: Vec<StatsEvent>,
    loaded: bool,
}

impl StatisticsLedger {
    /// Create a ledger backed by `statistics.json` inside `config_dir`.
    /// Nothing is read from disk until the first use.
    pub fn new(config_dir: &Path) -> Self {
        Self {
            storage_path: config_dir.join("statistics.json"),
            events: Vec::new(),
            loaded: false,
        }
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn track_recording(&mut self, duration_seconds: f64) -> Result<(), StatsError> {
        let duration_seconds = clamp_duration(duration_seconds, "recording duration");
        self.append(StatsEvent::Recording {
            timestamp: Local::now(),
            duration_seconds,
        })
    }

    /// Character count is Unicode codepoints; word count is
    /// whitespace-separated tokens.
    pub fn track_transcription(
        &mut self,
        audio_duration_seconds: f64,
        text: &str,
    ) -> Result<(), StatsError> {
        let duration_seconds = clamp_duration(audio_duration_seconds, "audio duration");
        self.append(StatsEvent::Transcription {
            timestamp: Local::now(),
            duration_seconds,
            character_count: text.chars().count() as u64,
            word_count: text.split_whitespace().count() as u64,
        })
    }

    pub fn track_silence_removal(&mut self, removed_seconds: f64) -> Result<(), StatsError> {
        let removed_duration_seconds = clamp_duration(removed_seconds, "removed silence");
        self.append(StatsEvent::SilenceRemoved {
            timestamp: Local::now(),
            removed_duration_seconds,
        })
    }

    /// Aggregate all events whose timestamp is at or after the period's
    /// lower bound.
    pub fn get_statistics(&mut self, period: Period) -> AggregatedStats {
        self.ensure_loaded();
        let cutoff = period.cutoff(Local::now());
        let filtered = self
            .events
            .iter()
            .filter(|e| cutoff.is_none_or(|c| e.timestamp() >= c));
        aggregate(filtered)
    }

    /// Number of events currently in the ledger.
    pub fn event_count(&mut self) -> usize {
        self.ensure_loaded();
        self.events.len()
    }

    fn append(&mut self, event: StatsEvent) -> Result<(), StatsError> {
        self.ensure_loaded();
        self.events.push(event);
        self.save()
    }

    fn ensure_loaded(&mut self) {
        if !self.loaded {
            self.events = self.load_from_disk();
            self.loaded = true;
        }
    }

    fn load_from_disk(&self) -> Vec<StatsEvent> {
        if !self.storage_path.exists() {
            return Vec::new();
        }

        let contents = match std::fs::read_to_string(&self.storage_path) {
            Ok(c) => c,
            Err(e) => {
                warn!("statistics file unreadable: {e}");
                self.back_up_corrupt_file();
                return Vec::new();
            }
        };

        let root: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                warn!("statistics file is not valid JSON: {e}");
                self.back_up_corrupt_file();
                return Vec::new();
            }
        };

        let Some(object) = root.as_object() else {
            warn!("statistics root is not an object");
            self.back_up_corrupt_file();
            return Vec::new();
        };
        let items = match object.get("events") {
            None => return Vec::new(),
            Some(events) => match events.as_array() {
                Some(items) => items,
                None => {
                    warn!("statistics 'events' is not a list");
                    self.back_up_corrupt_file();
                    return Vec::new();
                }
            },
        };

        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<StatsEvent>(item.clone()) {
                Ok(event) => parsed.push(event),
                Err(e) => warn!("skipping invalid statistics event: {e}"),
            }
        }
        debug!("loaded {} statistics event(s)", parsed.len());
        parsed
    }

    fn back_up_corrupt_file(&self) {
        let backup = self.storage_path.with_extension("json.backup");
        match std::fs::rename(&self.storage_path, &backup) {
            Ok(()) => warn!("corrupt statistics moved to {}", backup.display()),
            Err(e) => warn!("failed to back up corrupt statistics: {e}"),
        }
    }

    fn save(&self) -> Result<(), StatsError> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::json!({ "events": self.events });
        let json = serde_json::to_string_pretty(&data)?;
        std::fs::write(&self.storage_path, json)?;
        Ok(())
    }
}

fn clamp_duration(seconds: f64, what: &str) -> f64 {
    if seconds < 0.0 {
        warn!("negative {what} ({seconds}), clamping to 0");
        0.0
    } else {
        seconds
    }
}

fn aggregate<'a>(events: impl Iterator<Item = &'a StatsEvent>) -> AggregatedStats {
    let mut stats = AggregatedStats::default();
    for event in events {
        match event {
            StatsEvent::Recording {
                duration_seconds, ..
            } => {
                stats.recordings_count += 1;
                if *duration_seconds >= 0.0 {
                    stats.total_recording_seconds += duration_seconds;
                }
            }
            StatsEvent::Transcription {
                duration_seconds,
                character_count,
                word_count,
                ..
            } => {
                stats.transcriptions_count += 1;
                if *duration_seconds >= 0.0 {
                    stats.total_transcribed_seconds += duration_seconds;
                }
                stats.total_characters += character_count;
                stats.total_words += word_count;
            }
            StatsEvent::SilenceRemoved {
                removed_duration_seconds,
                ..
            } => {
                if *removed_duration_seconds >= 0.0 {
                    stats.total_removed_silence_seconds += removed_duration_seconds;
                }
            }
        }
    }
    stats
}

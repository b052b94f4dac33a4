use tracing::debug;

/// Tuning for the streaming silence detector.
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Base RMS threshold below which a sample counts as silent.
    pub threshold: f32,
    /// How long silence must last to end the utterance, in seconds.
    pub silence_duration: f64,
    /// Debounce window: pauses shorter than this after speech are ignored,
    /// and the detector never fires earlier than this into a recording.
    pub min_speech_duration: f64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            silence_duration: 1.5,
            min_speech_duration: 0.5,
        }
    }
}

/// Streaming end-of-utterance detector over an RMS loudness feed.
///
/// Consumes `(rms, timestamp)` pairs with timestamps in seconds since the
/// start of the recording, and reports `true` exactly once per qualifying
/// silence episode. The threshold adapts to a calibrated background noise
/// level when one is available.
pub struct SilenceDetector {
    config: SilenceConfig,
    /// Multiplier applied to the calibrated noise floor.
    adaptive_multiplier: f32,
    background_noise_level: f32,
    silence_start: Option<f64>,
    last_speech: Option<f64>,
    recording_start: Option<f64>,
    /// Latched after firing so one silence episode reports at most once.
    fired: bool,
}

impl SilenceDetector {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            adaptive_multiplier: 2.0,
            background_noise_level: 0.0,
            silence_start: None,
            last_speech: None,
            recording_start: None,
            fired: false,
        }
    }

    /// Feed one loudness sample. Returns `true` when the utterance has ended:
    /// silence has held for `silence_duration`, speech was heard at least
    /// `min_speech_duration` ago, and the recording itself is at least
    /// `min_speech_duration` old.
    pub fn update(&mut self, rms: f32, timestamp: f64) -> bool {
        if self.recording_start.is_none() {
            self.recording_start = Some(timestamp);
        }

        let effective = self.effective_threshold();

        // Equal to the threshold still counts as speech.
        if rms >= effective {
            self.silence_start = None;
            self.last_speech = Some(timestamp);
            self.fired = false;
            return false;
        }

        let silence_start = *self.silence_start.get_or_insert(timestamp);
        if self.fired {
            return false;
        }

        if timestamp - silence_start < self.config.silence_duration {
            return false;
        }

        // Debounce: a short gap after speech is a pause, not the end.
        let Some(last_speech) = self.last_speech else {
            return false;
        };
        if timestamp - last_speech < self.config.min_speech_duration {
            return false;
        }

        // Never fire in the opening moments of a recording.
        if let Some(start) = self.recording_start {
            if timestamp - start < self.config.min_speech_duration {
                return false;
            }
        }

        debug!(
            "silence detected at t={timestamp:.2}s (held {:.2}s)",
            timestamp - silence_start
        );
        self.fired = true;
        true
    }

    /// Derive the noise floor from ambient samples. The lower half (by
    /// value) is averaged so that stray speech in the calibration window
    /// does not inflate the floor.
    pub fn calibrate_background_noise(&mut self, rms_samples: &[f32]) {
        if rms_samples.is_empty() {
            return;
        }

        let mut sorted = rms_samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let lower_half = &sorted[..sorted.len() / 2];
        let pool = if lower_half.is_empty() {
            &sorted[..]
        } else {
            lower_half
        };

        self.background_noise_level = pool.iter().sum::<f32>() / pool.len() as f32;
        debug!(
            "background noise calibrated: {:.4} ({} samples)",
            self.background_noise_level,
            rms_samples.len()
        );
    }

    /// Clear all per-session state. The calibrated noise floor survives;
    /// it describes the environment, not the session.
    pub fn reset(&mut self) {
        self.silence_start = None;
        self.last_speech = None;
        self.recording_start = None;
        self.fired = false;
    }

    /// The threshold currently in force: the base threshold, or the
    /// calibrated noise floor scaled by the adaptive multiplier, whichever
    /// is higher.
    pub fn effective_threshold(&self) -> f32 {
        if self.background_noise_level > 0.0 {
            self.config
                .threshold
                .max(self.background_noise_level * self.adaptive_multiplier)
        } else {
            self.config.threshold
        }
    }

    pub fn background_noise_level(&self) -> f32 {
        self.background_noise_level
    }

    pub fn config(&self) -> &SilenceConfig {
        &self.config
    }
}

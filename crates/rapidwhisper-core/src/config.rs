use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hotkey::is_valid_combo;
use crate::transcribe::Provider;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHomeDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application configuration, persisted as JSON under the config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ai_provider: Provider,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub glm_api_key: Option<String>,
    #[serde(default)]
    pub zai_api_key: Option<String>,
    #[serde(default)]
    pub custom_api_key: Option<String>,
    /// Transcription endpoint for the `custom` provider.
    #[serde(default)]
    pub custom_base_url: Option<String>,
    /// Transcription model override; falls back to the provider default.
    #[serde(default)]
    pub custom_model: Option<String>,

    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default = "default_cancel_key")]
    pub cancel_key: String,
    #[serde(default = "default_format_hotkey")]
    pub format_hotkey: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    #[serde(default = "default_silence_duration")]
    pub silence_duration: f64,
    #[serde(default = "default_min_speech_duration")]
    pub min_speech_duration: f64,

    /// When set, recordings stop only on the hotkey; the silence detector
    /// is bypassed and trailing silence is trimmed before upload instead.
    #[serde(default)]
    pub manual_stop: bool,
    #[serde(default = "default_auto_hide_delay")]
    pub auto_hide_delay: f64,
    #[serde(default)]
    pub keep_recordings: bool,
    #[serde(default)]
    pub recordings_dir: Option<PathBuf>,

    #[serde(default)]
    pub enable_post_processing: bool,
    /// Provider for the post-processing pass; defaults to `ai_provider`.
    #[serde(default)]
    pub post_processing_provider: Option<Provider>,
    #[serde(default)]
    pub post_processing_model: Option<String>,
    #[serde(default = "default_post_processing_prompt")]
    pub post_processing_prompt: String,
    /// Chat endpoint for post-processing with the `custom` provider.
    #[serde(default)]
    pub llm_base_url: Option<String>,
}

fn default_hotkey() -> String {
    "ctrl+space".to_string()
}

fn default_cancel_key() -> String {
    "esc".to_string()
}

fn default_format_hotkey() -> String {
    "ctrl+alt+space".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_chunk_size() -> usize {
    1024
}

fn default_silence_threshold() -> f32 {
    0.02
}

fn default_silence_duration() -> f64 {
    1.5
}

fn default_min_speech_duration() -> f64 {
    0.5
}

fn default_auto_hide_delay() -> f64 {
    3.0
}

fn default_post_processing_prompt() -> String {
    "Fix grammar and punctuation in the following dictated text. \
     Reply with the corrected text only."
        .to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_provider: Provider::default(),
            openai_api_key: None,
            groq_api_key: None,
            glm_api_key: None,
            zai_api_key: None,
            custom_api_key: None,
            custom_base_url: None,
            custom_model: None,
            hotkey: default_hotkey(),
            cancel_key: default_cancel_key(),
            format_hotkey: default_format_hotkey(),
            sample_rate: default_sample_rate(),
            chunk_size: default_chunk_size(),
            silence_threshold: default_silence_threshold(),
            silence_duration: default_silence_duration(),
            min_speech_duration: default_min_speech_duration(),
            manual_stop: false,
            auto_hide_delay: default_auto_hide_delay(),
            keep_recordings: false,
            recordings_dir: None,
            enable_post_processing: false,
            post_processing_provider: None,
            post_processing_model: None,
            post_processing_prompt: default_post_processing_prompt(),
            llm_base_url: None,
        }
    }
}

const SUPPORTED_SAMPLE_RATES: &[u32] = &[16000, 44100, 48000];

impl AppConfig {
    /// Clamp all numeric fields to safe ranges and validate hotkey combos.
    /// Invalid values fall back to their defaults.
    pub fn validate(&mut self) {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            warn!(
                "unsupported sample rate {}, resetting to {}",
                self.sample_rate,
                default_sample_rate()
            );
            self.sample_rate = default_sample_rate();
        }

        let chunk_ok = self.chunk_size.is_power_of_two()
            && (256..=8192).contains(&self.chunk_size);
        if !chunk_ok {
            warn!(
                "invalid chunk size {}, resetting to {}",
                self.chunk_size,
                default_chunk_size()
            );
            self.chunk_size = default_chunk_size();
        }

        self.silence_threshold = self.silence_threshold.clamp(0.01, 0.1);
        self.silence_duration = self.silence_duration.clamp(0.5, 5.0);
        self.min_speech_duration = self.min_speech_duration.clamp(0.1, self.silence_duration);
        self.auto_hide_delay = self.auto_hide_delay.clamp(0.5, 60.0);

        for (combo, fallback) in [
            (&mut self.hotkey, default_hotkey()),
            (&mut self.cancel_key, default_cancel_key()),
            (&mut self.format_hotkey, default_format_hotkey()),
        ] {
            if !is_valid_combo(combo) {
                warn!("invalid key combo '{combo}', resetting to '{fallback}'");
                *combo = fallback;
            }
        }
    }

    /// API key for a provider, preferring the config file over the
    /// conventional environment variable.
    pub fn api_key_for(&self, provider: Provider) -> Option<String> {
        let (configured, env_var) = match provider {
            Provider::OpenAi => (&self.openai_api_key, "OPENAI_API_KEY"),
            Provider::Groq => (&self.groq_api_key, "GROQ_API_KEY"),
            Provider::Glm => (&self.glm_api_key, "GLM_API_KEY"),
            Provider::Zai => (&self.zai_api_key, "ZAI_API_KEY"),
            Provider::Custom => (&self.custom_api_key, "CUSTOM_API_KEY"),
        };
        configured
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
    }

    /// Where WAV files are written: the configured directory, or
    /// `<data dir>/recordings`.
    pub fn effective_recordings_dir(&self) -> PathBuf {
        match &self.recordings_dir {
            Some(dir) => dir.clone(),
            None => recordings_dir(),
        }
    }
}

/// Returns the config directory path: ~/.config/rapidwhisper/
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::home_dir()
        .ok_or(ConfigError::NoHomeDir)?
        .join(".config/rapidwhisper"))
}

/// Returns the data directory path: ~/.local/share/rapidwhisper/
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::home_dir()
        .ok_or(ConfigError::NoHomeDir)?
        .join(".local/share/rapidwhisper"))
}

/// Returns the recordings directory path: ~/.local/share/rapidwhisper/recordings/
pub fn recordings_dir() -> PathBuf {
    match data_dir() {
        Ok(d) => d.join("recordings"),
        Err(e) => {
            warn!("failed to determine data directory: {e}, falling back to ./recordings");
            PathBuf::from("./recordings")
        }
    }
}

/// Returns the config file path: ~/.config/rapidwhisper/config.json
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json"))
}

/// Load config from disk. Missing or unparseable files yield defaults; the
/// result is always validated.
pub fn load_config() -> AppConfig {
    let path = match config_path() {
        Ok(p) => p,
        Err(e) => {
            warn!("failed to determine config path: {e}, using defaults");
            return AppConfig::default();
        }
    };

    let mut config = if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(c) => c,
                Err(e) => {
                    warn!("failed to parse config at {}: {e}", path.display());
                    AppConfig::default()
                }
            },
            Err(e) => {
                warn!("failed to read config at {}: {e}", path.display());
                AppConfig::default()
            }
        }
    } else {
        AppConfig::default()
    };

    config.validate();
    config
}

/// Save config to disk. Values are validated (clamped) before saving.
/// Sets file permissions to 0600: the file may hold API keys.
pub fn save_config(config: &AppConfig) -> Result<(), std::io::Error> {
    let mut config = config.clone();
    config.validate();
    let path = config_path().map_err(|e| std::io::Error::other(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&config).map_err(std::io::Error::other)?;
    std::fs::write(&path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

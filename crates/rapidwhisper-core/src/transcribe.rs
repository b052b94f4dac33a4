use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::RecordingFile;
use crate::state::AppEvent;
use crate::trim;

/// HTTP timeout for transcription uploads.
const TRANSCRIBE_TIMEOUT_SECS: u64 = 30;
/// HTTP timeout for LLM post-processing calls.
const LLM_TIMEOUT_SECS: u64 = 130;
/// Padding kept around audible segments when trimming, in milliseconds.
const TRIM_PADDING_MS: u32 = 100;

/// A remote speech-to-text / LLM service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Groq,
    Glm,
    Custom,
    Zai,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::Glm => "glm",
            Provider::Custom => "custom",
            Provider::Zai => "zai",
        }
    }

    /// Fixed base URL, or `None` for `custom` which must be configured.
    pub fn base_url(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("https://api.openai.com/v1"),
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::Glm => Some("https://open.bigmodel.cn/api/paas/v4"),
            Provider::Custom => None,
            Provider::Zai => Some("https://api.z.ai/api/anthropic"),
        }
    }

    /// Default transcription model; `None` when the provider has no
    /// transcription endpoint or requires an explicit model.
    pub fn default_transcription_model(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("whisper-1"),
            Provider::Groq => Some("whisper-large-v3"),
            Provider::Glm => Some("glm-4-voice"),
            Provider::Custom | Provider::Zai => None,
        }
    }

    /// Default model for the LLM post-processing pass.
    pub fn default_llm_model(self) -> Option<&'static str> {
        match self {
            Provider::Zai => Some("GLM-4.7"),
            _ => None,
        }
    }

    /// Whether the post-processing call uses the Anthropic messages shape
    /// rather than OpenAI chat completions.
    pub fn uses_anthropic_shape(self) -> bool {
        matches!(self, Provider::Zai)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),
    #[error("Invalid or missing API key for provider '{0}'")]
    InvalidApiKey(Provider),
    #[error("Authentication failed for provider '{0}'")]
    Authentication(Provider),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Response contained no text")]
    EmptyResponse,
    #[error("Provider does not support {0}")]
    NotSupported(&'static str),
    #[error("Unexpected API error: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Errors a failed post-processing pass may swallow: the transcription
    /// is still usable, only the rewrite was refused.
    pub fn is_degradable(&self) -> bool {
        matches!(self, ApiError::BadRequest(_) | ApiError::NotFound(_))
    }
}

/// HTTP client for one provider endpoint.
#[derive(Debug)]
pub struct TranscriptionClient {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    model: Option<String>,
}

impl TranscriptionClient {
    /// Build a client. `base_url` and `model` override the provider
    /// defaults; `custom` has no defaults and requires both.
    pub fn new(
        provider: Provider,
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self, ApiError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ApiError::InvalidApiKey(provider))?;

        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| provider.base_url().map(str::to_string))
            .ok_or(ApiError::MissingConfig("custom_base_url"))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Unexpected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            provider,
            api_key,
            base_url,
            model,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Effective transcription model.
    pub fn transcription_model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| self.provider.default_transcription_model().map(str::to_string))
    }

    /// Upload a WAV and return the transcribed text.
    pub async fn transcribe(&self, audio_path: &Path) -> Result<String, ApiError> {
        if self.provider == Provider::Zai {
            return Err(ApiError::NotSupported("transcription"));
        }

        let model = self
            .transcription_model()
            .ok_or(ApiError::MissingConfig("custom_model"))?;

        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| ApiError::Unexpected(format!("failed to read audio file: {e}")))?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        debug!(
            "uploading {} ({} bytes) to {} as model '{model}'",
            file_name,
            bytes.len(),
            self.base_url
        );

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| ApiError::Unexpected(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", model)
            .text("response_format", "json");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(Duration::from_secs(TRANSCRIBE_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| self.classify_transport(e, TRANSCRIBE_TIMEOUT_SECS))?;

        let body = self.check_status(response).await?;
        let text = body
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or(ApiError::EmptyResponse)?;

        info!("transcription received ({} chars)", text.chars().count());
        Ok(text.to_string())
    }

    /// Run the LLM post-processing pass over `text`. Empty model output
    /// falls back to the input unchanged.
    pub async fn post_process(&self, prompt: &str, text: &str) -> Result<String, ApiError> {
        if self.provider.uses_anthropic_shape() {
            self.post_process_anthropic(prompt, text).await
        } else {
            self.post_process_openai(prompt, text).await
        }
    }

    fn llm_model(&self) -> Result<String, ApiError> {
        self.model
            .clone()
            .or_else(|| self.provider.default_llm_model().map(str::to_string))
            .ok_or(ApiError::MissingConfig("post_processing_model"))
    }

    async fn post_process_openai(&self, prompt: &str, text: &str) -> Result<String, ApiError> {
        let model = self.llm_model()?;
        let payload = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": prompt },
                { "role": "user", "content": text },
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| self.classify_transport(e, LLM_TIMEOUT_SECS))?;

        let body = self.check_status(response).await?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .unwrap_or("");

        if content.trim().is_empty() {
            warn!("post-processing returned no content, keeping original text");
            return Ok(text.to_string());
        }
        Ok(content.trim().to_string())
    }

    async fn post_process_anthropic(&self, prompt: &str, text: &str) -> Result<String, ApiError> {
        let model = self.llm_model()?;
        let payload = serde_json::json!({
            "model": model,
            "max_tokens": 1024,
            "system": prompt,
            "messages": [
                { "role": "user", "content": text },
            ],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| self.classify_transport(e, LLM_TIMEOUT_SECS))?;

        let body = self.check_status(response).await?;
        let content = body
            .pointer("/content/0/text")
            .and_then(|c| c.as_str())
            .unwrap_or("");

        if content.trim().is_empty() {
            warn!("post-processing returned no content, keeping original text");
            return Ok(text.to_string());
        }
        Ok(content.trim().to_string())
    }

    fn classify_transport(&self, error: reqwest::Error, timeout_secs: u64) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(timeout_secs)
        } else if error.is_connect() {
            ApiError::Connection(error.to_string())
        } else {
            ApiError::Network(error.to_string())
        }
    }

    /// Map non-success statuses onto the error taxonomy and parse the body
    /// of successful responses as JSON.
    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ApiError::Unexpected(format!("invalid JSON response: {e}")));
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);

        Err(match status.as_u16() {
            401 | 403 => ApiError::Authentication(self.provider),
            429 => ApiError::RateLimit { retry_after },
            404 => ApiError::NotFound(detail),
            400 => ApiError::BadRequest(detail),
            _ => ApiError::Unexpected(format!("{status}: {detail}")),
        })
    }
}

/// Pull the human-readable message out of an API error body, falling back
/// to the raw (truncated) body.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for pointer in ["/error/message", "/message", "/error"] {
            if let Some(message) = value.pointer(pointer).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }
    let mut detail = body.trim().to_string();
    if detail.len() > 200 {
        detail.truncate(200);
    }
    detail
}

/// Everything one transcription worker needs, snapshotted at spawn so later
/// config edits cannot race a running session.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Manual-stop mode: trim trailing silence before upload.
    pub trim_silence: bool,
    pub silence_threshold: f32,
    pub keep_recordings: bool,
    pub post_processing: Option<PostProcessingConfig>,
}

#[derive(Debug, Clone)]
pub struct PostProcessingConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub prompt: String,
}

/// The result of one successful worker run.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub text: String,
    /// Duration of the uploaded audio, after any trimming.
    pub audio_duration_seconds: f64,
    pub character_count: u64,
    pub word_count: u64,
    /// Seconds of silence removed before upload, 0 when trimming was off.
    pub removed_silence_seconds: f64,
    /// Set when post-processing failed non-fatally and the raw
    /// transcription was kept; carries the reason for a notification.
    pub post_processing_degraded: Option<String>,
}

/// Spawn the transcription worker for one session. The worker trims,
/// uploads, post-processes, reports back through the event queue, and
/// deletes the WAV unless retention is configured.
pub fn spawn_worker(
    session_id: Uuid,
    recording: RecordingFile,
    config: WorkerConfig,
    events: Sender<AppEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_worker(session_id, recording, config, events.clone());
        }));
        if result.is_err() {
            let _ = events.send(AppEvent::TranscriptionError {
                session_id,
                error: ApiError::Unexpected("transcription worker panicked".to_string()),
            });
        }
    })
}

fn run_worker(
    session_id: Uuid,
    recording: RecordingFile,
    config: WorkerConfig,
    events: Sender<AppEvent>,
) {
    let path: PathBuf = recording.path.clone();
    let keep = config.keep_recordings;

    match transcribe_recording(&recording, &config) {
        Ok(outcome) => {
            let _ = events.send(AppEvent::TranscriptionComplete {
                session_id,
                outcome,
            });
        }
        Err(error) => {
            warn!("transcription failed: {error}");
            let _ = events.send(AppEvent::TranscriptionError { session_id, error });
        }
    }

    if keep {
        debug!("keeping recording at {}", path.display());
    } else if let Err(e) = std::fs::remove_file(&path) {
        warn!("failed to delete recording {}: {e}", path.display());
    }
}

fn transcribe_recording(
    recording: &RecordingFile,
    config: &WorkerConfig,
) -> Result<TranscriptionOutcome, ApiError> {
    let mut audio_duration = recording.duration_seconds;

    // Manual-stop recordings carry the silence the user left before
    // releasing the hotkey; strip it before paying for upload and tokens.
    let removed_silence = if config.trim_silence {
        match trim::trim_silence(&recording.path, config.silence_threshold, TRIM_PADDING_MS) {
            Ok((_, removed)) => {
                audio_duration = (audio_duration - removed).max(0.0);
                removed
            }
            Err(e) => {
                warn!("silence trim failed, uploading as recorded: {e}");
                0.0
            }
        }
    } else {
        0.0
    };

    let client = TranscriptionClient::new(
        config.provider,
        config.api_key.clone(),
        config.base_url.clone(),
        config.model.clone(),
    )?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ApiError::Unexpected(format!("failed to create runtime: {e}")))?;

    runtime.block_on(async {
        let text = client.transcribe(&recording.path).await?;

        let (text, degraded) = match &config.post_processing {
            Some(pp) => post_process_text(pp, &text).await?,
            None => (text, None),
        };

        Ok(TranscriptionOutcome {
            character_count: text.chars().count() as u64,
            word_count: text.split_whitespace().count() as u64,
            text,
            audio_duration_seconds: audio_duration,
            removed_silence_seconds: removed_silence,
            post_processing_degraded: degraded,
        })
    })
}

/// Apply the LLM pass. `BadRequest` and `NotFound` (an unknown model)
/// degrade gracefully: the raw transcription is returned together with a
/// reason for the user notification. Everything else propagates.
async fn post_process_text(
    config: &PostProcessingConfig,
    text: &str,
) -> Result<(String, Option<String>), ApiError> {
    let client = TranscriptionClient::new(
        config.provider,
        config.api_key.clone(),
        config.base_url.clone(),
        config.model.clone(),
    )?;

    match client.post_process(&config.prompt, text).await {
        Ok(processed) => Ok((processed, None)),
        Err(e) if e.is_degradable() => {
            warn!("post-processing degraded, keeping raw transcription: {e}");
            Ok((text.to_string(), Some(e.to_string())))
        }
        Err(e) => Err(e),
    }
}

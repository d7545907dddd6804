use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DubError, Result};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Upper bounds accepted for the retry section
pub const MAX_RETRIES: u32 = 10;
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional translator for video dubbing. \
Translate the user's text into the requested language. \
Reply with the translated text only: no commentary, no preamble, no notes and no quotation marks.";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub synthesize: SynthesizeConfig,
    pub media: MediaConfig,
    pub storage: StorageConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Base URL of the OpenAI compatible API
    pub base_url: String,
    /// API key; falls back to the OPENAI_API_KEY environment variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Speech-to-text model
    pub model: String,
    /// `verbose_json` reports the detected language, `json` does not
    pub response_format: String,
    /// Optional source language hint (ISO-639-1)
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Chat model used for translation
    pub model: String,
    /// Fixed system instruction constraining the reply to the translation
    pub system_prompt: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizeConfig {
    /// Text-to-speech model
    pub model: String,
    /// Voice used when the caller does not pick one
    pub voice: String,
    /// Audio format requested from the service, also used as file extension
    pub response_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Codec the dubbed audio track is encoded into
    pub audio_codec: String,
    /// Additional options appended to the mux command
    /// e.g. ["-b:a", "192k"] or ["-movflags", "+faststart"]
    pub mux_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where uploaded sources are persisted, one directory per job
    pub upload_dir: PathBuf,
    /// Where intermediate artifacts live, one directory per job
    pub work_dir: PathBuf,
    /// Where dubbed videos are published, one directory per job
    pub output_dir: PathBuf,
}

/// Per-stage timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub extraction_secs: u64,
    pub transcription_secs: u64,
    pub translation_secs: u64,
    pub synthesis_secs: u64,
    pub mux_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first transport failure
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Upper bound on jobs running at once in batch mode
    pub max_concurrent: usize,
    /// Keep extracted and synthesized audio after a job terminates
    pub keep_intermediates: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            response_format: "verbose_json".to_string(),
            language: None,
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.2,
        }
    }
}

impl Default for SynthesizeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-tts".to_string(),
            voice: "alloy".to_string(),
            response_format: "mp3".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            audio_codec: "aac".to_string(),
            mux_options: vec![],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("static/output"),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extraction_secs: 60,
            transcription_secs: 120,
            translation_secs: 60,
            synthesis_secs: 120,
            mux_secs: 120,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            backoff_multiplier: 3.0,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            keep_intermediates: false,
        }
    }
}

impl TimeoutConfig {
    pub fn extraction(&self) -> Duration {
        Duration::from_secs(self.extraction_secs)
    }

    pub fn transcription(&self) -> Duration {
        Duration::from_secs(self.transcription_secs)
    }

    pub fn translation(&self) -> Duration {
        Duration::from_secs(self.translation_secs)
    }

    pub fn synthesis(&self) -> Duration {
        Duration::from_secs(self.synthesis_secs)
    }

    pub fn mux(&self) -> Duration {
        Duration::from_secs(self.mux_secs)
    }
}

impl OpenAiConfig {
    /// Resolve the API key from the file or the environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DubError::Config(format!(
                    "No API key configured: set openai.api_key or {}",
                    API_KEY_ENV
                ))
            })
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| DubError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.media.binary_path.trim().is_empty() {
            return Err(DubError::Config("media.binary_path must not be empty".to_string()));
        }
        let t = &self.timeouts;
        if [t.extraction_secs, t.transcription_secs, t.translation_secs, t.synthesis_secs, t.mux_secs]
            .contains(&0)
        {
            return Err(DubError::Config("stage timeouts must be greater than zero".to_string()));
        }
        if self.retry.max_retries > MAX_RETRIES {
            return Err(DubError::Config(format!("retry.max_retries must be at most {}", MAX_RETRIES)));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 || multiplier > MAX_BACKOFF_MULTIPLIER {
            return Err(DubError::Config(format!(
                "retry.backoff_multiplier must be in (0, {}]",
                MAX_BACKOFF_MULTIPLIER
            )));
        }
        if self.jobs.max_concurrent == 0 {
            return Err(DubError::Config("jobs.max_concurrent must be at least 1".to_string()));
        }
        Ok(())
    }
}

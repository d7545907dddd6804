// Speech-to-text
//
// To add another transcription service implement Transcriber for it and
// extend TranscriberFactory. Implementations must treat an empty result
// (silence) as success, and report missing fields as Malformed.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::config::TranscriberConfig;
use crate::error::ServiceError;
use crate::openai::OpenAiClient;

/// Recognized speech
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Source language as reported by the service, if it reports one
    pub language: Option<String>,
}

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file to text
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, ServiceError>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_transcriber(client: OpenAiClient, config: TranscriberConfig) -> Arc<dyn Transcriber> {
        Arc::new(openai::OpenAiTranscriber::new(client, config))
    }
}

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::{Transcriber, Transcript};
use crate::config::TranscriberConfig;
use crate::error::ServiceError;
use crate::openai::OpenAiClient;

/// Body of `/audio/transcriptions` for the json family of formats
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// OpenAI `/audio/transcriptions` binding
pub struct OpenAiTranscriber {
    client: OpenAiClient,
    config: TranscriberConfig,
}

impl OpenAiTranscriber {
    pub fn new(client: OpenAiClient, config: TranscriberConfig) -> Self {
        Self { client, config }
    }

    fn parse_response(body: &str) -> Result<Transcript, ServiceError> {
        let parsed: TranscriptionResponse = serde_json::from_str(body)
            .map_err(|e| ServiceError::Malformed(format!("transcription body is not JSON: {}", e)))?;

        let text = parsed
            .text
            .ok_or_else(|| ServiceError::Malformed("transcription response has no text field".to_string()))?;

        Ok(Transcript {
            text: text.trim().to_string(),
            language: parsed.language.filter(|l| !l.trim().is_empty()),
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, ServiceError> {
        info!("Starting transcription of: {}", audio_path.display());

        let audio = tokio::fs::read(audio_path).await?;
        if audio.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "audio file is empty: {}",
                audio_path.display()
            )));
        }

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| ServiceError::InvalidInput(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", self.config.response_format.clone())
            .part("file", file_part);

        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        debug!("Sending audio to transcription model {}", self.config.model);

        let response = self
            .client
            .send(self.client.post("audio/transcriptions").multipart(form))
            .await?;
        let body = response.text().await?;

        let transcript = if self.config.response_format == "text" {
            Transcript {
                text: body.trim().to_string(),
                language: None,
            }
        } else {
            Self::parse_response(&body)?
        };
        info!(
            "Transcription completed: {} chars, language {}",
            transcript.text.len(),
            transcript.language.as_deref().unwrap_or("unknown")
        );
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbose_response() {
        let transcript = OpenAiTranscriber::parse_response(
            r#"{"task":"transcribe","language":"english","duration":5.0,"text":" Hello there. ","segments":[]}"#,
        )
        .unwrap();
        assert_eq!(transcript.text, "Hello there.");
        assert_eq!(transcript.language.as_deref(), Some("english"));
    }

    #[test]
    fn test_empty_text_is_valid() {
        let transcript = OpenAiTranscriber::parse_response(r#"{"text":""}"#).unwrap();
        assert_eq!(transcript.text, "");
        assert_eq!(transcript.language, None);
    }

    #[test]
    fn test_missing_text_is_malformed() {
        assert!(matches!(
            OpenAiTranscriber::parse_response(r#"{"language":"en"}"#),
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            OpenAiTranscriber::parse_response("Hello there"),
            Err(ServiceError::Malformed(_))
        ));
    }
}

use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::Synthesizer;
use crate::config::SynthesizeConfig;
use crate::error::ServiceError;
use crate::openai::OpenAiClient;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI `/audio/speech` binding
pub struct OpenAiSynthesizer {
    client: OpenAiClient,
    config: SynthesizeConfig,
}

impl OpenAiSynthesizer {
    pub fn new(client: OpenAiClient, config: SynthesizeConfig) -> Self {
        Self { client, config }
    }
}

/// Write `bytes` next to `path` and rename into place, so a reader never
/// sees a half-written file.
pub(crate) async fn write_atomically(path: &Path, bytes: Vec<u8>) -> Result<(), ServiceError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ServiceError::Io(std::io::Error::other(e)))??;
    Ok(())
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, output_path: &Path) -> Result<PathBuf, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidInput("refusing to synthesize empty text".to_string()));
        }

        info!("Synthesizing {} chars with voice {}", text.len(), voice);

        let request = SpeechRequest {
            model: &self.config.model,
            voice,
            input: text,
            response_format: &self.config.response_format,
        };

        let response = self
            .client
            .send(self.client.post("audio/speech").json(&request))
            .await?;
        let audio = response.bytes().await?;

        if audio.is_empty() {
            return Err(ServiceError::Malformed("speech service returned no audio".to_string()));
        }

        write_atomically(output_path, audio.to_vec()).await?;

        info!("Wrote {} bytes of speech to {}", audio.len(), output_path.display());
        Ok(output_path.to_path_buf())
    }

    fn file_extension(&self) -> String {
        self.config.response_format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomically_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job").join("speech_Spanish.mp3");

        write_atomically(&path, vec![1, 2, 3]).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_request() {
        let client = OpenAiClient::new("http://127.0.0.1:9", "sk-test").unwrap();
        let synth = OpenAiSynthesizer::new(client, SynthesizeConfig::default());
        let dir = tempfile::tempdir().unwrap();

        let result = synth.synthesize("  ", "alloy", &dir.path().join("x.mp3")).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}

// Text-to-speech

pub mod openai;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SynthesizeConfig;
use crate::error::ServiceError;
use crate::openai::OpenAiClient;

/// Main trait for speech synthesis
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` with `voice` and write the audio to `output_path`
    async fn synthesize(&self, text: &str, voice: &str, output_path: &Path) -> Result<PathBuf, ServiceError>;

    /// Extension of the files this synthesizer writes
    fn file_extension(&self) -> String;
}

/// Factory for creating synthesizer instances
pub struct SynthesizerFactory;

impl SynthesizerFactory {
    pub fn create_synthesizer(client: OpenAiClient, config: SynthesizeConfig) -> Arc<dyn Synthesizer> {
        Arc::new(openai::OpenAiSynthesizer::new(client, config))
    }
}

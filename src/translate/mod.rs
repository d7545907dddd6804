// Text translation through a chat model
//
// - Clean: validation of untrusted model replies
// - OpenAI: chat-completions binding with a fixed system instruction

pub mod clean;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;

pub use clean::clean_translation;
use crate::config::TranslateConfig;
use crate::error::ServiceError;
use crate::openai::OpenAiClient;

/// Main trait for translation operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_language`, returning only the translation
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ServiceError>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_translator(client: OpenAiClient, config: TranslateConfig) -> Arc<dyn Translator> {
        Arc::new(openai::OpenAiTranslator::new(client, config))
    }
}

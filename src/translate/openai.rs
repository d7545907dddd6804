use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Translator, clean_translation};
use crate::config::TranslateConfig;
use crate::error::ServiceError;
use crate::openai::OpenAiClient;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI `/chat/completions` binding
pub struct OpenAiTranslator {
    client: OpenAiClient,
    config: TranslateConfig,
}

impl OpenAiTranslator {
    pub fn new(client: OpenAiClient, config: TranslateConfig) -> Self {
        Self { client, config }
    }

    fn build_user_prompt(text: &str, target_language: &str) -> String {
        format!("Translate this to {}:\n\n{}", target_language, text)
    }

    /// Pull the reply text out of a completion and clean it.
    ///
    /// The reply shape is not trusted: a missing choice, message or content
    /// is malformed, and so is a reply that is empty once cleaned.
    fn extract_translation(body: &str) -> Result<String, ServiceError> {
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| ServiceError::Malformed(format!("completion body is not valid JSON: {}", e)))?;

        let raw = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| ServiceError::Malformed("completion has no message content".to_string()))?;

        debug!("Raw translation response: {}", raw);

        let cleaned = clean_translation(&raw);
        if cleaned.is_empty() {
            return Err(ServiceError::Malformed("translation is empty".to_string()));
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            debug!("Nothing to translate, skipping the translation service");
            return Ok(String::new());
        }

        info!("Translating {} chars to {}", text.len(), target_language);

        let user_prompt = Self::build_user_prompt(text, target_language);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .send(self.client.post("chat/completions").json(&request))
            .await?;
        let body = response.text().await?;

        match Self::extract_translation(&body) {
            Ok(translation) => {
                info!("Translation completed: {} chars", translation.len());
                Ok(translation)
            }
            Err(e) => {
                warn!("Rejected translation response: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_and_cleans_content() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"\"Hola, mundo\"\n"}}]}"#;
        assert_eq!(OpenAiTranslator::extract_translation(body).unwrap(), "Hola, mundo");
    }

    #[test]
    fn test_missing_content_is_malformed() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"finish_reason":"content_filter"}]}"#,
            r#"{"error":"nope"}"#,
            "not json",
        ] {
            assert!(
                matches!(OpenAiTranslator::extract_translation(body), Err(ServiceError::Malformed(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_blank_reply_is_malformed() {
        let body = r#"{"choices":[{"message":{"content":"  \"\"  "}}]}"#;
        assert!(matches!(
            OpenAiTranslator::extract_translation(body),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[test]
    fn test_prompt_names_target_language() {
        let prompt = OpenAiTranslator::build_user_prompt("Hello", "Telugu");
        assert!(prompt.starts_with("Translate this to Telugu:"));
        assert!(prompt.ends_with("Hello"));
    }
}

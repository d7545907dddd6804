use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::{DubError, Result, ServiceError};

/// Authenticated handle on an OpenAI compatible API.
///
/// Cheap to clone; all clones share one connection pool. No client-wide
/// timeout is set, each stage applies its own.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new<S1: Into<String>, S2: Into<String>>(base_url: S1, api_key: S2) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("dubber/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DubError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        Self::new(&config.base_url, config.resolve_api_key()?)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST to `path` with bearer authentication
    pub fn post(&self, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("Sending request to: {}", url);
        self.client.post(url).bearer_auth(&self.api_key)
    }

    /// Send a request, turning non-success statuses into classified errors
    pub async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, ServiceError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = OpenAiClient::new("http://localhost:8080/v1/", "sk-test").unwrap();
        assert_eq!(client.url("/audio/speech"), "http://localhost:8080/v1/audio/speech");
        assert_eq!(client.url("chat/completions"), "http://localhost:8080/v1/chat/completions");
    }
}

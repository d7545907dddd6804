use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Job id submitted more than once: {0}")]
    DuplicateJobId(String),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

pub type Result<T> = std::result::Result<T, DubError>;

/// Failure reported by a stage adapter (remote service or local process).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("service unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("process failed: {0}")]
    Process(String),

    #[error("source has no audio stream")]
    NoAudioStream,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Transport-class failures are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_) | ServiceError::Timeout(_) | ServiceError::Unavailable { .. }
        )
    }

    /// Map a non-success HTTP status and body onto the failure classes.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => ServiceError::Auth(format!("{}: {}", status, body)),
            408 | 429 => ServiceError::Unavailable { status: code, body },
            _ if status.is_server_error() => ServiceError::Unavailable { status: code, body },
            _ => ServiceError::Rejected { status: code, body },
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Transport(format!("request timed out: {}", e))
        } else if e.is_decode() {
            ServiceError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ServiceError::from_status(status, e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(ServiceError::from_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(ServiceError::from_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(ServiceError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(matches!(
            ServiceError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            ServiceError::Auth(_)
        ));
        assert!(!ServiceError::from_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn test_non_transport_failures_are_not_transient() {
        assert!(!ServiceError::Malformed("missing text".into()).is_transient());
        assert!(!ServiceError::NoAudioStream.is_transient());
        assert!(!ServiceError::Process("exit 1".into()).is_transient());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
    }
}

//! Error type shared by collaborators and pipeline stages.
//!
//! Stages decide locally whether an error degrades into a fallback value or
//! is handed back to the caller; this type only describes what went wrong.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} error: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    #[error("Model returned no completion content")]
    EmptyCompletion,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl PipelineError {
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Service {
            service,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = PipelineError::Status {
            service: "newsapi",
            status: 401,
            body: "bad key".to_string(),
        };
        assert_eq!(err.to_string(), "newsapi returned HTTP 401: bad key");
    }

    #[test]
    fn test_service_helper() {
        let err = PipelineError::service("serpapi", "quota exhausted");
        assert_eq!(err.to_string(), "serpapi error: quota exhausted");
    }
}

use openai_api_rs::v1::error::APIError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("API key authentication failed: {0}")]
    Authentication(String),

    #[error("Chat completion failed: {0}")]
    Completion(String),

    #[error("Failed to send HTTP request: {0}")]
    Http(String),

    #[error("Failed to access OpenAI API: {0}")]
    OpenAI(String),
}

impl RelayError {
    /// HTTP status reported to the caller for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Configuration(_) => 400,
            RelayError::Authentication(_)
            | RelayError::Completion(_)
            | RelayError::Http(_)
            | RelayError::OpenAI(_) => 500,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        RelayError::Http(error.to_string())
    }
}

impl From<APIError> for RelayError {
    fn from(error: APIError) -> Self {
        RelayError::OpenAI(format!("OpenAI API error: {error}"))
    }
}

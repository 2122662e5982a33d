//! Provider error types

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider rejected credentials ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("provider rejected the request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("generation stopped: {0}")]
    Blocked(String),

    #[error("{0}")]
    Stream(String),

    #[error("provider stream ended without reporting completion")]
    Incomplete,
}

impl ProviderError {
    /// Map a non-success HTTP status and its message to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Unauthorized { status, message },
            400 | 404 | 413 | 422 => ProviderError::BadRequest { status, message },
            _ => ProviderError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

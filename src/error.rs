//! Error types for the chat session client.

/// Top-level error type for the chat session client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network transport failure or non-success HTTP status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body was not in any recognised shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Durable identity storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns `true` for transport and parse failures, as opposed to local
    /// configuration and storage problems.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Parse(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ClientError>;

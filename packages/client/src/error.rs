//! Error types for the chat client.

use parlor_shared::{ValidationError, message::EnvelopeError};
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Username rejected before connecting
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] ValidationError),

    /// The server answered with something other than what the protocol expects
    #[error("unexpected {0} message from server")]
    UnexpectedMessage(&'static str),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl From<EnvelopeError> for ClientError {
    fn from(e: EnvelopeError) -> Self {
        ClientError::ConnectionError(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::ConnectionError(e.to_string())
    }
}

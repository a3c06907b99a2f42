//! Error types shared by the server and the client.

use std::io;

use thiserror::Error;

/// Failure while reading or writing a length-prefixed frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream cleanly on a frame boundary.
    #[error("connection closed by peer")]
    Closed,

    /// The peer closed the stream in the middle of a frame.
    #[error("connection closed mid-frame: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    /// The declared payload length exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: u64, max: u64 },

    /// Transport failure (reset, broken pipe, ...).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The payload of a frame could not be turned into (or from) an envelope.
#[derive(Debug, Error)]
#[error("malformed payload: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Username rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("username must not be empty")]
    Empty,

    #[error("username must be at most {max} characters")]
    TooLong { max: usize },

    #[error("username contains invalid character {0:?}")]
    InvalidChar(char),
}

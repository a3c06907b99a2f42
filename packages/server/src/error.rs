//! Error types for the relay server.

use std::{io, time::Duration};

use parlor_shared::{
    CodecError, FrameError, ValidationError,
    message::EnvelopeError,
};
use thiserror::Error;

/// Why a single session ended abnormally.
///
/// These never escape the session that produced them; the acceptor logs them
/// and keeps running.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket failure, including resets and a peer vanishing mid-frame.
    #[error("I/O error: {0}")]
    Io(#[source] FrameError),

    /// A frame that cannot be trusted (e.g. an absurd length prefix).
    #[error("framing error: {0}")]
    Framing(#[source] FrameError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Wrong message kind for the current state.
    #[error("protocol violation: expected {expected}, got {got}")]
    Protocol {
        expected: &'static str,
        got: &'static str,
    },

    #[error("invalid username: {0}")]
    Validation(#[from] ValidationError),

    #[error("no join message within {0:?}")]
    JoinTimeout(Duration),
}

impl From<EnvelopeError> for SessionError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Frame(e @ FrameError::TooLarge { .. }) => SessionError::Framing(e),
            EnvelopeError::Frame(e) => SessionError::Io(e),
            EnvelopeError::Codec(e) => SessionError::Codec(e),
        }
    }
}

/// Server-level failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created. Fatal.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

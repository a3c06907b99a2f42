//! Message envelope exchanged between client and server.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::{CodecError, FrameError},
    frame::{read_frame, write_frame},
};

/// One unit of chat protocol traffic.
///
/// | Kind            | Direction        |
/// |-----------------|------------------|
/// | `Join`          | client -> server |
/// | `NewChat`       | both             |
/// | `Leave`         | client -> server |
/// | `StartingState` | server -> client |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// First message on a new connection.
    Join { name: String },
    /// Client-authored text inbound; formatted log entry outbound.
    NewChat { text: String },
    /// Voluntary disconnect.
    Leave,
    /// Chat log snapshot sent once right after a successful join.
    StartingState { history: Vec<String> },
}

impl Envelope {
    /// Short label for logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Join { .. } => "join",
            Envelope::NewChat { .. } => "new-chat",
            Envelope::Leave => "leave",
            Envelope::StartingState { .. } => "starting-state",
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Failure reading or writing a whole envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl EnvelopeError {
    /// `true` when the peer simply went away on a frame boundary.
    pub fn is_closed(&self) -> bool {
        matches!(self, EnvelopeError::Frame(FrameError::Closed))
    }
}

/// Read one frame and deserialize it.
pub async fn read_envelope<R>(reader: &mut R, max_len: u64) -> Result<Envelope, EnvelopeError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(reader, max_len).await?;
    Ok(Envelope::from_payload(&payload)?)
}

/// Serialize `envelope` and write it as one frame.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), EnvelopeError>
where
    W: AsyncWrite + Unpin,
{
    let payload = envelope.to_payload()?;
    write_frame(writer, &payload).await?;
    Ok(())
}

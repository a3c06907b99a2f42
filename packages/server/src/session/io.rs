//! Socket-facing loops of a session.
//!
//! Each loop owns one half of the connection. Both exit when the session's
//! cancellation token fires; the writer does so without draining its queue.

use parlor_shared::{
    Envelope,
    message::{EnvelopeError, read_envelope, write_envelope},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Event reported by the I/O loops to the controller.
#[derive(Debug)]
pub enum SessionEvent {
    /// A decoded envelope from the client.
    Inbound(Envelope),
    /// The reader hit a terminal error and exited.
    ReadFailed(EnvelopeError),
    /// The writer hit a terminal error and exited.
    WriteFailed(EnvelopeError),
}

/// Decode envelopes from `reader` and forward them to the controller.
///
/// The first decode failure is reported and ends the loop: after a bad frame the
/// stream position is no longer trustworthy.
pub async fn reader_loop<R>(
    mut reader: R,
    events: mpsc::Sender<SessionEvent>,
    stop: CancellationToken,
    max_frame_len: u64,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            _ = stop.cancelled() => return,
            result = read_envelope(&mut reader, max_frame_len) => result,
        };

        let event = match result {
            Ok(envelope) => {
                tracing::debug!("Received {} frame", envelope.kind());
                SessionEvent::Inbound(envelope)
            }
            Err(e) => SessionEvent::ReadFailed(e),
        };
        let terminal = matches!(event, SessionEvent::ReadFailed(_));

        tokio::select! {
            _ = stop.cancelled() => return,
            sent = events.send(event) => {
                if sent.is_err() {
                    return;
                }
            }
        }

        if terminal {
            return;
        }
    }
}

/// Drain the outbound queue onto `writer` until stopped.
///
/// The stop signal wins over pending messages; anything still queued is
/// dropped. The write half is shut down on exit.
pub async fn writer_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Envelope>,
    events: mpsc::Sender<SessionEvent>,
    stop: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let envelope = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = outbound.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = write_envelope(&mut writer, &envelope) => result,
        };

        if let Err(e) = result {
            tracing::debug!("Failed to write {} frame: {}", envelope.kind(), e);
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = events.send(SessionEvent::WriteFailed(e)) => {}
            }
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Failed to shut down write half: {}", e);
    }
}

//! Per-client state machine.
//!
//! ```text
//! Connecting --Join(valid)--> Joined --Leave / I/O error / eviction--> Closing --> Closed
//!     |                                                                  ^
//!     +---------- wrong kind / bad name / timeout / I/O error -----------+
//! ```
//!
//! A connection that fails in `Connecting` never touches the hub. Once
//! `Joined`, the controller is the only task that consumes session events, so
//! the first terminal event wins and cleanup runs exactly once no matter how
//! many loops report failure.

use std::{sync::Arc, time::Duration};

use parlor_shared::{
    Envelope, Username,
    frame::DEFAULT_MAX_FRAME_LEN,
    message::read_envelope,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::ClientId,
    error::SessionError,
    hub::{Hub, SessionHandle},
};

use super::io::{SessionEvent, reader_loop, writer_loop};

/// Buffer between the I/O loops and the controller.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Lifecycle of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Closing,
    Closed,
}

/// Per-session limits taken from the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Bound of the outbound queue; overflowing it gets the session evicted.
    pub queue_capacity: usize,
    pub max_frame_len: u64,
    /// How long a fresh connection may take to send its `Join`.
    pub join_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives one connection from handshake to teardown.
pub struct SessionController {
    hub: Arc<Hub>,
    limits: SessionLimits,
    peer: String,
    state: SessionState,
}

impl SessionController {
    /// # Arguments
    ///
    /// * `hub` - Shared room state
    /// * `limits` - Queue, frame and handshake limits
    /// * `peer` - Label for logs (usually the remote address)
    pub fn new(hub: Arc<Hub>, limits: SessionLimits, peer: impl Into<String>) -> Self {
        Self {
            hub,
            limits,
            peer: peer.into(),
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session over `stream` until it is closed.
    ///
    /// Returns `Ok(())` for a voluntary leave, a clean disconnect or an eviction
    /// by the hub; any other ending is reported as the error that caused it.
    pub async fn run<S>(&mut self, stream: S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);

        let name = match self.handshake(&mut reader).await {
            Ok(name) => name,
            Err(e) => {
                // Dropping both halves closes the connection.
                self.state = SessionState::Closing;
                tracing::debug!("Rejecting connection from {}: {}", self.peer, e);
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        self.serve(name, reader, writer).await
    }

    /// `Connecting`: exactly one message, which must be a valid `Join`.
    async fn handshake<R>(&mut self, reader: &mut R) -> Result<Username, SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let first = timeout(
            self.limits.join_timeout,
            read_envelope(reader, self.limits.max_frame_len),
        )
        .await
        .map_err(|_| SessionError::JoinTimeout(self.limits.join_timeout))??;

        match first {
            Envelope::Join { name } => Ok(Username::parse(name)?),
            other => Err(SessionError::Protocol {
                expected: "join",
                got: other.kind(),
            }),
        }
    }

    /// `Joined`: admit to the hub, start the loops, relay events.
    async fn serve<R, W>(&mut self, name: Username, reader: R, writer: W) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.limits.queue_capacity.max(1));
        let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let stop = CancellationToken::new();

        let id = self
            .hub
            .join(SessionHandle::new(name.clone(), outbound_tx, stop.clone()))
            .await;
        self.state = SessionState::Joined;
        tracing::info!("'{}' joined as {} from {}", name, id, self.peer);

        let reader_task = tokio::spawn(reader_loop(
            reader,
            events_tx.clone(),
            stop.clone(),
            self.limits.max_frame_len,
        ));
        let writer_task = tokio::spawn(writer_loop(writer, outbound_rx, events_tx, stop.clone()));

        let outcome = loop {
            let event = tokio::select! {
                _ = stop.cancelled() => {
                    tracing::info!("'{}' ({}) was disconnected by the hub", name, id);
                    break Ok(());
                }
                event = events_rx.recv() => event,
            };

            match event {
                Some(SessionEvent::Inbound(Envelope::NewChat { text })) => {
                    if self.hub.append_chat(id, &text).await.is_none() {
                        tracing::debug!("Dropped chat from {}: no longer registered", id);
                    }
                }
                Some(SessionEvent::Inbound(Envelope::Leave)) => {
                    tracing::info!("'{}' ({}) left voluntarily", name, id);
                    break Ok(());
                }
                Some(SessionEvent::Inbound(other)) => {
                    break Err(SessionError::Protocol {
                        expected: "new-chat or leave",
                        got: other.kind(),
                    });
                }
                Some(SessionEvent::ReadFailed(e)) if e.is_closed() => {
                    tracing::info!("'{}' ({}) disconnected", name, id);
                    break Ok(());
                }
                Some(SessionEvent::ReadFailed(e)) | Some(SessionEvent::WriteFailed(e)) => {
                    break Err(e.into());
                }
                None => break Ok(()),
            }
        };

        drop(events_rx);
        self.close(id, &stop, reader_task, writer_task).await;
        outcome
    }

    /// `Closing`: deregister, stop the loops, wait for them. Runs once.
    async fn close(
        &mut self,
        id: ClientId,
        stop: &CancellationToken,
        reader_task: JoinHandle<()>,
        writer_task: JoinHandle<()>,
    ) {
        if self.state != SessionState::Joined {
            return;
        }
        self.state = SessionState::Closing;

        self.hub.deregister(id).await;
        stop.cancel();

        for (label, task) in [("reader", reader_task), ("writer", writer_task)] {
            if let Err(e) = task.await {
                tracing::warn!("{} loop of {} ended abnormally: {}", label, id, e);
            }
        }

        self.state = SessionState::Closed;
    }
}

//! Acceptor: binds the listener and spawns one controller per connection.

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::net::{TcpListener, TcpStream};

use crate::{
    config::ServerConfig,
    error::ServerError,
    hub::Hub,
    session::{SessionController, SessionLimits},
    signal::shutdown_signal,
    status,
};

/// Pause after an accept failure that is not tied to a single connection.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP chat relay server.
///
/// # Example
///
/// ```ignore
/// let server = Server::bind(ServerConfig::default()).await?;
/// server.run_until_ctrl_c().await?;
/// ```
pub struct Server {
    listener: TcpListener,
    status_listener: Option<TcpListener>,
    hub: Arc<Hub>,
    limits: SessionLimits,
}

impl Server {
    /// Bind the chat listener (and the status listener, if configured).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if either listening socket cannot be created.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_hub(config, Arc::new(Hub::default())).await
    }

    /// Same as [`Server::bind`] with a caller-provided hub.
    pub async fn bind_with_hub(config: ServerConfig, hub: Arc<Hub>) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let status_listener = match config.status_addr {
            Some(status_addr) => Some(TcpListener::bind(status_addr).await.map_err(|source| {
                ServerError::Bind {
                    addr: status_addr.to_string(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(Self {
            listener,
            status_listener,
            hub,
            limits: config.session_limits(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address of the HTTP status endpoint, when enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status_listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Accept failures are logged and the loop keeps going. Sessions that are
    /// already running are not interrupted.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            status_listener,
            hub,
            limits,
        } = self;

        tracing::info!("Chat relay listening on {}", listener.local_addr()?);

        let status_task = status_listener.map(|status_listener| {
            if let Ok(addr) = status_listener.local_addr() {
                tracing::info!("Status endpoint listening on http://{}", addr);
            }
            let hub = hub.clone();
            tokio::spawn(async move {
                if let Err(e) = status::serve(status_listener, hub).await {
                    tracing::error!("Status endpoint failed: {}", e);
                }
            })
        });

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => spawn_session(stream, peer, &hub, limits),
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        if let Some(backoff) = accept_error_backoff(&e) {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                },
            }
        }

        if let Some(task) = status_task {
            task.abort();
        }
        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Accept connections until Ctrl+C / SIGTERM.
    pub async fn run_until_ctrl_c(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }
}

/// Hand the connection to its own task so a silent client cannot stall accepts.
fn spawn_session(stream: TcpStream, peer: SocketAddr, hub: &Arc<Hub>, limits: SessionLimits) {
    tracing::debug!("Accepted connection from {}", peer);
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }

    let hub = hub.clone();
    tokio::spawn(async move {
        let mut controller = SessionController::new(hub, limits, peer.to_string());
        if let Err(e) = controller.run(stream).await {
            tracing::warn!("Session with {} ended with error: {}", peer, e);
        }
    });
}

/// How long to wait before accepting again after `error`.
///
/// Errors about one aborted handshake are retried at once. Anything else, such
/// as running out of file descriptors, would fail again immediately.
fn accept_error_backoff(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_ERROR_BACKOFF),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_retried_immediately() {
        // テスト項目: 個別接続の失敗は待たずに accept を再開する
        // given (前提条件):
        let kinds = [
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
        ];

        for kind in kinds {
            // when (操作):
            let backoff = accept_error_backoff(&io::Error::from(kind));

            // then (期待する結果):
            assert_eq!(backoff, None, "{kind:?}");
        }
    }

    #[test]
    fn test_resource_exhaustion_backs_off() {
        // テスト項目: ファイルディスクリプタ枯渇などは待機してから accept を再開する
        // given (前提条件):
        let error = io::Error::other("Too many open files");

        // when (操作):
        let backoff = accept_error_backoff(&error);

        // then (期待する結果):
        assert_eq!(backoff, Some(ACCEPT_ERROR_BACKOFF));
    }
}

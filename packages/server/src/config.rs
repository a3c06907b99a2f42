//! Server configuration.

use std::{net::SocketAddr, time::Duration};

use parlor_shared::{DEFAULT_PORT, frame::DEFAULT_MAX_FRAME_LEN};

use crate::session::SessionLimits;

/// Runtime settings for [`crate::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind the chat listener to
    pub host: String,
    /// TCP port of the chat listener
    pub port: u16,
    /// Outbound queue bound per client; a client that falls this far behind is disconnected
    pub queue_capacity: usize,
    /// Largest accepted frame payload, in bytes
    pub max_frame_len: u64,
    /// Time a new connection has to send its `Join`
    pub join_timeout: Duration,
    /// Address of the optional HTTP status endpoint
    pub status_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            queue_capacity: 1024,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            join_timeout: Duration::from_secs(10),
            status_addr: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            queue_capacity: self.queue_capacity.max(1),
            max_frame_len: self.max_frame_len,
            join_timeout: self.join_timeout,
        }
    }
}

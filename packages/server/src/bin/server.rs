//! Chat relay server.
//!
//! Accepts TCP clients, relays every chat line to the whole room and keeps a
//! chat log that new clients receive on join.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin parlor-server
//! cargo run --bin parlor-server -- --host 127.0.0.1 --port 5000 --status-addr 127.0.0.1:8080
//! ```

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use parlor_server::{Server, ServerConfig};
use parlor_shared::{DEFAULT_PORT, frame::DEFAULT_MAX_FRAME_LEN, logger::setup_logger};

#[derive(Parser, Debug)]
#[command(name = "parlor-server")]
#[command(about = "TCP chat relay server with a shared chat log", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Outbound messages buffered per client before it is disconnected as a slow consumer
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,

    /// Largest accepted frame payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: u64,

    /// Seconds a new connection has to send its join message
    #[arg(long, default_value_t = 10)]
    join_timeout_secs: u64,

    /// Serve the HTTP status endpoint on this address (e.g. 127.0.0.1:8080)
    #[arg(long)]
    status_addr: Option<SocketAddr>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            queue_capacity: args.queue_capacity,
            max_frame_len: args.max_frame_len,
            join_timeout: Duration::from_secs(args.join_timeout_secs),
            status_addr: args.status_addr,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let server = match Server::bind(args.into()).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run_until_ctrl_c().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

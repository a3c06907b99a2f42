//! Terminal chat client with reconnection support.
//!
//! Joins the room under the given username, prints the room history, then
//! sends each typed line as a chat message. Ctrl+D or Ctrl+C leaves the room.
//! Reconnects on connection loss (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin parlor-client -- 127.0.0.1 alice
//! cargo run --bin parlor-client -- chat.example.com bob --port 4000
//! ```

use clap::Parser;

use parlor_shared::{DEFAULT_PORT, logger::setup_logger};

#[derive(Parser, Debug)]
#[command(name = "parlor-client")]
#[command(about = "Terminal client for the Parlor chat relay", long_about = None)]
struct Args {
    /// Relay host name or address
    host: String,

    /// Display name (letters, digits, '_', '-' and '.', up to 32 characters)
    username: String,

    /// Relay port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    if let Err(e) = parlor_client::run_client(addr, args.username).await {
        tracing::error!("Client error: {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

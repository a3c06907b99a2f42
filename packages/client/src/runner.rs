//! Client execution logic with reconnection support.

use std::time::Duration;

use parlor_shared::Username;

use crate::{
    domain::{ReconnectBudget, unseen_entries},
    error::ClientError,
    input::spawn_input,
    session::{ClientSession, connect},
    ui::print_entry,
};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Run the chat client with reconnection logic.
///
/// Returns once the user leaves, or with the last error when reconnecting is
/// pointless or the attempts are used up. Only consecutive failures count
/// against the attempts, and history replayed after a reconnect is printed
/// from where the previous connection left off.
pub async fn run_client(addr: String, username: String) -> Result<(), ClientError> {
    let username = Username::parse(username)?;
    let mut input = spawn_input(format!("{}> ", username));
    let mut budget = ReconnectBudget::new(MAX_RECONNECT_ATTEMPTS);
    let mut shown = 0usize;

    println!(
        "\nYou are '{}'. Type messages and press Enter to send. Press Ctrl+D to leave.\n",
        username
    );

    loop {
        tracing::info!(
            "Attempting to connect to {} as '{}' (attempt {}/{})",
            addr,
            username,
            budget.next_attempt(),
            budget.max_attempts()
        );

        let joined = match connect(&addr).await {
            Ok(stream) => ClientSession::join(stream, &username).await,
            Err(e) => Err(e),
        };

        let result = match joined {
            Ok((session, history)) => {
                budget.joined();
                for entry in unseen_entries(&history, shown) {
                    print_entry(username.as_str(), entry);
                }
                shown = shown.max(history.len());

                session
                    .run(&mut input, |entry| {
                        shown += 1;
                        print_entry(username.as_str(), entry);
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!("Client session ended normally");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Connection lost: {}", e);

                if !budget.record_failure(&e) {
                    return Err(e);
                }

                tracing::info!(
                    "Reconnecting in {} seconds... (attempt {}/{})",
                    RECONNECT_INTERVAL_SECS,
                    budget.next_attempt(),
                    budget.max_attempts()
                );
                tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
            }
        }
    }
}

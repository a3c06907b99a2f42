//! Reconnection policy and history bookkeeping across reconnects.

use crate::error::ClientError;

/// Check if the client should exit immediately based on the error type.
///
/// Errors that would repeat identically on every attempt are not worth a retry.
pub fn should_exit_immediately(error: &ClientError) -> bool {
    matches!(
        error,
        ClientError::InvalidUsername(_) | ClientError::UnexpectedMessage(_)
    )
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The client error that occurred
/// * `current_attempt` - The current reconnection attempt count (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    error: &ClientError,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    if should_exit_immediately(error) {
        return false;
    }

    current_attempt < max_attempts
}

/// Counts consecutive failed connection attempts.
///
/// The count starts over whenever a session gets as far as joining the room,
/// so only back-to-back failures use up the budget.
#[derive(Debug)]
pub struct ReconnectBudget {
    failures: u32,
    max_attempts: u32,
}

impl ReconnectBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            failures: 0,
            max_attempts,
        }
    }

    /// Number of the attempt about to be made, starting at 1.
    pub fn next_attempt(&self) -> u32 {
        self.failures + 1
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn joined(&mut self) {
        self.failures = 0;
    }

    /// Record a failed session and decide whether to try again.
    pub fn record_failure(&mut self, error: &ClientError) -> bool {
        self.failures += 1;
        should_attempt_reconnect(error, self.failures, self.max_attempts)
    }
}

/// Entries of a replayed history that have not been displayed yet.
///
/// The chat log is append-only and every client sees it in the same order, so
/// the first `shown` entries of a fresh snapshot are exactly the ones already
/// on screen.
pub fn unseen_entries(history: &[String], shown: usize) -> &[String] {
    history.get(shown..).unwrap_or(&[])
}

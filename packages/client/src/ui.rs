//! UI utilities for the client.

use std::io::Write;

/// Print one chat log entry above the prompt.
pub fn print_entry(username: &str, entry: &str) {
    print!("\r{}\n", entry);
    redisplay_prompt(username);
}

/// Redisplay the prompt after receiving a message
pub fn redisplay_prompt(username: &str) {
    print!("{}> ", username);
    std::io::stdout().flush().ok();
}

//! Domain model: client identity and the chat log.

mod chat_log;
mod client_id;

pub use chat_log::{ChatLog, format_chat, format_joined, format_left};
pub use client_id::ClientId;

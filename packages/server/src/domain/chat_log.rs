//! Append-only chat history.

use parlor_shared::time::timestamp_to_jst_rfc3339;

/// Author shown on system-generated notices.
const SERVER_AUTHOR: &str = "Server";

/// Ordered, append-only sequence of formatted entries.
///
/// Entries are never reordered or removed; append order is the order in which
/// the hub serialized the corresponding events.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    entries: Vec<String>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: String) {
        self.entries.push(entry);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `[<timestamp>][<author>] <text>`
pub fn format_chat(timestamp_millis: i64, author: &str, text: &str) -> String {
    format!(
        "[{}][{}] {}",
        timestamp_to_jst_rfc3339(timestamp_millis),
        author,
        text
    )
}

pub fn format_joined(timestamp_millis: i64, name: &str) -> String {
    format_chat(
        timestamp_millis,
        SERVER_AUTHOR,
        &format!("'{}' has joined.", name),
    )
}

pub fn format_left(timestamp_millis: i64, name: &str) -> String {
    format_chat(
        timestamp_millis,
        SERVER_AUTHOR,
        &format!("'{}' has left.", name),
    )
}

use serde::{Deserialize, Serialize};

/// A chat message as recorded by the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    /// Epoch millis assigned by the store; the only ordering key.
    pub timestamp: i64,
    pub author: String,
    pub is_privileged: bool,
}

/// Insert payload. The store assigns `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub text: String,
    pub author: String,
    pub is_privileged: bool,
}

impl NewMessage {
    pub fn new(text: impl Into<String>, author: impl Into<String>, is_privileged: bool) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
            is_privileged,
        }
    }
}

/// Local identity used when sending. Captured into each message at send time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub display_name: String,
    pub is_privileged: bool,
}

impl Session {
    pub fn new(display_name: impl Into<String>, is_privileged: bool) -> Self {
        Self {
            display_name: display_name.into(),
            is_privileged,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        !self.display_name.trim().is_empty()
    }
}

/// Reactive state handed to the UI after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub unread_count: u64,
    pub is_open: bool,
    pub has_more_history: bool,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            loading: true,
            unread_count: 0,
            is_open: false,
            has_more_history: true,
        }
    }
}

use crate::common::{ChatEvent, ChatSnapshot, Message, Session};

pub const SEND_FAILED_NOTICE: &str = "Error al enviar el mensaje. Por favor, intenta de nuevo.";
pub const DELETE_FAILED_NOTICE: &str = "Error al eliminar el mensaje. Por favor, intenta de nuevo.";

/// Local UI state.
pub struct AppState {
    pub snapshot: ChatSnapshot,
    pub input_text: String,
    /// Display name typed on the entrance screen
    pub name_input: String,
    pub session: Session,
    /// Whether the chat panel is shown. Updated optimistically; the worker
    /// confirms through the next snapshot.
    pub is_open: bool,
    pub notice: Option<String>,
    /// A `LoadMore` was sent and no snapshot has answered it yet.
    pub loading_more: bool,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            snapshot: ChatSnapshot::default(),
            input_text: String::new(),
            name_input: String::new(),
            session,
            is_open: false,
            notice: None,
            loading_more: false,
        }
    }

    pub fn apply_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Snapshot(snapshot) => {
                self.snapshot = snapshot;
                self.loading_more = false;
            }
            ChatEvent::SendFailed => self.notice = Some(SEND_FAILED_NOTICE.to_string()),
            ChatEvent::DeleteFailed => self.notice = Some(DELETE_FAILED_NOTICE.to_string()),
        }
    }

    /// Flip visibility and return the new value.
    pub fn toggle_open(&mut self) -> bool {
        self.is_open = !self.is_open;
        self.is_open
    }

    /// Set the session's display name. Returns the trimmed name, or `None`
    /// when it is blank.
    pub fn sign_in(&mut self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.session.display_name = name.to_string();
        Some(self.session.display_name.clone())
    }

    /// Returns false while an earlier request is still unanswered.
    pub fn request_load_more(&mut self) -> bool {
        if self.loading_more || !self.snapshot.has_more_history {
            return false;
        }
        self.loading_more = true;
        true
    }

    pub fn can_delete(&self) -> bool {
        self.session.is_privileged
    }

    /// Badge count, shown only while the chat is hidden.
    pub fn unread_badge(&self) -> Option<u64> {
        if !self.is_open && self.snapshot.unread_count > 0 {
            Some(self.snapshot.unread_count)
        } else {
            None
        }
    }

    pub fn is_own(&self, message: &Message) -> bool {
        message.author == self.session.display_name
    }
}

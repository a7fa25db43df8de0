use super::types::{ChatSnapshot, Message};

/// Row-level change delivered by the store's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Message),
    Deleted { id: String },
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Inserted(_) => ChangeKind::Insert,
            ChangeEvent::Deleted { .. } => ChangeKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// Which change kinds a subscription wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeKinds {
    pub inserts: bool,
    pub deletes: bool,
}

impl ChangeKinds {
    pub const ALL: ChangeKinds = ChangeKinds {
        inserts: true,
        deletes: true,
    };
    pub const INSERTS: ChangeKinds = ChangeKinds {
        inserts: true,
        deletes: false,
    };

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.inserts,
            ChangeKind::Delete => self.deletes,
        }
    }
}

/// Events sent from the chat worker up to the UI.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Snapshot(ChatSnapshot),
    SendFailed,
    DeleteFailed,
}

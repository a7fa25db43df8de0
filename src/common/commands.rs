/// Commands the UI sends down to the chat worker.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    /// Chat view visibility changed.
    SetOpen(bool),
    SendMessage {
        text: String,
        author: String,
        is_privileged: bool,
    },
    /// Callers gate this on the session being privileged.
    DeleteMessage(String),
    LoadMore,
}

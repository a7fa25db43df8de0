pub mod clock;
pub mod commands;
pub mod events;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::ChatCommand;
pub use events::{ChangeEvent, ChangeKind, ChangeKinds, ChatEvent};
pub use types::{ChatSnapshot, Message, NewMessage, Session};

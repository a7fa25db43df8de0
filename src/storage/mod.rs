pub mod change_feed;
pub mod database;
pub mod local_state;
pub mod message_store;

pub use change_feed::ChangeFeedTask;
pub use local_state::{KeyValueStore, LastSeen, MemoryKeyValueStore, SqliteKeyValueStore};
pub use message_store::SqliteMessageStore;

use std::fs;
use std::path::Path;

/// Ensure the parent directory of a database file exists
pub fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

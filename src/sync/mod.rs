pub mod engine;
pub mod remote;
pub mod worker;

pub use engine::{ChatSyncEngine, SyncConfig};
pub use remote::{FeedEvent, MessageStore, Subscription};
pub use worker::ChatWorker;

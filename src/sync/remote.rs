use std::future::Future;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::common::{ChangeEvent, ChangeKinds, Message, NewMessage};
use crate::error::StoreResult;

/// The remote message store the chat syncs against.
///
/// Reads return rows in the order named by each method. Mutations are
/// reported back to subscribers through the change feed, never through
/// the return value alone.
pub trait MessageStore: Send + Sync + 'static {
    /// Newest `limit` messages, ascending by timestamp.
    fn fetch_latest(&self, limit: usize)
    -> impl Future<Output = StoreResult<Vec<Message>>> + Send;

    /// Up to `limit` messages strictly older than `before_millis`, newest first.
    fn fetch_before(
        &self,
        before_millis: i64,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<Message>>> + Send;

    /// Every message at or after `since_millis`, ascending by timestamp.
    fn fetch_since(&self, since_millis: i64)
    -> impl Future<Output = StoreResult<Vec<Message>>> + Send;

    /// Number of messages strictly newer than `after_millis`.
    fn count_after(&self, after_millis: i64) -> impl Future<Output = StoreResult<u64>> + Send;

    fn insert(&self, message: NewMessage) -> impl Future<Output = StoreResult<Message>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Register a listener on the change feed. Dropping the returned
    /// subscription releases it.
    fn subscribe(&self, channel: &str, kinds: ChangeKinds) -> StoreResult<Subscription>;
}

/// What a subscription hands to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Change(ChangeEvent),
    /// The receiver fell behind and `missed` events were lost. Local state
    /// must be refetched from the store.
    Lagged { missed: u64 },
}

/// A live listener on the change feed.
pub struct Subscription {
    channel: String,
    kinds: ChangeKinds,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        kinds: ChangeKinds,
        receiver: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        let channel = channel.into();
        log::debug!("Subscribed to channel {channel}");
        Self {
            channel,
            kinds,
            receiver,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next event this subscription accepts.
    /// Returns `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.kinds.accepts(event.kind()) => {
                    return Some(FeedEvent::Change(event));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => return Some(self.lagged(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event, without waiting.
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.kinds.accepts(event.kind()) => {
                    return Some(FeedEvent::Change(event));
                }
                Ok(_) => continue,
                Err(TryRecvError::Lagged(missed)) => return Some(self.lagged(missed)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Skip the rest of the backlog: after a gap the caller refetches, so
    /// replaying the surviving tail would count it twice.
    fn lagged(&mut self, missed: u64) -> FeedEvent {
        log::warn!(
            "Channel {} lagged, {missed} change events dropped; resyncing",
            self.channel
        );
        self.receiver = self.receiver.resubscribe();
        FeedEvent::Lagged { missed }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        log::debug!("Removed channel {}", self.channel);
    }
}

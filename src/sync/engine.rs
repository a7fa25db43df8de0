use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::common::{ChangeEvent, ChangeKinds, ChatSnapshot, Clock, Message, NewMessage};
use crate::storage::local_state::{KeyValueStore, LastSeen};

use super::remote::{FeedEvent, MessageStore, Subscription};

pub const OPEN_CHANNEL: &str = "chat-messages";
pub const UNREAD_CHANNEL: &str = "chat-unread";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub page_size: usize,
    /// Unread counting never looks further back than this.
    pub unread_floor: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            unread_floor: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// No feed yet, or released.
    Detached,
    Open,
    Closed,
}

/// Keeps a local, ordered window of chat history in sync with a
/// [`MessageStore`].
///
/// While open it holds the most recent page plus any older pages loaded
/// through [`load_more`](Self::load_more), and merges live inserts and
/// deletes. While closed it only counts inserts for the unread badge.
/// Exactly one feed is active at a time; switching modes drops the old
/// one before the new one is created.
pub struct ChatSyncEngine<S, K> {
    store: Arc<S>,
    last_seen: LastSeen<K>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    mode: Mode,
    feed: Option<Subscription>,
    messages: Vec<Message>,
    loading: bool,
    unread_count: u64,
    history_exhausted: bool,
    /// Oldest timestamp the open window covers when the list is empty.
    window_floor: i64,
    /// Millis the unread count was taken from.
    unread_cutoff: i64,
}

impl<S: MessageStore, K: KeyValueStore> ChatSyncEngine<S, K> {
    pub fn new(
        store: Arc<S>,
        last_seen: LastSeen<K>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            last_seen,
            clock,
            config: SyncConfig {
                page_size: config.page_size.max(1),
                ..config
            },
            mode: Mode::Detached,
            feed: None,
            messages: Vec::new(),
            loading: true,
            unread_count: 0,
            history_exhausted: false,
            window_floor: i64::MIN,
            unread_cutoff: i64::MIN,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn is_open(&self) -> bool {
        self.mode == Mode::Open
    }

    /// False once a page shorter than the page size came back.
    pub fn has_more_history(&self) -> bool {
        !self.history_exhausted
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.messages.clone(),
            loading: self.loading,
            unread_count: self.unread_count,
            is_open: self.is_open(),
            has_more_history: self.has_more_history(),
        }
    }

    pub async fn set_open(&mut self, open: bool) {
        if open {
            self.open().await;
        } else {
            self.close().await;
        }
    }

    /// Switch to open mode: load the latest page and merge live changes.
    pub async fn open(&mut self) {
        if self.mode == Mode::Open {
            return;
        }

        // Release the unread feed before the full feed exists.
        self.feed = None;
        self.mode = Mode::Open;
        // Subscribe before fetching; events racing the fetch stay buffered
        // and merge idempotently afterwards.
        self.feed = self.subscribe(OPEN_CHANNEL, ChangeKinds::ALL);

        self.loading = true;
        self.history_exhausted = false;
        let page_size = self.config.page_size;
        match self.store.fetch_latest(page_size).await {
            Ok(page) => {
                self.history_exhausted = page.len() < page_size;
                self.window_floor = page.first().map_or(i64::MIN, |message| message.timestamp);
                self.messages = dedup_by_id(page);
                log::info!("Chat opened with {} messages", self.messages.len());
            }
            Err(err) => {
                self.window_floor = self.clock.now().timestamp_millis();
                log::warn!("Fetch failed while opening chat: {err}");
            }
        }
        self.loading = false;

        self.unread_count = 0;
        self.last_seen.mark(self.clock.now());
    }

    /// Switch to closed mode: count inserts newer than the last-seen mark.
    pub async fn close(&mut self) {
        if self.mode == Mode::Closed {
            return;
        }

        let was_open = self.mode == Mode::Open;
        self.feed = None;
        self.mode = Mode::Closed;

        let now = self.clock.now();
        if was_open {
            self.last_seen.mark(now);
        }

        let floor = now
            .checked_sub_signed(self.config.unread_floor)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = match self.last_seen.get() {
            Some(seen) if seen > floor => seen,
            _ => floor,
        };
        self.unread_cutoff = cutoff.timestamp_millis();

        self.unread_count = match self.store.count_after(self.unread_cutoff).await {
            Ok(count) => count,
            Err(err) => {
                log::warn!("Fetch failed while counting unread messages: {err}");
                0
            }
        };
        self.feed = self.subscribe(UNREAD_CHANNEL, ChangeKinds::INSERTS);
        log::info!("Chat closed, {} unread", self.unread_count);
    }

    /// Release the active feed. Stamps the last-seen mark if the chat was open.
    pub fn detach(&mut self) {
        if self.mode == Mode::Open {
            self.last_seen.mark(self.clock.now());
        }
        self.feed = None;
        self.mode = Mode::Detached;
    }

    /// Insert a message. The local list only changes once the insert
    /// comes back through the feed.
    pub async fn send(&mut self, text: &str, author: &str, is_privileged: bool) -> bool {
        let message = NewMessage::new(text, author, is_privileged);
        match self.store.insert(message).await {
            Ok(stored) => {
                log::debug!("Sent message {}", stored.id);
                true
            }
            Err(err) => {
                log::warn!("Write failed while sending message: {err}");
                false
            }
        }
    }

    /// Delete a message by id. No permission check happens here; callers
    /// only offer this to privileged sessions.
    pub async fn delete_message(&mut self, id: &str) -> bool {
        match self.store.delete(id).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Write failed while deleting message {id}: {err}");
                false
            }
        }
    }

    /// Prepend the page of history just before the oldest loaded message.
    pub async fn load_more(&mut self) {
        if self.history_exhausted {
            return;
        }
        let Some(oldest) = self.messages.first().map(|message| message.timestamp) else {
            return;
        };

        let page_size = self.config.page_size;
        match self.store.fetch_before(oldest, page_size).await {
            Ok(mut page) => {
                self.history_exhausted = page.len() < page_size;
                page.reverse();
                let known: HashSet<&str> =
                    self.messages.iter().map(|message| message.id.as_str()).collect();
                let mut older: Vec<Message> = page
                    .into_iter()
                    .filter(|message| message.timestamp < oldest && !known.contains(message.id.as_str()))
                    .collect();
                log::debug!("Loaded {} older messages", older.len());
                older.append(&mut self.messages);
                self.messages = older;
            }
            Err(err) => {
                log::warn!("Fetch failed while loading older messages: {err}");
            }
        }
    }

    /// Merge one change event according to the current mode.
    pub fn apply_change(&mut self, event: ChangeEvent) {
        match (self.mode, event) {
            (Mode::Open, ChangeEvent::Inserted(message)) => {
                if self.messages.iter().any(|existing| existing.id == message.id) {
                    log::debug!("Ignoring duplicate insert of {}", message.id);
                    return;
                }
                self.messages.push(message);
                self.last_seen.mark(self.clock.now());
            }
            (Mode::Open, ChangeEvent::Deleted { id }) => {
                self.messages.retain(|message| message.id != id);
            }
            (Mode::Closed, ChangeEvent::Inserted(_)) => {
                self.unread_count = self.unread_count.saturating_add(1);
            }
            (Mode::Closed, ChangeEvent::Deleted { .. }) | (Mode::Detached, _) => {}
        }
    }

    /// Merge one feed item. A lag report triggers a resync from the store.
    pub async fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Change(change) => self.apply_change(change),
            FeedEvent::Lagged { .. } => self.resync().await,
        }
    }

    /// Rebuild local state after the feed dropped events.
    ///
    /// Open: reload everything from the oldest loaded message onwards, which
    /// picks up missed inserts and drops missed deletes. Closed: recount from
    /// the cutoff taken when the chat was closed.
    pub async fn resync(&mut self) {
        match self.mode {
            Mode::Open => {
                let since = self
                    .messages
                    .iter()
                    .map(|message| message.timestamp)
                    .min()
                    .unwrap_or(self.window_floor);
                match self.store.fetch_since(since).await {
                    Ok(rows) => {
                        self.messages = dedup_by_id(rows);
                        self.last_seen.mark(self.clock.now());
                        log::info!("Resynced chat, {} messages", self.messages.len());
                    }
                    Err(err) => log::warn!("Fetch failed while resyncing chat: {err}"),
                }
            }
            Mode::Closed => match self.store.count_after(self.unread_cutoff).await {
                Ok(count) => {
                    self.unread_count = count;
                    log::info!("Resynced unread count: {count}");
                }
                Err(err) => log::warn!("Fetch failed while recounting unread messages: {err}"),
            },
            Mode::Detached => {}
        }
    }

    /// Handle every item already buffered on the feed. Returns how many
    /// were handled.
    pub async fn drain_changes(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.feed.as_mut().and_then(Subscription::try_recv) {
            self.handle_feed_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Wait for the next item on the active feed. Pends forever while
    /// detached, so it is safe inside `tokio::select!`.
    pub async fn next_change(&mut self) -> Option<FeedEvent> {
        match self.feed.as_mut() {
            Some(feed) => {
                let event = feed.recv().await;
                if event.is_none() {
                    log::warn!("Subscription failed: channel {} closed", feed.channel());
                    self.feed = None;
                }
                event
            }
            None => std::future::pending().await,
        }
    }

    fn subscribe(&self, channel: &str, kinds: ChangeKinds) -> Option<Subscription> {
        match self.store.subscribe(channel, kinds) {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                log::warn!("Subscription failed for channel {channel}: {err}");
                None
            }
        }
    }
}

fn dedup_by_id(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|message| seen.insert(message.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManualClock;
    use crate::error::{StoreError, StoreResult};
    use crate::sync::remote::FeedEvent;
    use crate::storage::local_state::{LAST_SEEN_KEY, MemoryKeyValueStore};
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;
    use tokio::sync::broadcast;

    const FAKE_FEED_CAPACITY: usize = 64;

    fn offline() -> StoreError {
        StoreError::Database(rusqlite::Error::InvalidQuery)
    }

    /// Scripted store: canned history, call counters, and a feed the test
    /// pushes events into by hand.
    struct FakeStore {
        history: Mutex<Vec<Message>>,
        feed: broadcast::Sender<ChangeEvent>,
        fail_reads: bool,
        fail_writes: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeStore {
        fn new(history: Vec<Message>) -> Self {
            let (feed, _) = broadcast::channel(FAKE_FEED_CAPACITY);
            Self {
                history: Mutex::new(history),
                feed,
                fail_reads: false,
                fail_writes: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn push(&self, event: ChangeEvent) {
            let _ = self.feed.send(event);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }

        fn read(&self, call: &'static str) -> StoreResult<Vec<Message>> {
            self.calls.lock().push(call);
            if self.fail_reads {
                return Err(offline());
            }
            Ok(self.history.lock().clone())
        }
    }

    impl MessageStore for FakeStore {
        async fn fetch_latest(&self, limit: usize) -> StoreResult<Vec<Message>> {
            let history = self.read("fetch_latest")?;
            let start = history.len().saturating_sub(limit);
            Ok(history[start..].to_vec())
        }

        async fn fetch_before(&self, before_millis: i64, limit: usize) -> StoreResult<Vec<Message>> {
            let history = self.read("fetch_before")?;
            Ok(history
                .into_iter()
                .rev()
                .filter(|message| message.timestamp < before_millis)
                .take(limit)
                .collect())
        }

        async fn fetch_since(&self, since_millis: i64) -> StoreResult<Vec<Message>> {
            let history = self.read("fetch_since")?;
            Ok(history
                .into_iter()
                .filter(|message| message.timestamp >= since_millis)
                .collect())
        }

        async fn count_after(&self, after_millis: i64) -> StoreResult<u64> {
            let history = self.read("count_after")?;
            Ok(history
                .iter()
                .filter(|message| message.timestamp > after_millis)
                .count() as u64)
        }

        async fn insert(&self, message: NewMessage) -> StoreResult<Message> {
            self.calls.lock().push("insert");
            if self.fail_writes {
                return Err(offline());
            }
            Ok(Message {
                id: "new".to_string(),
                text: message.text,
                timestamp: 0,
                author: message.author,
                is_privileged: message.is_privileged,
            })
        }

        async fn delete(&self, _id: &str) -> StoreResult<()> {
            self.calls.lock().push("delete");
            if self.fail_writes {
                return Err(offline());
            }
            Ok(())
        }

        fn subscribe(&self, channel: &str, kinds: ChangeKinds) -> StoreResult<Subscription> {
            Ok(Subscription::new(channel, kinds, self.feed.subscribe()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
    }

    fn message(id: &str, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            text: format!("text {id}"),
            timestamp,
            author: "Ana".to_string(),
            is_privileged: false,
        }
    }

    fn history(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| message(&format!("m{i}"), t0().timestamp_millis() - 60_000 + i as i64))
            .collect()
    }

    fn engine(
        store: FakeStore,
        page_size: usize,
    ) -> (ChatSyncEngine<FakeStore, MemoryKeyValueStore>, Arc<FakeStore>, MemoryKeyValueStore) {
        let store = Arc::new(store);
        let kv = MemoryKeyValueStore::new();
        let config = SyncConfig {
            page_size,
            ..SyncConfig::default()
        };
        let engine = ChatSyncEngine::new(
            store.clone(),
            LastSeen::new(kv.clone()),
            Arc::new(ManualClock::new(t0())),
            config,
        );
        (engine, store, kv)
    }

    fn ids(engine: &ChatSyncEngine<FakeStore, MemoryKeyValueStore>) -> Vec<&str> {
        engine.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn starts_loading_and_detached() {
        let (engine, _, _) = engine(FakeStore::new(Vec::new()), 50);

        assert!(engine.is_loading());
        assert!(!engine.is_open());
        assert_eq!(engine.unread_count(), 0);
    }

    #[tokio::test]
    async fn open_loads_latest_page_and_marks_seen() {
        let (mut engine, _, kv) = engine(FakeStore::new(history(5)), 3);

        engine.open().await;

        assert_eq!(ids(&engine), vec!["m2", "m3", "m4"]);
        assert!(!engine.is_loading());
        assert!(engine.has_more_history());
        assert_eq!(
            kv.get(LAST_SEEN_KEY).unwrap().as_deref(),
            Some("2024-09-02T08:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn open_with_failed_fetch_keeps_list_and_clears_loading() {
        let mut store = FakeStore::new(history(2));
        store.fail_reads = true;
        let (mut engine, _, _) = engine(store, 50);

        engine.open().await;

        assert!(engine.messages().is_empty());
        assert!(!engine.is_loading());
        assert!(engine.is_open());
    }

    #[tokio::test]
    async fn open_twice_does_not_refetch() {
        let (mut engine, store, _) = engine(FakeStore::new(history(2)), 50);

        engine.open().await;
        engine.open().await;

        assert_eq!(store.calls(), vec!["fetch_latest"]);
    }

    #[tokio::test]
    async fn inserts_append_in_delivery_order_and_dedupe() {
        let (mut engine, store, _) = engine(FakeStore::new(history(1)), 50);
        engine.open().await;

        store.push(ChangeEvent::Inserted(message("b", 10)));
        store.push(ChangeEvent::Inserted(message("a", 20)));
        store.push(ChangeEvent::Inserted(message("b", 10)));

        assert_eq!(engine.drain_changes().await, 3);
        assert_eq!(ids(&engine), vec!["m0", "b", "a"]);
    }

    #[tokio::test]
    async fn racing_insert_already_in_page_is_not_duplicated() {
        let (mut engine, store, _) = engine(FakeStore::new(history(2)), 50);
        engine.open().await;

        store.push(ChangeEvent::Inserted(history(2)[1].clone()));
        engine.drain_changes().await;

        assert_eq!(ids(&engine), vec!["m0", "m1"]);
    }

    #[tokio::test]
    async fn delete_removes_anywhere_and_ignores_unknown_ids() {
        let (mut engine, store, _) = engine(FakeStore::new(history(3)), 50);
        engine.open().await;

        store.push(ChangeEvent::Deleted {
            id: "m1".to_string(),
        });
        store.push(ChangeEvent::Deleted {
            id: "nope".to_string(),
        });
        engine.drain_changes().await;

        assert_eq!(ids(&engine), vec!["m0", "m2"]);
    }

    #[tokio::test]
    async fn close_counts_messages_newer_than_last_seen() {
        let (mut engine, _, kv) = engine(FakeStore::new(history(4)), 50);
        let seen = Utc
            .timestamp_millis_opt(t0().timestamp_millis() - 60_000 + 1)
            .unwrap();
        LastSeen::new(kv.clone()).mark(seen);

        engine.close().await;

        // m2 and m3 are newer than the mark, m0 and m1 are not.
        assert_eq!(engine.unread_count(), 2);
    }

    #[tokio::test]
    async fn close_without_mark_uses_the_five_minute_floor() {
        let mut old = history(2);
        old[0].timestamp = t0().timestamp_millis() - 10 * 60_000;
        let (mut engine, _, _) = engine(FakeStore::new(old), 50);

        engine.close().await;

        assert_eq!(engine.unread_count(), 1);
    }

    #[tokio::test]
    async fn stale_mark_is_clamped_to_the_floor() {
        let mut old = history(2);
        old[0].timestamp = t0().timestamp_millis() - 10 * 60_000;
        let (mut engine, _, kv) = engine(FakeStore::new(old), 50);
        LastSeen::new(kv).mark(t0() - Duration::hours(2));

        engine.close().await;

        assert_eq!(engine.unread_count(), 1);
    }

    #[tokio::test]
    async fn closed_mode_counts_each_insert_once_and_ignores_deletes() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.close().await;

        store.push(ChangeEvent::Inserted(message("a", 1)));
        store.push(ChangeEvent::Deleted {
            id: "a".to_string(),
        });
        store.push(ChangeEvent::Inserted(message("b", 2)));
        engine.drain_changes().await;

        assert_eq!(engine.unread_count(), 2);
    }

    #[tokio::test]
    async fn reopening_resets_unread_and_drops_the_unread_feed() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.close().await;
        store.push(ChangeEvent::Inserted(message("a", 1)));
        engine.drain_changes().await;
        assert_eq!(engine.unread_count(), 1);

        engine.open().await;
        assert_eq!(engine.unread_count(), 0);

        store.push(ChangeEvent::Inserted(message("b", 2)));
        assert_eq!(engine.drain_changes().await, 1);
        assert_eq!(engine.unread_count(), 0);
        assert_eq!(ids(&engine), vec!["b"]);
    }

    #[tokio::test]
    async fn first_close_from_detached_does_not_mark_seen() {
        let (mut engine, _, kv) = engine(FakeStore::new(Vec::new()), 50);

        engine.close().await;

        assert_eq!(kv.get(LAST_SEEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn send_and_delete_report_failures_without_touching_state() {
        let mut store = FakeStore::new(history(1));
        store.fail_writes = true;
        let (mut engine, _, _) = engine(store, 50);
        engine.open().await;

        assert!(!engine.send("hola", "Ana", false).await);
        assert!(!engine.delete_message("m0").await);
        assert_eq!(ids(&engine), vec!["m0"]);
    }

    #[tokio::test]
    async fn send_does_not_update_the_list_optimistically() {
        let (mut engine, _, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.open().await;

        assert!(engine.send("hola", "Ana", false).await);
        assert!(engine.messages().is_empty());
    }

    #[tokio::test]
    async fn load_more_on_empty_list_makes_no_call() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.open().await;

        engine.load_more().await;

        assert_eq!(store.calls(), vec!["fetch_latest"]);
        assert!(engine.messages().is_empty());
    }

    #[tokio::test]
    async fn load_more_prepends_older_pages_until_exhausted() {
        let (mut engine, store, _) = engine(FakeStore::new(history(5)), 2);
        engine.open().await;
        assert_eq!(ids(&engine), vec!["m3", "m4"]);

        engine.load_more().await;
        assert_eq!(ids(&engine), vec!["m1", "m2", "m3", "m4"]);
        assert!(engine.has_more_history());

        engine.load_more().await;
        assert_eq!(ids(&engine), vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(!engine.has_more_history());

        engine.load_more().await;
        assert_eq!(
            store.calls(),
            vec!["fetch_latest", "fetch_before", "fetch_before"]
        );
    }

    #[tokio::test]
    async fn load_more_skips_ids_already_loaded() {
        let (mut engine, store, _) = engine(FakeStore::new(history(3)), 2);
        engine.open().await;
        // A live insert that carries an old timestamp.
        store.push(ChangeEvent::Inserted(history(3)[0].clone()));
        engine.drain_changes().await;

        engine.load_more().await;

        let loaded = ids(&engine);
        assert_eq!(loaded.iter().filter(|id| **id == "m0").count(), 1);
    }

    #[tokio::test]
    async fn failed_load_more_leaves_state_unchanged() {
        let (mut engine, _, _) = engine(FakeStore::new(history(3)), 2);
        engine.open().await;
        // Swap in a store that fails reads from here on.
        let mut failing = FakeStore::new(history(3));
        failing.fail_reads = true;
        engine.store = Arc::new(failing);

        engine.load_more().await;

        assert_eq!(ids(&engine), vec!["m1", "m2"]);
        assert!(engine.has_more_history());
    }

    #[tokio::test]
    async fn detach_releases_the_feed() {
        let (mut engine, store, kv) = engine(FakeStore::new(Vec::new()), 50);
        engine.open().await;

        engine.detach();
        store.push(ChangeEvent::Inserted(message("a", 1)));

        assert_eq!(engine.drain_changes().await, 0);
        assert_eq!(store.feed.receiver_count(), 0);
        assert!(kv.get(LAST_SEEN_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn only_one_feed_exists_across_transitions() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);

        engine.close().await;
        assert_eq!(store.feed.receiver_count(), 1);
        engine.open().await;
        assert_eq!(store.feed.receiver_count(), 1);
        engine.close().await;
        assert_eq!(store.feed.receiver_count(), 1);
    }

    #[tokio::test]
    async fn next_change_waits_for_the_feed() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.open().await;
        store.push(ChangeEvent::Inserted(message("a", 1)));

        assert_eq!(
            engine.next_change().await,
            Some(FeedEvent::Change(ChangeEvent::Inserted(message("a", 1))))
        );
    }

    /// Push `count` inserts at once, more than the feed can buffer.
    fn burst(store: &FakeStore, count: usize) -> Vec<Message> {
        let messages = history(count);
        *store.history.lock() = messages.clone();
        for message in &messages {
            store.push(ChangeEvent::Inserted(message.clone()));
        }
        messages
    }

    #[tokio::test]
    async fn open_feed_burst_is_recovered_by_refetching() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.open().await;

        let sent = burst(&store, FAKE_FEED_CAPACITY + 10);
        engine.drain_changes().await;

        assert_eq!(engine.messages(), sent.as_slice());
        assert_eq!(store.calls(), vec!["fetch_latest", "fetch_since"]);
    }

    #[tokio::test]
    async fn open_resync_drops_messages_deleted_during_the_gap() {
        let (mut engine, store, _) = engine(FakeStore::new(history(3)), 50);
        engine.open().await;
        store.history.lock().remove(1);

        engine.handle_feed_event(FeedEvent::Lagged { missed: 1 }).await;

        assert_eq!(ids(&engine), vec!["m0", "m2"]);
    }

    #[tokio::test]
    async fn closed_feed_burst_is_recounted() {
        let (mut engine, store, _) = engine(FakeStore::new(Vec::new()), 50);
        engine.close().await;

        burst(&store, FAKE_FEED_CAPACITY + 10);
        engine.drain_changes().await;

        assert_eq!(engine.unread_count(), (FAKE_FEED_CAPACITY + 10) as u64);

        // Live counting carries on after the resync.
        store.push(ChangeEvent::Inserted(message("late", t0().timestamp_millis())));
        engine.drain_changes().await;
        assert_eq!(engine.unread_count(), (FAKE_FEED_CAPACITY + 11) as u64);
    }

    #[tokio::test]
    async fn huge_unread_floor_does_not_overflow() {
        let store = Arc::new(FakeStore::new(history(2)));
        let mut engine = ChatSyncEngine::new(
            store,
            LastSeen::new(MemoryKeyValueStore::new()),
            Arc::new(ManualClock::new(t0())),
            SyncConfig {
                page_size: 50,
                unread_floor: Duration::MAX,
            },
        );

        engine.close().await;

        assert_eq!(engine.unread_count(), 2);
    }

    #[tokio::test]
    async fn reopen_after_failed_fetch_still_offers_older_pages() {
        let (mut engine, store, _) = engine(FakeStore::new(history(3)), 2);
        engine.open().await;
        engine.load_more().await;
        assert!(!engine.has_more_history());
        engine.close().await;

        let mut failing = FakeStore::new(history(3));
        failing.fail_reads = true;
        engine.store = Arc::new(failing);
        engine.open().await;
        assert!(engine.has_more_history());

        // The store recovers; paging works again.
        engine.store = store.clone();
        engine.load_more().await;
        assert_eq!(store.calls().last(), Some(&"fetch_before"));
    }
}

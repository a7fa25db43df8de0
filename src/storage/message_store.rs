use rusqlite::{Connection, Result as SqlResult, Row, params};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::common::{ChangeEvent, ChangeKinds, Clock, Message, NewMessage};
use crate::error::{StoreError, StoreResult};
use crate::sync::remote::{MessageStore, Subscription};

use super::database::Database;

const FEED_CAPACITY: usize = 256;
const MESSAGE_COLUMNS: &str = "id, text, created_at, author, is_privileged";

struct Inner {
    db: Database,
    /// Last change-log seq already broadcast.
    cursor: i64,
}

/// Message store backed by SQLite, with a change feed driven by the
/// `chat_changes` log that triggers fill on every insert and delete.
pub struct SqliteMessageStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl SqliteMessageStore {
    /// Open the store at a custom path
    pub fn with_path<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Self::from_database(Database::new(path)?, clock)
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Self::from_database(Database::in_memory()?, clock)
    }

    fn from_database(db: Database, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        init_schema(db.connection())?;
        // Only changes made after opening are broadcast.
        let cursor: i64 = db.connection().query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM chat_changes",
            [],
            |row| row.get(0),
        )?;
        let (feed, _) = broadcast::channel(FEED_CAPACITY);

        Ok(Self {
            inner: Mutex::new(Inner { db, cursor }),
            clock,
            feed,
        })
    }

    // ========== Queries ==========

    fn query_latest(&self, limit: usize) -> StoreResult<Vec<Message>> {
        let inner = self.inner.lock();
        let mut stmt = inner.db.connection().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM chat_messages
             ORDER BY created_at DESC, seq DESC
             LIMIT ?1"
        ))?;

        let mut messages = stmt
            .query_map(params![limit as i64], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        messages.reverse();

        Ok(messages)
    }

    fn query_before(&self, before_millis: i64, limit: usize) -> StoreResult<Vec<Message>> {
        let inner = self.inner.lock();
        let mut stmt = inner.db.connection().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM chat_messages
             WHERE created_at < ?1
             ORDER BY created_at DESC, seq DESC
             LIMIT ?2"
        ))?;

        let messages = stmt
            .query_map(params![before_millis, limit as i64], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    fn query_since(&self, since_millis: i64) -> StoreResult<Vec<Message>> {
        let inner = self.inner.lock();
        let mut stmt = inner.db.connection().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM chat_messages
             WHERE created_at >= ?1
             ORDER BY created_at ASC, seq ASC"
        ))?;

        let messages = stmt
            .query_map(params![since_millis], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    fn query_count_after(&self, after_millis: i64) -> StoreResult<u64> {
        let inner = self.inner.lock();
        let count: i64 = inner.db.connection().query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE created_at > ?1",
            params![after_millis],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ========== Mutations ==========

    fn insert_row(&self, message: NewMessage) -> StoreResult<Message> {
        if message.text.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }

        let stored = Message {
            id: Uuid::new_v4().to_string(),
            text: message.text,
            timestamp: self.clock.now().timestamp_millis(),
            author: message.author,
            is_privileged: message.is_privileged,
        };

        let inner = self.inner.lock();
        inner.db.connection().execute(
            "INSERT INTO chat_messages (id, text, author, is_privileged, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                stored.id,
                stored.text,
                stored.author,
                if stored.is_privileged { 1 } else { 0 },
                stored.timestamp
            ],
        )?;

        Ok(stored)
    }

    fn delete_row(&self, id: &str) -> StoreResult<()> {
        let inner = self.inner.lock();
        inner
            .db
            .connection()
            .execute("DELETE FROM chat_messages WHERE id = ?1", params![id])?;
        Ok(())
    }

    #[cfg(test)]
    fn message_count(&self) -> StoreResult<usize> {
        let inner = self.inner.lock();
        let count: i64 =
            inner
                .db
                .connection()
                .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Change feed ==========

    /// Broadcast every change-log row past the cursor to subscribers.
    /// Returns the number of events published.
    pub fn pump_changes(&self) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let changes = {
            let mut stmt = inner.db.connection().prepare(
                "SELECT c.seq, c.kind, c.message_id,
                        m.text, m.created_at, m.author, m.is_privileged
                 FROM chat_changes c
                 LEFT JOIN chat_messages m ON m.id = c.message_id
                 WHERE c.seq > ?1
                 ORDER BY c.seq ASC",
            )?;
            let rows = stmt
                .query_map(params![inner.cursor], change_from_row)?
                .collect::<SqlResult<Vec<_>>>()?;
            rows
        };

        let mut published = 0;
        for change in changes {
            inner.cursor = change.seq;

            let event = match (change.kind.as_str(), change.message) {
                ("insert", Some(message)) => ChangeEvent::Inserted(message),
                ("insert", None) => {
                    // Row deleted before we saw it; the delete follows.
                    log::debug!("Skipping insert of vanished message {}", change.message_id);
                    continue;
                }
                ("delete", _) => ChangeEvent::Deleted {
                    id: change.message_id,
                },
                (other, _) => {
                    log::warn!("Unknown change kind `{other}` at seq {}", change.seq);
                    continue;
                }
            };

            // No receivers is fine: nobody is listening right now.
            let _ = self.feed.send(event);
            published += 1;
        }

        Ok(published)
    }

    /// Drop consumed change-log rows older than `retention_secs`.
    pub fn prune_changes(&self, retention_secs: i64) -> StoreResult<usize> {
        let inner = self.inner.lock();
        let removed = inner.db.connection().execute(
            "DELETE FROM chat_changes
             WHERE seq <= ?1
               AND recorded_at < CAST(strftime('%s', 'now') AS INTEGER) - ?2",
            params![inner.cursor, retention_secs],
        )?;
        Ok(removed)
    }
}

impl MessageStore for SqliteMessageStore {
    async fn fetch_latest(&self, limit: usize) -> StoreResult<Vec<Message>> {
        self.query_latest(limit)
    }

    async fn fetch_before(&self, before_millis: i64, limit: usize) -> StoreResult<Vec<Message>> {
        self.query_before(before_millis, limit)
    }

    async fn fetch_since(&self, since_millis: i64) -> StoreResult<Vec<Message>> {
        self.query_since(since_millis)
    }

    async fn count_after(&self, after_millis: i64) -> StoreResult<u64> {
        self.query_count_after(after_millis)
    }

    async fn insert(&self, message: NewMessage) -> StoreResult<Message> {
        self.insert_row(message)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.delete_row(id)
    }

    fn subscribe(&self, channel: &str, kinds: ChangeKinds) -> StoreResult<Subscription> {
        Ok(Subscription::new(channel, kinds, self.feed.subscribe()))
    }
}

fn init_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            author TEXT NOT NULL,
            is_privileged INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at
            ON chat_messages(created_at);

        CREATE TABLE IF NOT EXISTS chat_changes (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            message_id TEXT NOT NULL,
            recorded_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER))
        );

        CREATE TRIGGER IF NOT EXISTS chat_messages_after_insert
        AFTER INSERT ON chat_messages
        BEGIN
            INSERT INTO chat_changes (kind, message_id) VALUES ('insert', NEW.id);
        END;

        CREATE TRIGGER IF NOT EXISTS chat_messages_after_delete
        AFTER DELETE ON chat_messages
        BEGIN
            INSERT INTO chat_changes (kind, message_id) VALUES ('delete', OLD.id);
        END;",
    )
}

fn message_from_row(row: &Row<'_>) -> SqlResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        author: row.get(3)?,
        is_privileged: row.get::<_, i64>(4)? != 0,
    })
}

struct ChangeRow {
    seq: i64,
    kind: String,
    message_id: String,
    message: Option<Message>,
}

fn change_from_row(row: &Row<'_>) -> SqlResult<ChangeRow> {
    let message_id: String = row.get(2)?;
    let text: Option<String> = row.get(3)?;
    let created_at: Option<i64> = row.get(4)?;
    let author: Option<String> = row.get(5)?;
    let is_privileged: Option<i64> = row.get(6)?;

    let message = match (text, created_at, author, is_privileged) {
        (Some(text), Some(timestamp), Some(author), Some(is_privileged)) => Some(Message {
            id: message_id.clone(),
            text,
            timestamp,
            author,
            is_privileged: is_privileged != 0,
        }),
        _ => None,
    };

    Ok(ChangeRow {
        seq: row.get(0)?,
        kind: row.get(1)?,
        message_id,
        message,
    })
}

use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};

use super::database::Database;

pub const LAST_SEEN_KEY: &str = "chat_last_seen_timestamp";

/// Durable string key-value storage owned by the host.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
}

/// Key-value storage in the client database; survives restarts.
pub struct SqliteKeyValueStore {
    db: Database,
}

impl SqliteKeyValueStore {
    /// Initialize local state at custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_database(Database::new(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::from_database(Database::in_memory()?)
    }

    fn from_database(db: Database) -> StoreResult<Self> {
        db.connection().execute(
            "CREATE TABLE IF NOT EXISTS local_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .db
            .connection()
            .query_row(
                "SELECT value FROM local_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO local_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// In-process key-value storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The "last seen" mark for the chat, stored as an ISO 8601 string.
///
/// Writes are monotonic: a mark older than the stored value is ignored.
/// Storage failures are logged and otherwise swallowed, since the mark
/// only feeds the unread badge.
pub struct LastSeen<K> {
    store: K,
}

impl<K: KeyValueStore> LastSeen<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        match self.read() {
            Ok(value) => value,
            Err(err) => {
                log::warn!("Ignoring stored last-seen mark: {err}");
                None
            }
        }
    }

    /// Record `now` as seen, unless a newer mark is already stored.
    pub fn mark(&self, now: DateTime<Utc>) {
        if let Some(current) = self.get() {
            if current >= now {
                return;
            }
        }

        let value = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(err) = self.store.set(LAST_SEEN_KEY, &value) {
            log::warn!("Failed to persist last-seen mark: {err}");
        }
    }

    fn read(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(LAST_SEEN_KEY)? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| StoreError::InvalidTimestamp(raw))
    }
}

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sync::SyncConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

/// Upper bound for `unread_floor_secs` (30 days).
const MAX_UNREAD_FLOOR_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Shared message store.
    #[serde(default = "default_messages_db")]
    pub messages_db: String,
    /// Local state such as the last-seen mark.
    #[serde(default = "default_local_state_db")]
    pub local_state_db: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_unread_floor_secs")]
    pub unread_floor_secs: u64,
    #[serde(default = "default_feed_poll_ms")]
    pub feed_poll_ms: u64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub dark_mode: bool,
}

fn default_messages_db() -> String {
    "data/chat.db".to_string()
}

fn default_local_state_db() -> String {
    "data/client.db".to_string()
}

fn default_page_size() -> usize {
    50
}

fn default_unread_floor_secs() -> u64 {
    5 * 60
}

fn default_feed_poll_ms() -> u64 {
    500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            messages_db: default_messages_db(),
            local_state_db: default_local_state_db(),
            page_size: default_page_size(),
            unread_floor_secs: default_unread_floor_secs(),
            feed_poll_ms: default_feed_poll_ms(),
            display_name: None,
            privileged: false,
            dark_mode: false,
        }
    }
}

impl AppConfig {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            page_size: self.page_size.max(1),
            unread_floor: chrono::Duration::seconds(
                self.unread_floor_secs.min(MAX_UNREAD_FLOOR_SECS) as i64,
            ),
        }
    }

    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed_poll_ms.max(10))
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

pub fn persist_display_name(path: &str, name: &str) {
    let mut config = load_config(path);
    config.display_name = Some(name.to_string());

    if let Err(err) = save_config(path, &config) {
        log::error!("Failed to write config {}: {err}", path);
    } else {
        log::info!("Persisted display name to {}", path);
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::message_store::SqliteMessageStore;

/// Consumed change-log rows are kept this long for other readers.
const CHANGE_RETENTION_SECS: i64 = 60 * 60;
const PRUNE_EVERY_TICKS: u64 = 600;

/// Background task polling the change log and broadcasting new rows.
/// Aborted on drop.
pub struct ChangeFeedTask {
    handle: JoinHandle<()>,
}

impl ChangeFeedTask {
    pub fn spawn(store: Arc<SqliteMessageStore>, poll_interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u64 = 0;

            log::info!("Change feed polling every {poll_interval:?}");
            loop {
                ticker.tick().await;
                ticks = ticks.wrapping_add(1);

                match store.pump_changes() {
                    Ok(0) => {}
                    Ok(published) => log::debug!("Broadcast {published} change events"),
                    Err(err) => log::warn!("Change feed poll failed: {err}"),
                }

                if ticks % PRUNE_EVERY_TICKS == 0 {
                    match store.prune_changes(CHANGE_RETENTION_SECS) {
                        Ok(0) => {}
                        Ok(removed) => log::debug!("Pruned {removed} change-log rows"),
                        Err(err) => log::warn!("Change-log prune failed: {err}"),
                    }
                }
            }
        });

        Self { handle }
    }
}

impl Drop for ChangeFeedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

use tokio::sync::mpsc;

use crate::common::{ChatCommand, ChatEvent};
use crate::storage::local_state::KeyValueStore;

use super::engine::ChatSyncEngine;
use super::remote::MessageStore;

/// Owns the sync engine on the async runtime and bridges it to the UI.
pub struct ChatWorker<S, K> {
    engine: ChatSyncEngine<S, K>,
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
}

impl<S: MessageStore, K: KeyValueStore> ChatWorker<S, K> {
    pub fn new(
        engine: ChatSyncEngine<S, K>,
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
    ) -> Self {
        Self {
            engine,
            event_sender,
            command_receiver,
        }
    }

    /// Run until the UI drops its command sender.
    pub async fn run(mut self) {
        // The view starts hidden: track unread until someone opens it.
        self.engine.close().await;
        self.publish_snapshot().await;
        log::info!("Chat worker started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command).await;
                    } else {
                        break;
                    }
                }
                Some(event) = self.engine.next_change() => {
                    self.engine.handle_feed_event(event).await;
                    self.publish_snapshot().await;
                }
            }
        }

        self.engine.detach();
        log::info!("Chat worker stopped");
    }

    async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::SetOpen(open) => {
                self.engine.set_open(open).await;
                self.publish_snapshot().await;
            }
            ChatCommand::SendMessage {
                text,
                author,
                is_privileged,
            } => {
                if !self.engine.send(&text, &author, is_privileged).await {
                    self.publish(ChatEvent::SendFailed).await;
                }
            }
            ChatCommand::DeleteMessage(id) => {
                if !self.engine.delete_message(&id).await {
                    self.publish(ChatEvent::DeleteFailed).await;
                }
            }
            ChatCommand::LoadMore => {
                self.engine.load_more().await;
                self.publish_snapshot().await;
            }
        }
    }

    async fn publish_snapshot(&mut self) {
        let snapshot = self.engine.snapshot();
        self.publish(ChatEvent::Snapshot(snapshot)).await;
    }

    async fn publish(&mut self, event: ChatEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::mpsc;

use misemestre_chat::common::{ChatCommand, ChatEvent, Clock, Session, SystemClock};
use misemestre_chat::config::{self, AppConfig};
use misemestre_chat::storage::{
    self, ChangeFeedTask, LastSeen, SqliteKeyValueStore, SqliteMessageStore,
};
use misemestre_chat::sync::{ChatSyncEngine, ChatWorker};
use misemestre_chat::ui::ChatApp;

type Engine = ChatSyncEngine<SqliteMessageStore, SqliteKeyValueStore>;

#[derive(Parser)]
#[command(
    name = "misemestre-chat",
    version,
    about = "MiSemestre community chat client"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Display name to chat as (overrides the config file)
    #[arg(long)]
    name: Option<String>,
    /// Send as a moderator; enables deleting messages
    #[arg(long)]
    privileged: bool,
    /// Message store database (overrides the config file)
    #[arg(long, value_name = "FILE")]
    database: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Mode {
    /// Run without UI and log chat activity until Ctrl-C
    Watch {
        /// Follow messages live instead of only counting unread ones
        #[arg(long)]
        open: bool,
    },
    /// Send a single message and exit
    Post { text: String },
}

impl Cli {
    fn apply_overrides(&self, app_config: &mut AppConfig) {
        if let Some(name) = &self.name {
            app_config.display_name = Some(name.clone());
        }
        if self.privileged {
            app_config.privileged = true;
        }
        if let Some(database) = &self.database {
            app_config.messages_db = database.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    cli.apply_overrides(&mut app_config);

    storage::ensure_parent_dir(&app_config.messages_db)?;
    storage::ensure_parent_dir(&app_config.local_state_db)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(SqliteMessageStore::with_path(
        &app_config.messages_db,
        clock.clone(),
    )?);
    let engine = ChatSyncEngine::new(
        store.clone(),
        LastSeen::new(SqliteKeyValueStore::with_path(&app_config.local_state_db)?),
        clock,
        app_config.sync_config(),
    );
    let session = Session::new(
        app_config.display_name.clone().unwrap_or_default(),
        app_config.privileged,
    );

    match cli.mode {
        Some(Mode::Post { text }) => run_post(engine, session, &text).await,
        Some(Mode::Watch { open }) => {
            let _feed = ChangeFeedTask::spawn(store, app_config.feed_poll_interval());
            run_watch(engine, open).await;
            Ok(())
        }
        None => {
            let _feed = ChangeFeedTask::spawn(store, app_config.feed_poll_interval());
            run_full_client(engine, session, &app_config, cli.config).await
        }
    }
}

async fn run_post(mut engine: Engine, session: Session, text: &str) -> Result<(), Box<dyn Error>> {
    if !session.is_signed_in() {
        return Err("a display name is required; pass --name or set it in the config".into());
    }

    if engine
        .send(text, &session.display_name, session.is_privileged)
        .await
    {
        log::info!("Message sent as {}", session.display_name);
        Ok(())
    } else {
        Err("failed to send message".into())
    }
}

async fn run_watch(engine: Engine, open: bool) {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let worker = tokio::spawn(ChatWorker::new(engine, event_tx, cmd_rx).run());
    if open {
        if let Err(err) = cmd_tx.send(ChatCommand::SetOpen(true)).await {
            log::warn!("Failed to open chat: {err}");
        }
    }

    let mut shown = 0usize;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(ChatEvent::Snapshot(snapshot)) if snapshot.is_open => {
                    for message in snapshot.messages.iter().skip(shown) {
                        log::info!("[{}] {}", message.author, message.text);
                    }
                    shown = snapshot.messages.len();
                }
                Some(ChatEvent::Snapshot(snapshot)) => {
                    log::info!("Unread messages: {}", snapshot.unread_count);
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(cmd_tx);
    if let Err(err) = worker.await {
        log::error!("Chat worker terminated: {err}");
    }
}

async fn run_full_client(
    engine: Engine,
    session: Session,
    app_config: &AppConfig,
    config_path: String,
) -> Result<(), Box<dyn Error>> {
    // UI -> worker
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // worker -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    tokio::spawn(ChatWorker::new(engine, event_tx, cmd_rx).run());

    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);
    let dark_mode = app_config.dark_mode;

    eframe::run_native(
        "MiSemestre Chat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");

            log::info!("Client started as {:?}", session.display_name);

            Ok(Box::new(ChatApp::new(
                cc,
                cmd_tx.clone(),
                event_receiver,
                session.clone(),
                dark_mode,
                config_path.clone(),
            )))
        }),
    )?;

    Ok(())
}

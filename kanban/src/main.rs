//! `kanban`: terminal kanban board synchronized through a live document store.
//!
//! Launches the TUI and connects to a `kanban-store` server. Without a store
//! URL, or when the store cannot be reached, the board runs offline on an
//! in-memory store. Configuration via CLI flags, environment variables, or
//! config file (`~/.config/kanban/config.toml`).
//!
//! ```bash
//! # Offline board
//! cargo run --bin kanban
//!
//! # Connect to a store
//! cargo run --bin kanban -- --store-url ws://127.0.0.1:9100/ws \
//!     --project-id real-time --access-key s3cret
//!
//! # Or via environment variables
//! KANBAN_STORE_URL=ws://127.0.0.1:9100/ws cargo run --bin kanban
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use kanban::app::App;
use kanban::config::{CliArgs, ClientConfig};
use kanban::remote::memory::MemoryStore;
use kanban::remote::ws::WsStore;
use kanban::sync::{self, SyncCommand, SyncEvent};
use kanban::ui;

/// Channels to the sync worker plus a description for the status bar.
struct Connection {
    commands: mpsc::Sender<SyncCommand>,
    events: mpsc::Receiver<SyncEvent>,
    info: String,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load configuration: {e}");
            ClientConfig::default()
        }
    };

    // Initialize logging before terminal setup (logs go to file, not stdout).
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("kanban starting");

    // Connect before taking over the terminal so a slow store is visible.
    let connection = connect(&config).await?;

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app.
    let result = run_app(&mut terminal, connection, &config);

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("kanban exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, since ratatui owns the terminal).
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("kanban.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Starts syncing against the configured store, or offline.
async fn connect(config: &ClientConfig) -> io::Result<Connection> {
    if let Some(store_config) = config.to_store_config() {
        match WsStore::connect(store_config).await {
            Ok(store) => {
                let info = store.url().to_string();
                match sync::spawn_sync(Arc::new(store), config.channel_capacity).await {
                    Ok((commands, events)) => {
                        return Ok(Connection {
                            commands,
                            events,
                            info,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(url = %info, error = %e, "subscribe failed, running offline");
                    }
                }
            }
            // WsStore::connect logs the url and cause.
            Err(e) => tracing::warn!(error = %e, "store unreachable, running offline"),
        }
    }

    let store = Arc::new(MemoryStore::new(config.collection.clone()));
    let (commands, events) = sync::spawn_sync(store, config.channel_capacity)
        .await
        .map_err(io::Error::other)?;
    Ok(Connection {
        commands,
        events,
        info: "local memory (offline)".to_string(),
    })
}

/// Main application loop.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut connection: Connection,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new();
    app.set_connection(true, connection.info.clone());

    loop {
        // Step 1: Draw the UI frame.
        terminal.draw(|frame| ui::draw(frame, &app, &config.timestamp_format))?;

        // Step 2: Drain all pending SyncEvents (non-blocking).
        while let Ok(event) = connection.events.try_recv() {
            app.apply_event(event);
        }

        // Step 3: Poll for terminal input events.
        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            if let Some(cmd) = app.handle_key_event(key) {
                match connection.commands.try_send(cmd) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(cmd)) => {
                        tracing::warn!(?cmd, "sync busy, command dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(cmd)) => {
                        tracing::warn!(?cmd, "sync stopped, command dropped");
                    }
                }
            }
        }

        if app.should_quit {
            let _ = connection.commands.try_send(SyncCommand::Shutdown);
            return Ok(());
        }
    }
}

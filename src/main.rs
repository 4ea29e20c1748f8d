// lode - headless console for a log search service
//
// Pages through search results, tails new logs live over a websocket, and
// streams answers from a chat channel grounded on logs the user pins.
//
// Architecture:
// - State (state.rs): pure container; every operation returns effects
// - Console (console.rs): tokio::select! loop that executes effects
// - Transport: reqwest for search, tokio-tungstenite for tail and chat
// - Commands: one per stdin line, parsed on a dedicated reader thread
// - Event system: mpsc channels connect all components

mod chat;
mod cli;
mod command;
mod config;
mod console;
mod events;
mod logging;
mod mode;
mod model;
mod query;
mod render;
mod selection;
mod state;
mod tail;
mod transport;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use command::{Command, CommandError};
use config::{Config, VERSION};
use console::Console;
use logging::{DiagnosticBuffer, DiagnosticLayer};
use state::ConsoleState;
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use transport::{HttpBackend, WsConnector};

/// Commands buffered between the stdin thread and the console
const COMMAND_BUFFER: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config --show, --reset, --path)
    let cli = Cli::parse();
    if cli::handle_cli(&cli)? {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    let diagnostics = DiagnosticBuffer::new();
    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = init_tracing(&config, &diagnostics);

    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        "lode {} starting",
        VERSION
    );

    let backend = HttpBackend::new(&config.api_url, config.timing.request_timeout())?;
    let connector = WsConnector::new(&config.ws_url);
    let mut console = Console::new(
        ConsoleState::new(config.state_settings()),
        backend,
        connector,
    );

    let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
    if cli.live {
        let _ = tx.send(Command::SetLive(true)).await;
    }
    if cli.chat {
        let _ = tx.send(Command::OpenChat).await;
    }

    // Blocking reads on a plain thread: a pending stdin read must not hold up
    // runtime shutdown after `quit`
    std::thread::spawn(move || read_commands(tx));

    let mut stdout = std::io::stdout();
    console.run(&mut rx, &diagnostics, &mut stdout).await?;

    tracing::info!("lode stopped");
    Ok(())
}

/// Initialize tracing
///
/// Precedence: RUST_LOG env var > config file > default "info" for lode targets.
/// Human-readable logs go to stderr so they never mix with command output;
/// warnings and errors are also kept in `diagnostics` for `show diag`; file
/// logging (JSON, rotating) is optional.
fn init_tracing(
    config: &Config,
    diagnostics: &DiagnosticBuffer,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter_directive().into());

    let mut guard = None;
    let file_layer = if config.logging.file_enabled {
        match std::fs::create_dir_all(&config.logging.file_dir) {
            Ok(()) => {
                let file_appender = config
                    .logging
                    .file_rotation
                    .appender(&config.logging.file_dir, &config.logging.file_prefix);

                // Writes happen on a background thread
                let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(file_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not create log directory {:?}: {}",
                    config.logging.file_dir, e
                );
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(DiagnosticLayer::new(diagnostics.clone()))
        .with(file_layer)
        .init();

    guard
}

/// Parse stdin lines into commands until EOF, `quit`, or the console goes away
fn read_commands(tx: mpsc::Sender<Command>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };
        match Command::parse(&line) {
            Ok(command) => {
                let quit = command == Command::Quit;
                if tx.blocking_send(command).is_err() || quit {
                    break;
                }
            }
            Err(CommandError::Empty) => {}
            Err(e) => eprintln!("{}", e),
        }
    }
}

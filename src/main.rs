//! Trivia Host Back binary entrypoint: loads a board, runs one match and speaks JSON lines over stdio.

use std::{env, fs};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_host_back::{
    config::MatchConfig,
    dto::{board::BoardInput, commands::ClientMessage, events::ServerEvent},
    services::match_service,
    state::{AppState, context::wait_for_shutdown},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let board_path = env::args()
        .nth(1)
        .context("usage: trivia-host-back <board.json>")?;
    let raw = fs::read_to_string(&board_path)
        .with_context(|| format!("reading board file {board_path}"))?;
    let board = BoardInput::from_json_str(&raw).context("loading board")?;

    let app = AppState::new(MatchConfig::load());
    let printer = tokio::spawn(print_events(app.hub().subscribe()));
    let sweeper = tokio::spawn(match_service::run_sweeper(app.clone()));

    let ctx = match_service::create_match(&app, board.into());
    info!(code = %ctx.code(), "match open; reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = ctx.shutdown_signal();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("match finished");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    info!("stdin closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let outcome = match ClientMessage::from_json_str(line) {
                    Ok(message) => match_service::handle_client_message(&ctx, message).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = outcome {
                    warn!(error = %err, "command rejected");
                }
            }
        }
    }

    if let Err(err) = match_service::stop_match(&app, ctx.id()).await {
        warn!(error = %err, "match already removed");
    }
    sweeper.abort();
    printer.abort();
    Ok(())
}

/// Print every hub event to stdout as one JSON object per line.
async fn print_events(mut events: broadcast::Receiver<ServerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let data = event
                    .payload()
                    .unwrap_or_else(|_| serde_json::Value::String(event.data.clone()));
                let line = serde_json::json!({
                    "topic": event.topic,
                    "room": event.room,
                    "data": data,
                });
                println!("{line}");
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Configure tracing subscribers; logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

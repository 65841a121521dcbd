//! LearnConnect Chat
//!
//! Terminal host for a study group's chat: prints the connection status and
//! incoming messages, and sends every line typed on stdin.
//!
//! Usage: `LEARNCONNECT_TOKEN=... learnconnect-chat <group-id>`

use anyhow::anyhow;
use learnconnect_chat::chat::{ChannelId, ChatManager, Message};
use learnconnect_chat::config::Config;
use std::collections::HashSet;
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let group = env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: learnconnect-chat <group-id>"))?;

    // The host sources the credential; the library never reads it itself.
    let token = env::var("LEARNCONNECT_TOKEN").unwrap_or_default();

    let config = Config::from_env();
    info!(
        api = %config.api.base_url,
        ws = %config.ws_base_url(),
        reconnect_delay_ms = config.reconnect.delay_ms,
        "Configuration loaded"
    );

    let mut manager = ChatManager::new(config)?;
    let session = manager.activate(ChannelId::new(group), &token);

    let mut state_rx = session.subscribe_state();
    let mut messages_rx = session.subscribe_messages();
    let mut shown = HashSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("[{}]", session.state());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                println!("[{}]", state);
            }
            changed = messages_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let history = messages_rx.borrow_and_update();
                for message in history.messages() {
                    if shown.insert(message.id) {
                        println!("{}", render(message));
                    }
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => session.send(&line),
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    manager.teardown();
    info!("Chat closed");
    Ok(())
}

fn render(message: &Message) -> String {
    format!(
        "{} {}: {}",
        message.created_at.format("%H:%M"),
        message.user.name,
        message.content
    )
}

/// Resolve on Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

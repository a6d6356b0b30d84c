//! # agui
//!
//! Terminal client for an AG-UI card stream. Connects, prints lifecycle and
//! event activity, and forwards stdin lines to the server as user messages.
//!
//! Lines starting with `/` are local commands: `/connect`, `/disconnect`,
//! `/cards`, `/messages`, `/state`, `/log`, `/cancel <id>`, `/quit`.

#![deny(unsafe_code)]

use std::path::PathBuf;

use agui_client::{AguiClient, LifecycleEvent, SendOutcome};
use agui_core::logging::{DEFAULT_LEVEL, init_json_subscriber, init_subscriber};
use agui_settings::{ClientSettings, load_settings_from_path, settings_path};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// AG-UI card stream client.
#[derive(Parser, Debug)]
#[command(name = "agui", about = "AG-UI card stream client")]
struct Cli {
    /// Server host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.agui/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `info` or `agui_client=debug`.
    #[arg(long, default_value = DEFAULT_LEVEL)]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Disable automatic reconnect.
    #[arg(long)]
    no_reconnect: bool,
}

impl Cli {
    fn resolve_settings(&self) -> Result<ClientSettings> {
        let path = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if self.no_reconnect {
            settings.auto_reconnect = false;
        }
        settings
            .validate()
            .context("Invalid settings after command-line overrides")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    if args.json_logs {
        init_json_subscriber(&args.log_level);
    } else {
        init_subscriber(&args.log_level);
    }

    let settings = args.resolve_settings().inspect_err(|e| {
        tracing::error!(error = %e, "settings rejected");
    })?;
    tracing::info!(
        endpoint = %settings.endpoint(),
        auto_reconnect = settings.auto_reconnect,
        "starting"
    );
    println!("connecting to {}", settings.endpoint());

    let client = AguiClient::new(settings).context("Failed to create client")?;
    let _ = client.on_any_event(|event| {
        println!("<- {}", event.kind());
        Ok(())
    });
    let printer = tokio::spawn(print_lifecycle(client.subscribe()));
    client.connect().await.context("Failed to start connection")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                if !handle_line(&client, line.trim()).await {
                    break;
                }
            }
        }
    }

    tracing::info!("shutting down");
    let _ = client.disconnect().await;
    client.shutdown().await;
    printer.abort();
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(client: &AguiClient, line: &str) -> bool {
    match line.split_once(' ').unwrap_or((line, "")) {
        ("", _) => {}
        ("/quit", _) => return false,
        ("/connect", _) => {
            if let Err(e) = client.connect().await {
                println!("cannot connect: {e}");
            }
        }
        ("/disconnect", _) => match client.disconnect().await {
            Ok(()) => println!("disconnected"),
            Err(e) => println!("cannot disconnect: {e}"),
        },
        ("/cards", _) => {
            for card in client.cards() {
                println!(
                    "{:<24} {:<10} {:>3}%  {}",
                    card.id.as_str(),
                    card.status.as_str(),
                    card.progress,
                    card.title
                );
            }
        }
        ("/messages", _) => {
            for message in client.messages() {
                let marker = if message.streaming { "…" } else { "" };
                println!("[{}] {}{marker}", message.role, message.content);
            }
        }
        ("/state", _) => match serde_json_pretty(&client.shared_state()) {
            Some(text) => println!("{text}\nrun: {:?}", client.run_status()),
            None => println!("run: {:?}", client.run_status()),
        },
        ("/log", _) => {
            for entry in client.event_log() {
                println!("{} {:<10} {}", entry.timestamp, entry.category.as_str(), entry.payload);
            }
        }
        ("/cancel", id) => match client.cancel_card(id.trim()) {
            Ok(card) => println!("cancelled {}", card.id),
            Err(e) => println!("cannot cancel: {e}"),
        },
        _ => match client.send_user_message(line).await {
            SendOutcome::Sent => {}
            SendOutcome::Queued => println!("(queued until connected)"),
            SendOutcome::Failed(e) => println!("send failed: {e}"),
        },
    }
    true
}

fn serde_json_pretty(state: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    if state.is_empty() {
        return None;
    }
    serde_json::to_string_pretty(state).ok()
}

async fn print_lifecycle(mut events: broadcast::Receiver<LifecycleEvent>) {
    loop {
        match events.recv().await {
            Ok(LifecycleEvent::EventLogged(_)) => {}
            Ok(LifecycleEvent::Reconnecting {
                attempt,
                max_attempts,
                delay,
            }) => println!(
                "reconnecting ({attempt}/{max_attempts}) in {}ms",
                delay.as_millis()
            ),
            Ok(LifecycleEvent::ReconnectFailed { attempts }) => {
                println!("gave up after {attempts} attempts; type /connect to retry");
            }
            Ok(LifecycleEvent::Error(e)) => println!("error [{}]: {e}", e.error_kind()),
            Ok(event) => println!("{}", event.name()),
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

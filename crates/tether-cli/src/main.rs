//! # tether
//!
//! Command-line host for the streaming client. Connects to a backend, prints
//! every event as a JSON line on stdout and sends stdin lines as messages.
//! `/approve <id>`, `/deny <id>` and `/answer <id> <text>` answer prompts.

#![deny(unsafe_code)]

mod input;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use serde_json::json;
use tether_client::{Client, ClientConfig, ClientEvent, Endpoint};
use tether_protocol::OutgoingMessage;
use tether_settings::{TetherSettings, load_settings, load_settings_from_path};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use input::Input;

/// Streaming client for the agent backend.
#[derive(Parser, Debug)]
#[command(name = "tether", about = "Streaming client for the agent backend")]
struct Cli {
    /// WebSocket endpoint (overrides settings).
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token (overrides settings).
    #[arg(long, env = "TETHER_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Resume this session on attach.
    #[arg(long)]
    session: Option<String>,

    /// Settings file (default: `~/.tether/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn load(cli: &Cli) -> Result<TetherSettings> {
    match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => load_settings().context("Failed to load settings"),
    }
}

fn endpoint(cli: &Cli, settings: &TetherSettings) -> Result<Endpoint> {
    let mut endpoint = match (&cli.endpoint, Endpoint::from_settings(settings)) {
        (Some(url), from_settings) => Endpoint {
            url: url.clone(),
            ..from_settings.unwrap_or_else(|| Endpoint::new(url.clone()))
        },
        (None, Some(from_settings)) => from_settings,
        (None, None) => bail!("No endpoint: pass --endpoint or set connection.endpoint"),
    };
    if let Some(token) = &cli.token {
        endpoint.auth_token = Some(token.clone());
    }
    if let Some(session) = &cli.session {
        endpoint = endpoint.resume_session(session.as_str());
    }
    Ok(endpoint)
}

fn print_event(event: &ClientEvent) {
    let line = json!({
        "receivedAt": chrono::Utc::now().to_rfc3339(),
        "epoch": event.epoch,
        "event": event.event,
        "sessionId": event.session.as_ref().map(|s| s.id.as_str()),
    });
    println!("{line}");
}

async fn handle_line(client: &Client, line: &str) -> Result<bool> {
    match input::parse(line) {
        Input::Nothing => {}
        Input::Message(text) => {
            let token = client.send(OutgoingMessage::text(text))?;
            info!(token = %token, "message queued");
        }
        Input::Respond {
            request_id,
            outcome,
        } => {
            let accepted = client
                .respond_to_interaction(request_id.as_str(), outcome)
                .await?;
            if !accepted {
                eprintln!("no pending request {request_id}");
            }
        }
        Input::Status => {
            let summary = client.snapshot().summary();
            eprintln!("{}", serde_json::to_string(&summary)?);
        }
        Input::Invalid(message) => eprintln!("{message}"),
        Input::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        tether_core::logging::init_json_subscriber(&cli.log_level);
    } else {
        tether_core::logging::init_subscriber(&cli.log_level);
    }

    let settings = load(&cli)?;
    let endpoint = endpoint(&cli, &settings)?;
    let client = Client::spawn(ClientConfig::from_settings(&settings));

    let mut events = Box::pin(client.events());
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            print_event(&event);
        }
    });

    info!(url = %endpoint.url, "connecting");
    client.connect(endpoint)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !handle_line(&client, &line).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    info!("shutting down");
    client.disconnect().await?;
    // Let the printer flush what was already emitted.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    if let Err(e) = printer.await {
        if !e.is_cancelled() {
            warn!(error = %e, "event printer failed");
        }
    }
    Ok(())
}

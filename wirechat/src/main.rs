//! `wirechat`, a resilient direct-message sync client.
//!
//! Headless line-oriented frontend over the sync layer: opens one
//! conversation, prints the reconciled timeline as it changes, and sends
//! each stdin line as a message. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/wirechat/config.toml`).
//!
//! ```bash
//! cargo run --bin wirechat -- \
//!     --base-url http://127.0.0.1:8080/api \
//!     --ws-url ws://127.0.0.1:8080/api/chat/ws \
//!     --token "$TOKEN" --user-id "$ME" --peer "$PEER"
//! ```
//!
//! Commands: `/search <text>` looks up users; `/quit` exits.

use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use wirechat::api::http::HttpChatApi;
use wirechat::auth::SessionTokens;
use wirechat::client::ChatClient;
use wirechat::config::{AppConfig, CliArgs};
use wirechat::conn::ConnectionState;
use wirechat::reconcile::{DeliveryState, TimelineEntry};
use wirechat::search::SearchOutcome;
use wirechat::transport::ws::WsDialer;
use wirechat_proto::message::UserId;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("warning: failed to load config file: {e}");
            AppConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("wirechat starting");

    match run(&cli, config).await {
        Ok(()) => {
            tracing::info!("wirechat exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &CliArgs, config: AppConfig) -> Result<(), String> {
    let base_url = config
        .base_url
        .as_deref()
        .ok_or("missing --base-url (or [server] base_url in config)")?;
    let base_url = url::Url::parse(base_url).map_err(|e| format!("invalid base URL: {e}"))?;
    let ws_url = config
        .ws_url
        .as_deref()
        .ok_or("missing --ws-url (or [server] ws_url in config)")?;
    let ws_url = url::Url::parse(ws_url).map_err(|e| format!("invalid WebSocket URL: {e}"))?;
    let token = config.token.as_deref().ok_or("missing --token")?;
    let user_id = cli
        .user_id
        .as_deref()
        .ok_or("missing --user-id")
        .and_then(|s| UserId::from_str(s).map_err(|_| "invalid --user-id, expected a UUID"))?;
    let peer = cli
        .peer
        .as_deref()
        .ok_or("missing --peer")
        .and_then(|s| UserId::from_str(s).map_err(|_| "invalid --peer, expected a UUID"))?;

    let credentials = Arc::new(SessionTokens::new(token));
    let dialer = Arc::new(WsDialer::new(ws_url).with_connect_timeout(config.connect_timeout));
    let api = Arc::new(HttpChatApi::new(base_url));
    let (client, mut search_rx) =
        ChatClient::new(dialer, api, credentials, user_id, config.client.clone());

    client
        .connect()
        .map_err(|e| format!("cannot connect: {e}"))?;
    client
        .open_conversation(peer)
        .await
        .map_err(|e| format!("cannot open conversation: {e}"))?;
    print_timeline(&client.conversation(peer));

    let mut revision_rx = client.subscribe_store();
    revision_rx.mark_unchanged();
    let mut state_rx = client.subscribe_connection();
    state_rx.mark_unchanged();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = revision_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_timeline(&client.conversation(peer));
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                print_state(&state);
            }
            outcome = search_rx.recv() => {
                match outcome {
                    Some(outcome) => print_search(&outcome),
                    None => break,
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(&client, peer, &line).await {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    client.shutdown();
    Ok(())
}

/// Dispatches one stdin line. Returns `false` to quit.
async fn handle_line(
    client: &ChatClient<WsDialer, HttpChatApi, SessionTokens>,
    peer: UserId,
    line: &str,
) -> bool {
    let line = line.trim();
    if line == "/quit" {
        return false;
    }
    if let Some(query) = line.strip_prefix("/search") {
        client.search(query);
        return true;
    }
    if line.is_empty() {
        return true;
    }
    if let Err(e) = client.send_message(peer, line).await {
        eprintln!("send failed: {e}");
    }
    true
}

fn print_timeline(entries: &[TimelineEntry]) {
    println!("--- {} message(s) ---", entries.len());
    for entry in entries {
        let marker = match entry.state {
            DeliveryState::Confirmed => ' ',
            DeliveryState::Pending => '?',
            DeliveryState::Failed => '!',
        };
        println!(
            "{marker} [{}] {}: {}",
            entry.message.created_at.format("%H:%M:%S"),
            entry.message.from_id,
            entry.message.content
        );
    }
}

fn print_state(state: &ConnectionState) {
    match state {
        ConnectionState::Disconnected => println!("* disconnected"),
        ConnectionState::Connecting => println!("* connecting..."),
        ConnectionState::Connected => println!("* connected"),
        ConnectionState::Backoff { attempt, delay } => {
            println!("* reconnecting (attempt {attempt}, in {}ms)", delay.as_millis());
        }
    }
}

fn print_search(outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::Results(users) => {
            for user in users {
                println!("@ {} <{}> ({})", user.username, user.email, user.id);
            }
        }
        SearchOutcome::Cleared => println!("@ (cleared)"),
        SearchOutcome::Failed(e) => eprintln!("search failed: {e}"),
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so they don't interleave with the printed timeline.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure
/// all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("wirechat.log");
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

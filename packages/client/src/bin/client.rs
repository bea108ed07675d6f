//! Terminal chat client with automatic reconnection.
//!
//! Connects to a hiroba relay server and sends messages typed at the prompt.
//! The conversation log, including connection progress and errors, is
//! printed as it grows.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- --nickname alice
//! cargo run --bin hiroba-client -- -n bob -u ws://127.0.0.1:3033/ws
//! ```

use std::time::Duration;

use clap::Parser;
use hiroba_client::{
    ClientConfig, ClientError, ConnectionManager, SessionEvent, formatter::MessageFormatter,
    ui::redisplay_prompt,
};
use hiroba_shared::logger::setup_logger;
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "hiroba-client")]
#[command(about = "WebSocket chat client with automatic reconnection", long_about = None)]
struct Args {
    /// Nickname attached to your messages
    #[arg(short = 'n', long, env = "HIROBA_NICKNAME", default_value = "user")]
    nickname: String,

    /// WebSocket server URL
    #[arg(
        short = 'u',
        long,
        env = "HIROBA_URL",
        default_value = "ws://127.0.0.1:3033/ws"
    )]
    url: String,

    /// Seconds between reconnection attempts
    #[arg(long, default_value = "1")]
    reconnect_interval_secs: u64,

    /// Give up after this many failed attempts in a row (unlimited if omitted)
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// Seconds to wait for the server to acknowledge a message
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    ack_timeout_secs: u64,

    /// Keep only this many log entries (unlimited if omitted)
    #[arg(long)]
    log_capacity: Option<usize>,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self {
            url: args.url,
            nickname: args.nickname,
            reconnect_interval: Duration::from_secs(args.reconnect_interval_secs),
            max_reconnect_attempts: args.max_reconnect_attempts,
            ack_timeout: Duration::from_secs(args.ack_timeout_secs),
            log_capacity: args.log_capacity,
        }
    }
}

/// Read lines on a blocking thread (rustyline is synchronous)
fn spawn_readline(nickname: String, input_tx: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", nickname);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    if input_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    tracing::info!("Input closed");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let config = ClientConfig::from(Args::parse());
    let nickname = config.nickname.clone();

    let mut manager = ConnectionManager::new(config);
    for entry in manager.messages() {
        print!("{}", MessageFormatter::format_entry(&entry, &nickname));
    }

    let listener_nickname = nickname.clone();
    let subscription = manager.subscribe(move |event| match event {
        SessionEvent::MessageAppended(entry) => {
            print!("\r{}", MessageFormatter::format_entry(entry, &listener_nickname));
            redisplay_prompt(&listener_nickname);
        }
        SessionEvent::StateChanged(state) => {
            tracing::debug!("{}", MessageFormatter::format_state(state).trim_end());
        }
    });
    manager.start();

    println!(
        "\nYou are '{}'. Type messages and press Enter to send. Press Ctrl+C to exit.\n",
        nickname
    );

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    spawn_readline(nickname.clone(), input_tx);

    while let Some(line) = input_rx.recv().await {
        match manager.send_message(&line) {
            Ok(()) => {}
            Err(ClientError::NotConnected) => {
                println!("Not connected; message was not sent.");
            }
            Err(ClientError::Closed) => {
                tracing::error!("Connection manager stopped");
                break;
            }
            Err(ClientError::EmptyMessage) => {}
        }
    }

    subscription.unsubscribe();
    manager.dispose().await;
}

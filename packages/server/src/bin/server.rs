//! Hiroba chat relay server.
//!
//! Receives chat events from clients, validates them and relays them to the
//! connected clients according to the delivery policy.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000 --delivery-policy echo
//! ```

use std::time::Duration;

use clap::Parser;
use hiroba_server::{DeliveryPolicy, Server, ServerConfig};
use hiroba_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "WebSocket chat relay with broadcast support", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HIROBA_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "HIROBA_PORT", default_value = "3033")]
    port: u16,

    /// Who receives a validated chat message
    #[arg(
        short = 'd',
        long,
        env = "HIROBA_DELIVERY_POLICY",
        value_enum,
        default_value_t = DeliveryPolicy::Broadcast
    )]
    delivery_policy: DeliveryPolicy,

    /// Allowed CORS origin ("*" allows any origin)
    #[arg(long, env = "HIROBA_CORS_ORIGIN", default_value = "*")]
    cors_origin: String,

    /// Seconds between server pings
    #[arg(long, default_value = "25", value_parser = clap::value_parser!(u64).range(1..))]
    ping_interval_secs: u64,

    /// Seconds of extra silence tolerated after a ping
    #[arg(long, default_value = "5")]
    ping_timeout_secs: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            delivery_policy: args.delivery_policy,
            cors_origin: args.cors_origin,
            ping_interval: Duration::from_secs(args.ping_interval_secs),
            ping_timeout: Duration::from_secs(args.ping_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let config = ServerConfig::from(Args::parse());
    if config.cors_origin == "*" {
        tracing::warn!("CORS allows any origin; restrict --cors-origin in production");
    }

    let server = Server::from_config(config);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

//! Chat and presence server for a self-hosted live stream.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin castchat-server
//! cargo run --bin castchat-server -- --host 0.0.0.0 --port 8080 --server-name "My Stream"
//! ```

use std::path::PathBuf;

use castchat_server::{
    app::{ServerConfig, build_server},
    infrastructure::config::{ChatSettings, DEFAULT_SECONDS_PER_SEGMENT, DEFAULT_SERVER_NAME},
    usecase::{
        HubSettings, RateLimitSettings,
        rate_limiter::{DEFAULT_BURST, DEFAULT_MESSAGES_PER_SECOND},
    },
};
use castchat_shared::logger::setup_logger;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "castchat-server")]
#[command(about = "Chat and presence hub for a self-hosted live stream", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Name used as the author of system and welcome messages
    #[arg(long, default_value = DEFAULT_SERVER_NAME)]
    server_name: String,

    /// Message sent to each viewer shortly after they connect
    #[arg(long, default_value = "")]
    welcome_message: String,

    /// Start with chat disabled
    #[arg(long)]
    chat_disabled: bool,

    /// Video segment length, used to decide when a new stream counts as live
    #[arg(long, default_value_t = DEFAULT_SECONDS_PER_SEGMENT)]
    seconds_per_segment: u64,

    /// JSON file to persist viewer stats across restarts
    #[arg(long)]
    stats_file: Option<PathBuf>,

    /// JSON Lines file to persist chat history across restarts
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Chat messages a session may send per second, sustained
    #[arg(long, default_value_t = DEFAULT_MESSAGES_PER_SECOND)]
    rate_limit_per_second: f64,

    /// Chat messages a session may send in a burst
    #[arg(long, default_value_t = DEFAULT_BURST)]
    rate_limit_burst: u32,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let config = ServerConfig {
        chat: ChatSettings {
            server_name: args.server_name,
            welcome_message: args.welcome_message,
            chat_disabled: args.chat_disabled,
            seconds_per_segment: args.seconds_per_segment,
        },
        rate_limit: RateLimitSettings {
            messages_per_second: args.rate_limit_per_second,
            burst: args.rate_limit_burst,
        },
        hub: HubSettings::default(),
        stats_file: args.stats_file,
        history_file: args.history_file,
    };

    let server = match build_server(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

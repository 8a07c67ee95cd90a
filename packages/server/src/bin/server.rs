//! Hiroba chat gateway server.
//!
//! Authenticated clients connect over WebSocket, are auto-joined to their rooms
//! and exchange messages and chunked files with the other members.
//!
//! Run with:
//! ```not_rust
//! HIROBA_JWT_SECRET=change-me cargo run --bin hiroba-server
//! HIROBA_JWT_SECRET=change-me cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;

use hiroba_server::{
    config::Config,
    infrastructure::{
        auth::JwtAuthVerifier,
        message_pusher::WebSocketMessagePusher,
        store::{InMemoryChatStore, LocalFileStore},
    },
    ui::{Dependencies, Server, SessionGateway},
};
use hiroba_shared::{
    logger::{LogFormat, setup_logger},
    time::SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "Real-time chat gateway with room presence and chunked file transfer", long_about = None)]
struct Args {
    /// Host address to bind the server to (overrides HIROBA_HOST)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port number to bind the server to (overrides HIROBA_PORT)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// JSON file seeding rooms and members (overrides HIROBA_SEED_FILE)
    #[arg(short = 's', long)]
    seed: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(seed) = args.seed {
        config.seed_file = Some(seed);
    }

    // Initialize tracing
    setup_logger(
        "hiroba-server",
        env!("CARGO_BIN_NAME"),
        &config.log_level,
        LogFormat::from_name(&config.log_format),
    );

    // Initialize dependencies in order:
    // 1. Stores
    // 2. AuthVerifier and MessagePusher
    // 3. SessionGateway (UseCases)
    // 4. Server

    // 1. Create stores (in-memory chat data, local files)
    let clock = Arc::new(SystemClock);
    let chat_store = match &config.seed_file {
        Some(path) => match InMemoryChatStore::from_seed_file(path).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("Failed to load seed file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("No seed file configured; every room lookup will be empty");
            InMemoryChatStore::with_clock(clock.clone())
        }
    };
    let chat_store = Arc::new(chat_store);
    tracing::info!("{} room(s) loaded", chat_store.room_count().await);

    if let Err(e) = tokio::fs::create_dir_all(&config.upload_dir).await {
        tracing::error!(
            "Failed to create upload directory {}: {}",
            config.upload_dir.display(),
            e
        );
        std::process::exit(1);
    }
    let file_store = Arc::new(LocalFileStore::with_clock(&config.upload_dir, clock.clone()));

    // 2. Create AuthVerifier (JWT) and MessagePusher (WebSocket implementation)
    let auth_verifier = Arc::new(JwtAuthVerifier::new(&config.jwt_secret));
    let message_pusher = Arc::new(WebSocketMessagePusher::new());

    // 3. Create the SessionGateway and its UseCases
    let gateway = Arc::new(SessionGateway::assemble(
        Dependencies {
            auth_verifier,
            membership_store: chat_store.clone(),
            message_store: chat_store,
            file_store,
            message_pusher,
            clock,
        },
        config.upload_limits(),
        config.history_limit,
    ));

    // 4. Create and run the server
    let server = Server::new(
        gateway,
        config.connection_settings(),
        config.sweep_settings(),
        config.upload_dir.clone(),
    );
    if let Err(e) = server.run(config.host.clone(), config.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

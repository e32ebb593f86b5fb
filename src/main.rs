mod bot;
mod config;
mod groupme;
mod interpreter;
mod server;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use bot::{Ledger, PointBot};
use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pointbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "pointbot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("Starting pointbot...");
    info!("Loaded config from {config_path}");

    let ledger = Ledger::open(&config.database_path);

    let client = match groupme::Client::connect(
        config.api_key.clone(),
        config.api_base.clone(),
        config.bot_id.clone(),
        &config.bot_name,
    )
    .await
    {
        Ok(client) => {
            info!("Posting as bot id {}", client.bot_id());
            Arc::new(client)
        }
        Err(e) => {
            error!("Failed to set up GroupMe bot '{}': {e}", config.bot_name);
            std::process::exit(1);
        }
    };

    let bot = Arc::new(PointBot::new(
        &config.bot_name,
        config.group_name.clone(),
        ledger,
        client.clone(),
        client,
    ));

    match bot.ledger().player_count() {
        Ok(count) => info!("Ledger holds {count} player(s)"),
        Err(e) => warn!("Ledger not ready, point changes will fail: {e}"),
    }

    let app = server::router(&config.webhook_path, bot);

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", config.bind);
            std::process::exit(1);
        }
    };
    info!("Listening on {}{}", config.bind, config.webhook_path);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await
    {
        error!("Server error: {e}");
    }

    info!("Shut down cleanly");
}

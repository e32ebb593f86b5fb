//! Webhook receiver for GroupMe callbacks.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use tokio::signal;
use tracing::info;

use crate::bot::PointBot;
use crate::interpreter::Payload;

/// Body returned for every decoded callback, whatever the outcome.
pub const ACK: &str = "OK";

pub fn router(webhook_path: &str, bot: Arc<PointBot>) -> Router {
    Router::new()
        .route(webhook_path, post(handle_callback))
        .with_state(bot)
}

async fn handle_callback(State(bot): State<Arc<PointBot>>, Json(payload): Json<Payload>) -> &'static str {
    if payload.system.unwrap_or(false) {
        info!("BOT: Got system message, parsing...");
    } else {
        info!("BOT: Got user message, parsing...");
    }
    bot.handle_payload(&payload).await;
    ACK
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C: shutting down"),
        _ = terminate => info!("SIGTERM: shutting down"),
    }
}

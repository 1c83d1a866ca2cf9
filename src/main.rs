mod adapter;
mod bot;
mod config;
mod membership;
mod platform;
mod webhook;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapter::PlatformRequest;
use crate::bot::BotState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `event` mode keeps stdout for the response
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,channel_gate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    // A bad bot configuration disables the route instead of aborting startup
    let state = BotState::from_env();
    let app = webhook::router(state);

    match mode.as_str() {
        "serve" => serve(app).await,
        "event" => handle_event(app).await,
        other => anyhow::bail!("Unknown mode '{}', expected 'serve' or 'event'", other),
    }
}

async fn serve(app: axum::Router) -> Result<()> {
    let server = ServerConfig::from_env().context("Invalid server configuration")?;
    let listener = tokio::net::TcpListener::bind(server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server.listen_addr))?;

    info!("Webhook listening on {}{}", server.listen_addr, webhook::WEBHOOK_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// Reads one runtime request from stdin and writes the response to stdout.
async fn handle_event(app: axum::Router) -> Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read request event from stdin")?;

    let request: PlatformRequest =
        serde_json::from_str(&input).context("Failed to parse request event")?;
    let response = adapter::handle(app, request).await?;

    let mut out = serde_json::to_vec(&response).context("Failed to encode response event")?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}

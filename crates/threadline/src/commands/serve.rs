//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use threadline::bridge::EventBridge;
use threadline::config::Config;
use threadline::server::{self, AppState};
use threadline::session::{ChatService, MessageStore};
use threadline_gateway::EVENT_CHANNEL_CAPACITY;
use threadline_gateway_discord::{DiscordConfig, DiscordGateway};

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = Config::load(config_path).await?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    config.validate()?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let discord_config = DiscordConfig {
        bot_token: config.discord.bot_token.clone(),
        channel_id: config.discord.channel_id.clone(),
        request_timeout_seconds: config.discord.request_timeout_seconds,
    };
    let (gateway, gateway_task) = DiscordGateway::connect(discord_config, event_tx)
        .await
        .context("failed to connect Discord gateway")?;

    let store = MessageStore::new(
        config.sessions.max_messages_per_session,
        config.sessions.message_retention_ms,
    );
    let chat = ChatService::new(gateway, store, config.widget.clone());
    let bridge_task = EventBridge::new(chat.clone()).spawn(event_rx);

    let state = AppState { chat: chat.clone() };
    let app = server::build_app(state, &config.server);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop accepting HTTP first, then drop the gateway connection, which
    // closes the event channel and lets the bridge drain.
    chat.shutdown().await;

    if let Err(e) = gateway_task.await {
        warn!(error = %e, "Gateway task ended abnormally");
    }
    if let Err(e) = bridge_task.await {
        warn!(error = %e, "Bridge task ended abnormally");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

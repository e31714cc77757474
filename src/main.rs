use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_relay::{
    api, bot,
    bridge::RequestBridge,
    config::Config,
    inbound::InboundHandler,
    platform::{ChatPlatform, TelegramPlatform},
    registry::Registry,
    relay::DownloadRelay,
    session::ChannelSession,
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "file-relay starting");

    // Load configuration
    let config = Config::load().context("invalid configuration")?;
    info!(
        app_id = config.platform.app_id,
        archive_channel_id = config.platform.archive_channel_id,
        "Loaded configuration"
    );

    // Initialize database
    let db = Database::open(&config.storage.data_dir).context("failed to open metadata store")?;
    info!("Metadata store opened at: {}", config.storage.data_dir);
    let registry = Registry::new(db);

    // Chat session
    let telegram = TelegramPlatform::new(&config.platform)?;
    let platform: Arc<dyn ChatPlatform> = Arc::new(telegram.clone());
    let session = ChannelSession::new(platform);
    let handler = Arc::new(InboundHandler::new(
        Arc::clone(&session),
        registry.clone(),
        config.server.public_base_url.clone(),
    ));

    let state = Arc::new(AppState {
        bridge: RequestBridge::new(Arc::clone(&session), config.bridge_timeout),
        registry,
        relay: DownloadRelay::new()?,
    });

    // Serve HTTP right away; downloads answer 503 until the session is ready.
    let app = api::create_router(Arc::clone(&state));
    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on: {}", bind_address);

    let server_shutdown = CancellationToken::new();
    let server = {
        let token = server_shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        })
    };

    let listener = bot::update_listener(telegram.bot(), handler);
    if let Err(e) = session.start(Some(listener)).await {
        server_shutdown.cancel();
        let _ = server.await;
        return Err(e).context("chat session failed to start");
    }

    shutdown_signal().await;

    // Stop the session first so pending downloads fail fast instead of
    // waiting out the bridge timeout while connections drain.
    server_shutdown.cancel();
    session.stop().await;
    server.await??;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

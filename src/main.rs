use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;

use tripbuddy::bot::Bot;
use tripbuddy::channels::{InboundEvent, MessageStream, TelegramMessenger};
use tripbuddy::config::BotConfig;
use tripbuddy::session::SessionStore;
use tripbuddy::store::{Database, LibSqlBackend};
use tripbuddy::webhook::{WebhookState, health_routes, webhook_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(BotConfig::from_env()?);

    eprintln!("🧳 TripBuddy v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Staff chat: {}",
        config
            .admin_group_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "not set".to_string())
    );
    eprintln!(
        "   Staff username: {}",
        config.admin_username.as_deref().unwrap_or("not set")
    );

    // ── Database ─────────────────────────────────────────────────────────
    let backend = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    match backend.ensure_columns().await {
        Ok(0) => {}
        Ok(added) => tracing::info!(added, "Added missing columns"),
        Err(e) => tracing::warn!("Column check failed: {e}"),
    }
    let db: Arc<dyn Database> = Arc::new(backend);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Transport ────────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramMessenger::new(config.bot_token.clone()));

    let (app, events): (axum::Router, MessageStream) = match config.public_url.as_deref() {
        Some(public_url) => {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<InboundEvent>();
            telegram
                .set_webhook(&format!(
                    "{public_url}/webhook/{}",
                    config.bot_token.expose_secret()
                ))
                .await?;
            eprintln!("   Mode: webhook ({public_url}/webhook/…)");
            let app = webhook_routes(WebhookState {
                events: tx,
                token: config.bot_token.clone(),
            });
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            });
            (app, Box::pin(stream))
        }
        None => {
            if let Err(e) = telegram.delete_webhook().await {
                tracing::warn!("deleteWebhook failed: {e}");
            }
            eprintln!("   Mode: long polling");
            (health_routes(), telegram.poll())
        }
    };

    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tokio::spawn(async move {
        tracing::info!(port, "HTTP server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server stopped: {e}");
        }
    });
    eprintln!("   HTTP: http://0.0.0.0:{port}/\n");

    // ── Bot ──────────────────────────────────────────────────────────────
    let bot = Arc::new(Bot::new(
        telegram,
        db,
        Arc::new(SessionStore::new()),
        Arc::clone(&config),
    ));
    bot.run(events).await;

    Ok(())
}

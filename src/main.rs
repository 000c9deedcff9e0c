//! Triage desk - streamed medical triage chat
//!
//! A Rust backend that streams model replies into live render nodes, keeps a
//! canonical transcript per chat and persists it for signed-in users.

mod api;
mod config;
mod db;
mod llm;
mod runtime;
mod stream;
mod system_prompt;
mod tools;
mod transcript;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use llm::{LoggingService, OpenAiService};
use runtime::{DatabaseStorage, SessionManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_desk=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let llm = Arc::new(LoggingService::new(Arc::new(OpenAiService::new(
        config.openai.clone(),
    )?)));
    tracing::info!(model = %config.session.model, base_url = %config.openai.base_url, "Model provider ready");

    let manager = Arc::new(SessionManager::new(
        Arc::new(DatabaseStorage::new(db)),
        llm,
        config.session.clone(),
    ));
    let sweeper = manager.spawn_idle_sweeper(config.session_idle);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(AppState::new(Arc::clone(&manager)))
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Triage desk listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Let in-flight turns and commits finish
    sweeper.abort();
    manager.shutdown().await;
    Ok(())
}

mod billing;
mod config;
mod db;
mod errors;
mod models;
mod resumes;
mod routes;
mod state;
mod store;
mod templates;
mod usage;
mod users;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::billing::RedisProcessedEvents;
use crate::config::Config;
use crate::db::create_pool;
use crate::resumes::PrintManifestRenderer;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; missing required variables abort startup
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Folio API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db));

    // Initialize Redis (webhook delivery log)
    let redis = redis::Client::open(config.redis_url.clone())?;
    let processed_events = Arc::new(RedisProcessedEvents::new(
        redis,
        config.webhook_event_ttl_secs,
    ));
    info!("Redis client initialized");

    let state = AppState::build(
        &config,
        store,
        processed_events,
        Arc::new(PrintManifestRenderer),
    );

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

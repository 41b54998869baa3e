//! Changefeed API server entry point.

use std::sync::Arc;

use changefeed_api::auth::ApiTokens;
use changefeed_api::config::AppConfig;
use changefeed_api::error::AppError;
use changefeed_api::routes;
use changefeed_api::state::AppState;
use changefeed_core::clock::{Clock, SystemClock};
use changefeed_core::host::HostConfig;
use changefeed_event_store::pg_event_store::PgEventStore;
use changefeed_plugin::plugin::EventsPlugin;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting changefeed API server");

    let config = AppConfig::from_env()?;

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgEventStore::new(pool));
    store
        .migrate()
        .await
        .map_err(|e| AppError::Migration(e.to_string()))?;

    // Install the plugin. This server hosts no document collections of its
    // own, so the host configuration only gains the events collection.
    let plugin = Arc::new(EventsPlugin::new(config.plugin.clone(), store));
    let host = plugin.apply(HostConfig::default());
    for endpoint in &host.endpoints {
        tracing::info!(path = %endpoint.path, method = ?endpoint.method, "endpoint registered");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sweeper = plugin.on_init(clock);

    let app_state = AppState::new(plugin, ApiTokens::new(config.api_tokens.clone()));

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state.clone());

    let addr = config.bind_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

/// Waits for Ctrl+C, then ends every open change stream so graceful
/// shutdown can complete.
async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    state.begin_shutdown();
}

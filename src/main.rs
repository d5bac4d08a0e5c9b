//! Silsilah Sync
//!
//! Synchronization and data-integrity engine for the Silsilah family-tree editor:
//! an id-based record store kept loosely in sync with one shared remote document,
//! with a local SQLite cache as fallback.

mod api;
mod config;
mod db;
mod errors;
mod migrate;
mod models;
mod service;
mod store;
mod sync;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::LocalCache;
use service::FamilyService;
use sync::{RemoteClient, SyncEngine, SyncSettings};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: FamilyService,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Silsilah sync engine");
    tracing::info!("Remote document: {}", config.remote_url);
    tracing::info!("Save endpoint: {:?}", config.save_url);
    tracing::info!("Cache path: {:?}", config.cache_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if !config.auto_upload {
        tracing::warn!("Automatic upload disabled (SILSILAH_AUTO_UPLOAD). Edits stay local!");
    }

    let (state, coordinator) = start(config.clone()).await?;
    let sync = state.service.sync().clone();

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    sync.shutdown();
    coordinator.await.ok();

    Ok(())
}

/// Load the document, spawn the sync coordinator and assemble the state.
pub async fn start(
    config: Config,
) -> Result<(AppState, JoinHandle<()>), Box<dyn std::error::Error>> {
    let pool = db::init_database(&config.cache_path).await?;
    let cache = LocalCache::new(pool, config.cache_slot.clone());

    let remote = RemoteClient::new(
        config.remote_url.clone(),
        config.save_url.clone(),
        config.http_timeout,
    )?;

    let loaded = sync::bootstrap(&remote, &cache, &config.seed_name).await;
    tracing::info!(
        "Loaded {} records from {:?}",
        loaded.document.records.len(),
        loaded.source
    );
    let (replica, snapshot) = loaded.into_parts();
    let replica = Arc::new(Mutex::new(replica));

    let (engine, handle) = SyncEngine::new(
        replica.clone(),
        cache.clone(),
        remote,
        SyncSettings::from_config(&config),
        snapshot,
    );
    let coordinator = engine.spawn();

    let state = AppState {
        service: FamilyService::new(replica, cache, handle),
    };
    Ok((state, coordinator))
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Document
        .route("/document", get(api::get_document))
        .route("/document/export", get(api::export_document))
        .route("/document/import", post(api::import_document))
        // Members
        .route("/members", post(api::add_member))
        .route("/members/roots", get(api::list_roots))
        .route("/members/search", get(api::search_members))
        .route("/members/names", get(api::suggest_names))
        .route(
            "/members/{id}",
            get(api::get_member)
                .put(api::edit_member)
                .delete(api::delete_member),
        )
        .route("/members/{id}/spouse", delete(api::unlink_spouse))
        // Sync
        .route("/sync/status", get(api::sync_status))
        .route("/sync/retry", post(api::retry_sync))
        .route("/sync/focus", post(api::focus_sync));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

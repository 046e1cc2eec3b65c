//! Mirador control-plane API server.

use std::process::ExitCode;
use std::sync::Arc;

use mirador_api::config::ApiConfig;
use mirador_api::state::AppState;
use mirador_engines::Environment;
use mirador_store::{
    DynMetadataCache, DynVectorBackend, HttpVectorStore, MemoryCache, MemoryStore, RedisCache,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env();
    tracing::info!(
        environment = config.environment.as_str(),
        port = config.port,
        "starting mirador-core"
    );

    let backend: Arc<DynVectorBackend> = match &config.store_url {
        Some(url) => {
            let mut store = HttpVectorStore::new(url).with_timeout(config.store_timeout);
            if let Some(key) = &config.store_api_key {
                store = store.with_api_key(key.clone());
            }
            Arc::new(store)
        }
        None if config.environment == Environment::Development => {
            tracing::warn!("MIRADOR_STORE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
        None => {
            tracing::error!("MIRADOR_STORE_URL is required in production");
            return ExitCode::FAILURE;
        }
    };

    let cache: Arc<DynMetadataCache> = match &config.cache_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => Arc::new(cache),
            Err(err) => {
                tracing::error!(error = %err, "cache connection failed");
                return ExitCode::FAILURE;
            }
        },
        None => {
            tracing::warn!("MIRADOR_CACHE_URL not set; using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };
    // Search-index metadata shares the cache service under its own keys.
    let index: Arc<DynMetadataCache> = Arc::clone(&cache);

    // Bootstrap runs inside build; a misconfigured store fails the
    // process instead of the first request.
    let state = match AppState::build(&config, backend, cache, index).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let app = mirador_api::build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "mirador-core listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "bind failed");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

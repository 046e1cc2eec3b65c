//! Shared application state.

use std::sync::Arc;

use mirador_catalog::{CatalogEngine, DeleteOrchestrator};
use mirador_core::Result;
use mirador_engines::{
    AlertManager, CacheDynamicConfig, Environment, PredictManager, RcaManager,
};
use mirador_rbac::{audit_writer_task, AuditConfig, AuditSink, RbacEngine, RbacRepository};
use mirador_store::{
    DynMetadataCache, DynVectorBackend, MemoryCache, MemoryStore, SchemaBootstrap,
};

use crate::config::ApiConfig;

/// Everything handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogEngine>,
    pub rbac: Arc<RbacEngine>,
    pub deleter: Arc<DeleteOrchestrator>,
    pub rca: Arc<RcaManager>,
    pub alert: Arc<AlertManager>,
    pub predict: Arc<PredictManager>,
    pub backend: Arc<DynVectorBackend>,
    pub cache_stats: Arc<mirador_rbac::CacheStats>,
    pub audit: AuditSink,
}

impl AppState {
    /// Wire the engines over concrete backends: run the schema
    /// bootstrap, spawn the audit writer task, and build the clients.
    /// A bootstrap failure here is a startup failure.
    pub async fn build(
        config: &ApiConfig,
        backend: Arc<DynVectorBackend>,
        cache: Arc<DynMetadataCache>,
        index: Arc<DynMetadataCache>,
    ) -> Result<Self> {
        let bootstrap = SchemaBootstrap::new();
        bootstrap.ensure(backend.as_ref()).await?;

        let catalog = Arc::new(CatalogEngine::new(
            Arc::clone(&backend),
            Arc::clone(&bootstrap),
        ));
        let deleter = Arc::new(DeleteOrchestrator::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            index,
        ));

        let repo = Arc::new(RbacRepository::new(
            Arc::clone(&backend),
            Arc::clone(&bootstrap),
            Arc::clone(&cache),
        ));
        let cache_stats = repo.cache_stats();

        let audit_config = AuditConfig::default();
        let (audit, audit_rx) = AuditSink::new(&audit_config);
        tokio::spawn(audit_writer_task(
            audit_rx,
            Arc::clone(&backend),
            Arc::clone(&bootstrap),
            audit_config,
        ));
        let rbac = Arc::new(RbacEngine::new(repo, audit.clone()));

        let dynamic_config = Arc::new(CacheDynamicConfig::new(Arc::clone(&cache)));
        let rca = Arc::new(RcaManager::new(
            config.rca_endpoint.as_deref(),
            config.environment,
            dynamic_config.clone(),
        )?);
        let alert = Arc::new(AlertManager::new(
            &config.alert_endpoints,
            config.environment,
            dynamic_config.clone(),
        )?);
        let predict = Arc::new(PredictManager::new(
            &config.predict_endpoints,
            config.environment,
            dynamic_config,
        )?);

        Ok(Self {
            catalog,
            rbac,
            deleter,
            rca,
            alert,
            predict,
            backend,
            cache_stats,
            audit,
        })
    }

    /// In-memory state for development and tests: memory store, memory
    /// caches, no-op engines.
    pub async fn in_memory() -> Self {
        let config = ApiConfig {
            environment: Environment::Development,
            ..ApiConfig::default()
        };
        let backend: Arc<DynVectorBackend> = Arc::new(MemoryStore::new());
        let cache: Arc<DynMetadataCache> = Arc::new(MemoryCache::new());
        let index: Arc<DynMetadataCache> = Arc::new(MemoryCache::new());
        Self::build(&config, backend, cache, index)
            .await
            .expect("in-memory state cannot fail to build")
    }
}

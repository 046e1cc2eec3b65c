//! Dynamic endpoint configuration.
//!
//! `update_endpoint` persists the new endpoint before the in-memory swap,
//! so a restarted process comes back pointing at the right engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mirador_core::Result;
use mirador_store::DynMetadataCache;

/// Retention for persisted endpoints; effectively permanent.
const ENDPOINT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Persistence seam for per-tenant engine endpoints.
#[async_trait]
pub trait DynamicConfig: Send + Sync {
    async fn store_endpoint(&self, tenant_id: &str, engine: &str, endpoint: &str) -> Result<()>;
    async fn load_endpoint(&self, tenant_id: &str, engine: &str) -> Result<Option<String>>;
}

/// Dynamic config stored through the metadata cache service.
pub struct CacheDynamicConfig {
    cache: Arc<DynMetadataCache>,
}

impl CacheDynamicConfig {
    pub fn new(cache: Arc<DynMetadataCache>) -> Self {
        Self { cache }
    }

    fn key(tenant_id: &str, engine: &str) -> String {
        format!("engine:endpoint:{tenant_id}:{engine}")
    }
}

#[async_trait]
impl DynamicConfig for CacheDynamicConfig {
    async fn store_endpoint(&self, tenant_id: &str, engine: &str, endpoint: &str) -> Result<()> {
        self.cache
            .set(&Self::key(tenant_id, engine), endpoint, ENDPOINT_TTL)
            .await
    }

    async fn load_endpoint(&self, tenant_id: &str, engine: &str) -> Result<Option<String>> {
        self.cache.get(&Self::key(tenant_id, engine)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirador_store::MemoryCache;

    #[tokio::test]
    async fn endpoint_round_trip() {
        let config = CacheDynamicConfig::new(Arc::new(MemoryCache::new()));
        config
            .store_endpoint("t1", "rca", "http://rca.internal:8080")
            .await
            .unwrap();
        assert_eq!(
            config.load_endpoint("t1", "rca").await.unwrap().as_deref(),
            Some("http://rca.internal:8080")
        );
        assert_eq!(config.load_endpoint("t2", "rca").await.unwrap(), None);
    }
}

//! The versioned catalog engine.
//!
//! Upserts are idempotent by deterministic id and allocate
//! `max(version) + 1` under a per-key async lock, so version numbers are
//! dense per (tenant, natural key). The primary write always precedes the
//! version-row write; if the version row fails the caller retries and the
//! allocation reads the store again.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mirador_core::catalog::{VersionInfo, VersionRecord};
use mirador_core::ids::{deterministic_id, version_id};
use mirador_core::validation::validate_tenant_id;
use mirador_core::{CoreError, Result};
use mirador_store::{is_missing_class, DynVectorBackend, QuerySpec, SchemaBootstrap};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::entity::CatalogEntity;

/// Hard cap on version-history listings.
pub const MAX_VERSION_LISTING: usize = 1000;

/// Fields fetched from version classes.
const VERSION_FIELDS: [&str; 6] = ["tenantId", "key", "version", "payload", "author", "createdAt"];

/// Tenant-scoped, versioned registry over a vector backend.
pub struct CatalogEngine {
    backend: Arc<DynVectorBackend>,
    bootstrap: Arc<SchemaBootstrap>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CatalogEngine {
    pub fn new(backend: Arc<DynVectorBackend>, bootstrap: Arc<SchemaBootstrap>) -> Self {
        Self {
            backend,
            bootstrap,
            key_locks: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<DynVectorBackend> {
        &self.backend
    }

    pub(crate) fn bootstrap(&self) -> &Arc<SchemaBootstrap> {
        &self.bootstrap
    }

    /// Upsert an entity, allocating the next version. Returns the version
    /// written.
    pub async fn upsert<E: CatalogEntity>(&self, mut entity: E, author: &str) -> Result<i64> {
        validate_tenant_id(entity.tenant_id())?;
        self.bootstrap.ensure(self.backend.as_ref()).await?;

        let tenant = entity.tenant_id().to_string();
        let key_values = entity.key_values();
        let key_refs: Vec<&str> = key_values.iter().map(String::as_str).collect();
        let joined_key = key_values.join("/");

        // Serialize the read-modify-write per (class, tenant, key) so
        // concurrent upserts cannot allocate the same or out-of-order
        // version numbers.
        let lock = self.key_lock(E::CLASS, &tenant, &joined_key);
        let _guard = lock.lock().await;

        let current = self.max_version::<E>(&tenant, &joined_key).await?;
        let next = current + 1;
        let now = Utc::now();
        entity.set_version(next);
        entity.touch(now);

        let primary_id = deterministic_id(E::CLASS, &tenant, &key_refs);
        self.put_with_retry(E::CLASS, primary_id, entity.to_properties()?)
            .await?;

        let record = VersionRecord {
            tenant_id: tenant.clone(),
            key: joined_key,
            version: next,
            payload: serde_json::to_string(&entity)?,
            author: author.to_string(),
            created_at: now,
        };
        let vid = version_id(E::VERSION_CLASS, &tenant, &key_refs, next);
        self.put_with_retry(E::VERSION_CLASS, vid, serde_json::to_value(&record)?)
            .await
            .map_err(|e| {
                // The primary row is already current; a failed version row
                // leaves history short until the caller retries.
                warn!(
                    kind = E::KIND,
                    tenant_id = %tenant,
                    version = next,
                    error = %e,
                    "version row write failed after primary write"
                );
                e
            })?;

        Ok(next)
    }

    /// Fetch the current definition by natural key.
    pub async fn get<E: CatalogEntity>(&self, tenant_id: &str, key_values: &[&str]) -> Result<E> {
        validate_tenant_id(tenant_id)?;
        let mut spec = QuerySpec::new(E::CLASS)
            .fields(E::fields())
            .where_text("tenantId", tenant_id)
            .limit(1);
        for (field, value) in E::KEY_FIELDS.iter().zip(key_values) {
            spec = spec.where_text(*field, *value);
        }

        let rows = self.rows_or_empty::<E>(&spec).await?;
        match rows.first() {
            Some(row) => E::from_properties(row),
            None => Err(CoreError::not_found(E::KIND, key_values.join("/"))),
        }
    }

    /// List entities by equality filters, sorted by the first key field.
    pub async fn list<E: CatalogEntity>(
        &self,
        tenant_id: &str,
        eq_filters: &[(&str, &str)],
        limit: usize,
    ) -> Result<Vec<E>> {
        validate_tenant_id(tenant_id)?;
        let mut spec = QuerySpec::new(E::CLASS)
            .fields(E::fields())
            .where_text("tenantId", tenant_id)
            .limit(limit);
        for (field, value) in eq_filters {
            spec = spec.where_text(*field, *value);
        }
        if let Some(first_key) = E::KEY_FIELDS.first() {
            spec = spec.sort_asc(*first_key);
        }

        let rows = self.rows_or_empty::<E>(&spec).await?;
        rows.iter().map(E::from_properties).collect()
    }

    /// List version history, newest first, capped at 1000 rows.
    pub async fn list_versions<E: CatalogEntity>(
        &self,
        tenant_id: &str,
        key_values: &[&str],
    ) -> Result<Vec<VersionInfo>> {
        validate_tenant_id(tenant_id)?;
        let spec = self
            .version_query::<E>(tenant_id, key_values)
            .sort_desc("version")
            .limit(MAX_VERSION_LISTING);

        let rows = self.rows_or_empty::<E>(&spec).await?;
        rows.iter()
            .map(|row| {
                let record: VersionRecord = serde_json::from_value(row.clone())?;
                Ok(record.info())
            })
            .collect()
    }

    /// Fetch one exact version: the payload snapshot plus its info row.
    pub async fn get_version<E: CatalogEntity>(
        &self,
        tenant_id: &str,
        key_values: &[&str],
        version: i64,
    ) -> Result<(E, VersionInfo)> {
        validate_tenant_id(tenant_id)?;
        let spec = self
            .version_query::<E>(tenant_id, key_values)
            .where_int("version", version)
            .limit(1);

        let rows = self.rows_or_empty::<E>(&spec).await?;
        let row = rows.first().ok_or_else(|| {
            CoreError::not_found(E::KIND, format!("{}@v{version}", key_values.join("/")))
        })?;
        let record: VersionRecord = serde_json::from_value(row.clone())?;
        let entity: E = serde_json::from_str(&record.payload)?;
        Ok((entity, record.info()))
    }

    /// Delete the primary row. Version rows are retained for audit, and a
    /// later upsert of the same key resumes at `max(version) + 1`.
    pub async fn delete<E: CatalogEntity>(
        &self,
        tenant_id: &str,
        key_values: &[&str],
    ) -> Result<bool> {
        validate_tenant_id(tenant_id)?;
        let id = deterministic_id(E::CLASS, tenant_id, key_values);
        self.backend.delete_object(E::CLASS, id).await
    }

    fn key_lock(&self, class: &str, tenant_id: &str, key: &str) -> Arc<Mutex<()>> {
        let lock_key = format!("{class}\u{1f}{tenant_id}\u{1f}{key}");
        self.key_locks
            .entry(lock_key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn version_query<E: CatalogEntity>(&self, tenant_id: &str, key_values: &[&str]) -> QuerySpec {
        QuerySpec::new(E::VERSION_CLASS)
            .fields(VERSION_FIELDS)
            .where_text("tenantId", tenant_id)
            .where_text("key", key_values.join("/"))
    }

    async fn max_version<E: CatalogEntity>(&self, tenant_id: &str, key: &str) -> Result<i64> {
        let spec = QuerySpec::new(E::VERSION_CLASS)
            .fields(["version"])
            .where_text("tenantId", tenant_id)
            .where_text("key", key)
            .sort_desc("version")
            .limit(1);
        let rows = self.rows_or_empty::<E>(&spec).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("version"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Run a query, treating a missing backing class as an empty result
    /// with a monitoring signal.
    async fn rows_or_empty<E: CatalogEntity>(&self, spec: &QuerySpec) -> Result<Vec<Value>> {
        match self.backend.query(spec).await {
            Ok(rows) => Ok(rows),
            Err(err) if is_missing_class(&err) => {
                warn!(
                    class = %spec.class,
                    kind = E::KIND,
                    "backing class missing; treating as empty"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Put an object, re-running bootstrap and retrying exactly once when
    /// the store reports the class missing.
    async fn put_with_retry(&self, class: &str, id: Uuid, properties: Value) -> Result<()> {
        match self.backend.put_object(class, id, properties.clone()).await {
            Ok(()) => Ok(()),
            Err(err) if is_missing_class(&err) => {
                warn!(class, error = %err, "write hit missing class; re-running bootstrap");
                self.bootstrap.force(self.backend.as_ref()).await?;
                self.backend.put_object(class, id, properties).await
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirador_core::catalog::Metric;
    use mirador_store::MemoryStore;

    fn metric(tenant: &str, name: &str, description: &str) -> Metric {
        Metric {
            tenant_id: tenant.into(),
            name: name.into(),
            description: description.into(),
            owner: "team".into(),
            tags: vec!["env:dev".into()],
            category: "infra".into(),
            sentiment: "neutral".into(),
            unit: "percent".into(),
            source: "node_exporter".into(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    fn engine() -> CatalogEngine {
        CatalogEngine::new(Arc::new(MemoryStore::new()), SchemaBootstrap::new())
    }

    #[tokio::test]
    async fn upsert_allocates_dense_versions() {
        let engine = engine();
        for n in 1..=4i64 {
            let v = engine
                .upsert(metric("t1", "cpu_usage", &format!("v{n}")), "tester")
                .await
                .unwrap();
            assert_eq!(v, n);
        }

        let versions = engine
            .list_versions::<Metric>("t1", &["cpu_usage"])
            .await
            .unwrap();
        assert_eq!(
            versions.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![4, 3, 2, 1]
        );
    }

    #[tokio::test]
    async fn get_returns_current_definition() {
        let engine = engine();
        engine
            .upsert(metric("t1", "cpu_usage", "v1"), "tester")
            .await
            .unwrap();
        engine
            .upsert(metric("t1", "cpu_usage", "v2"), "tester")
            .await
            .unwrap();

        let current = engine.get::<Metric>("t1", &["cpu_usage"]).await.unwrap();
        assert_eq!(current.description, "v2");
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn get_version_returns_exact_snapshot() {
        let engine = engine();
        engine
            .upsert(metric("t1", "cpu_usage", "v1"), "alice")
            .await
            .unwrap();
        engine
            .upsert(metric("t1", "cpu_usage", "v2"), "bob")
            .await
            .unwrap();

        let (snapshot, info) = engine
            .get_version::<Metric>("t1", &["cpu_usage"], 1)
            .await
            .unwrap();
        assert_eq!(snapshot.description, "v1");
        assert_eq!(info.version, 1);
        assert_eq!(info.author, "alice");
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let engine = engine();
        engine
            .upsert(metric("t1", "cpu_usage", "v1"), "tester")
            .await
            .unwrap();

        let err = engine
            .get::<Metric>("t2", &["cpu_usage"])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_keeps_history_and_resumes_versioning() {
        let engine = engine();
        engine
            .upsert(metric("t1", "cpu_usage", "v1"), "tester")
            .await
            .unwrap();
        engine
            .upsert(metric("t1", "cpu_usage", "v2"), "tester")
            .await
            .unwrap();

        assert!(engine.delete::<Metric>("t1", &["cpu_usage"]).await.unwrap());
        assert!(engine
            .get::<Metric>("t1", &["cpu_usage"])
            .await
            .is_err());

        // History survives the delete.
        let versions = engine
            .list_versions::<Metric>("t1", &["cpu_usage"])
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);

        // A later upsert resumes after the retained history.
        let v = engine
            .upsert(metric("t1", "cpu_usage", "v3"), "tester")
            .await
            .unwrap();
        assert_eq!(v, 3);
    }

    #[tokio::test]
    async fn concurrent_upserts_stay_dense() {
        let engine = Arc::new(engine());
        let mut handles = Vec::new();
        for n in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .upsert(metric("t1", "cpu_usage", &format!("w{n}")), "tester")
                    .await
            }));
        }
        let mut versions: Vec<i64> = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap().unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn missing_tenant_is_a_validation_error() {
        let engine = engine();
        let err = engine.get::<Metric>("", &["cpu_usage"]).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}

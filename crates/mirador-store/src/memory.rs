//! In-memory vector backend for development and tests.
//!
//! Behaves like the HTTP store for the query subset the control plane
//! uses: equality filters, tag-membership filters, single-field sort,
//! limit/offset, and aggregate counts. Queries against classes that were
//! never created fail with the same missing-class error text the real
//! store produces.

use async_trait::async_trait;
use dashmap::DashMap;
use mirador_core::{CoreError, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::backend::VectorBackend;
use crate::query::{Filter, Order, QuerySpec};
use crate::schema::ClassDefinition;

/// Thread-safe in-memory object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    classes: DashMap<String, DashMap<Uuid, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored in a class.
    pub fn class_len(&self, class: &str) -> usize {
        self.classes.get(class).map(|c| c.len()).unwrap_or(0)
    }

    fn matches(properties: &Value, filter: &Filter) -> bool {
        match filter {
            Filter::TextEq { path, value } => match properties.get(path) {
                Some(Value::String(s)) => s == value,
                Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(value)),
                _ => false,
            },
            Filter::IntEq { path, value } => {
                properties.get(path).and_then(Value::as_i64) == Some(*value)
            }
            Filter::BoolEq { path, value } => {
                properties.get(path).and_then(Value::as_bool) == Some(*value)
            }
            Filter::AnyTextEq { path, values } => match properties.get(path) {
                Some(Value::String(s)) => values.iter().any(|v| v == s),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|i| values.iter().any(|v| v == i)),
                _ => false,
            },
        }
    }

    fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            return x.cmp(&y);
        }
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
        match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => Ordering::Equal,
        }
    }

    fn run_query(&self, spec: &QuerySpec, paginate: bool) -> Result<Vec<Value>> {
        let class = self
            .classes
            .get(&spec.class)
            .ok_or_else(|| CoreError::Store(format!("class {} not found", spec.class)))?;

        let mut rows: Vec<Value> = class
            .iter()
            .filter(|entry| spec.filters.iter().all(|f| Self::matches(entry.value(), f)))
            .map(|entry| entry.value().clone())
            .collect();

        if let Some((field, order)) = &spec.sort {
            rows.sort_by(|a, b| {
                let null = Value::Null;
                let av = a.get(field).unwrap_or(&null);
                let bv = b.get(field).unwrap_or(&null);
                let ord = Self::compare(av, bv);
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }

        if paginate {
            if let Some(offset) = spec.offset {
                rows = rows.into_iter().skip(offset).collect();
            }
            if let Some(limit) = spec.limit {
                rows.truncate(limit);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl VectorBackend for MemoryStore {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn list_classes(&self) -> Result<Vec<String>> {
        Ok(self.classes.iter().map(|e| e.key().clone()).collect())
    }

    async fn ensure_class(&self, def: &ClassDefinition) -> Result<()> {
        self.classes
            .entry(def.class.to_string())
            .or_insert_with(DashMap::new);
        Ok(())
    }

    async fn put_object(&self, class: &str, id: Uuid, properties: Value) -> Result<()> {
        let class = self
            .classes
            .get(class)
            .ok_or_else(|| CoreError::Store(format!("class {class} not found")))?;
        class.insert(id, properties);
        Ok(())
    }

    async fn delete_object(&self, class: &str, id: Uuid) -> Result<bool> {
        Ok(self
            .classes
            .get(class)
            .map(|c| c.remove(&id).is_some())
            .unwrap_or(false))
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<Value>> {
        self.run_query(spec, true)
    }

    async fn count(&self, spec: &QuerySpec) -> Result<Option<i64>> {
        Ok(Some(self.run_query(spec, false)?.len() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClassDefinition, PropertyDef};
    use serde_json::json;

    const TEST_CLASS: ClassDefinition = ClassDefinition {
        class: "Widget",
        description: "test class",
        properties: &[
            PropertyDef {
                name: "tenantId",
                data_type: "text",
            },
            PropertyDef {
                name: "name",
                data_type: "text",
            },
        ],
    };

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn put_query_delete_cycle() {
        let store = MemoryStore::new();
        store.ensure_class(&TEST_CLASS).await.unwrap();
        store
            .put_object("Widget", id(1), json!({"tenantId": "t1", "name": "a", "version": 1}))
            .await
            .unwrap();
        store
            .put_object("Widget", id(2), json!({"tenantId": "t2", "name": "b", "version": 2}))
            .await
            .unwrap();

        let rows = store
            .query(&QuerySpec::new("Widget").where_text("tenantId", "t1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "a");

        assert!(store.delete_object("Widget", id(1)).await.unwrap());
        assert!(!store.delete_object("Widget", id(1)).await.unwrap());
    }

    #[tokio::test]
    async fn sort_desc_and_pagination() {
        let store = MemoryStore::new();
        store.ensure_class(&TEST_CLASS).await.unwrap();
        for v in 1..=5i64 {
            store
                .put_object(
                    "Widget",
                    id(v as u128),
                    json!({"tenantId": "t1", "version": v}),
                )
                .await
                .unwrap();
        }

        let rows = store
            .query(
                &QuerySpec::new("Widget")
                    .where_text("tenantId", "t1")
                    .sort_desc("version")
                    .limit(2)
                    .offset(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["version"], 4);
        assert_eq!(rows[1]["version"], 3);
    }

    #[tokio::test]
    async fn tag_membership_filter() {
        let store = MemoryStore::new();
        store.ensure_class(&TEST_CLASS).await.unwrap();
        store
            .put_object("Widget", id(1), json!({"tags": ["slo", "checkout"]}))
            .await
            .unwrap();
        store
            .put_object("Widget", id(2), json!({"tags": ["infra"]}))
            .await
            .unwrap();

        let rows = store
            .query(&QuerySpec::new("Widget").where_any_text("tags", ["checkout", "payments"]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn unknown_class_is_missing_class_error() {
        let store = MemoryStore::new();
        let err = store.query(&QuerySpec::new("Nope")).await.unwrap_err();
        assert!(crate::is_missing_class(&err));
    }

    #[tokio::test]
    async fn count_ignores_pagination() {
        let store = MemoryStore::new();
        store.ensure_class(&TEST_CLASS).await.unwrap();
        for v in 1..=4i64 {
            store
                .put_object("Widget", id(v as u128), json!({"tenantId": "t1"}))
                .await
                .unwrap();
        }
        let count = store
            .count(&QuerySpec::new("Widget").where_text("tenantId", "t1").limit(2))
            .await
            .unwrap();
        assert_eq!(count, Some(4));
    }
}

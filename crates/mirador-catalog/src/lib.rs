//! Mirador Catalog
//!
//! The Schema & KPI Catalog Engine: a tenant-scoped, versioned registry of
//! telemetry definitions. Every mutation appends an immutable version row;
//! reads go through the store's structured query interface; deletes keep
//! history for audit.

pub mod delete;
pub mod engine;
pub mod entity;
pub mod kpi;

pub use delete::{DeleteOrchestrator, DeleteOutcome, StoreOutcome};
pub use engine::CatalogEngine;
pub use entity::CatalogEntity;
pub use kpi::KpiPage;

//! Mirador Store
//!
//! Storage seam for the Mirador control plane. The canonical state lives
//! in a REST+GraphQL vector store behind the [`VectorBackend`] trait;
//! derived state (cache, search-index metadata) sits behind
//! [`MetadataCache`]. Both have in-memory implementations for development
//! and tests.

pub mod backend;
pub mod cache;
pub mod memory;
pub mod query;
pub mod schema;

pub use backend::{DynVectorBackend, HttpVectorStore, VectorBackend};
pub use cache::{DynMetadataCache, MemoryCache, MetadataCache, RedisCache};
pub use memory::MemoryStore;
pub use query::{Filter, Order, QuerySpec};
pub use schema::{class_definitions, ClassDefinition, PropertyDef, SchemaBootstrap};

use mirador_core::CoreError;

/// True when a store error reports that the backing class does not exist.
///
/// The catalog treats missing classes as empty reads (plus a monitoring
/// signal) and as a bootstrap-and-retry trigger for writes.
pub fn is_missing_class(err: &CoreError) -> bool {
    match err {
        CoreError::Store(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("cannot query field")
                || (msg.contains("class") && msg.contains("not found"))
        }
        _ => false,
    }
}

//! Route handlers, grouped by surface.

pub mod kpi;
pub mod rbac;
pub mod schema;
pub mod system;

use serde::Serialize;

/// Response for successful upserts.
#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub status: &'static str,
    pub version: i64,
}

impl UpsertResponse {
    pub fn ok(version: i64) -> Self {
        Self {
            status: "ok",
            version,
        }
    }
}

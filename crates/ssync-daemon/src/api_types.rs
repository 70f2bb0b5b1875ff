//! Request and response bodies for the daemon routes.

use serde::{Deserialize, Serialize};
use ssync_engine::{BackfillReport, DashboardRow};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub db_ok: bool,
    pub migrated: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Kind name (`"customer"`); absent means every kind.
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<CreatedRange>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CreatedRange {
    #[serde(default)]
    pub gte: Option<i64>,
    #[serde(default)]
    pub lte: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub report: BackfillReport,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub runs: Vec<DashboardRow>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

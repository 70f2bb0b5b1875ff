use std::sync::Arc;

use ssync_engine::SyncEngine;

/// Shared handler state. The engine is the only dependency; everything else
/// the handlers need hangs off it.
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub service: &'static str,
    pub version: &'static str,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            service: "ssync-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

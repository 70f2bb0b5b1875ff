//! Axum router and all HTTP handlers.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers afterwards so the scenario tests can compose the bare
//! router.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::error;

use ssync_engine::{BackfillOptions, CreatedFilter, ObjectKind, SyncError};

use crate::api_types::{
    ErrorResponse, HealthResponse, SyncRequest, SyncResponse, SyncStatusResponse,
};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/webhooks", post(receive_webhook))
        .route("/v1/sync", post(trigger_sync))
        .route("/v1/sync/status", get(sync_status))
        .route("/v1/webhooks", get(list_webhooks))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> Response {
    let db = match st.engine.db().status().await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "health probe failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: db.ok && db.migrated,
            db_ok: db.ok,
            migrated: db.migrated,
            service: st.service,
            version: st.version,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /webhooks — the provider-facing endpoint
// ---------------------------------------------------------------------------

/// Body must reach the engine byte-exact; any extractor that parses JSON
/// first would break signature verification.
pub(crate) async fn receive_webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match st.engine.process_webhook(&body, signature).await {
        // 202: applied. Stripe treats any 2xx as delivered.
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => sync_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/sync
// ---------------------------------------------------------------------------

pub(crate) async fn trigger_sync(
    State(st): State<Arc<AppState>>,
    Json(req): Json<SyncRequest>,
) -> Response {
    let object = match req.object.as_deref() {
        None | Some("all") => None,
        Some(name) => match ObjectKind::parse(name) {
            Some(kind) => Some(kind),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("unsupported object kind: {name}"),
                    }),
                )
                    .into_response();
            }
        },
    };

    let opts = BackfillOptions {
        object,
        created: req.created.map(|c| CreatedFilter {
            gte: c.gte,
            lte: c.lte,
        }),
        triggered_by: "http".to_string(),
    };

    match st.engine.process_until_done(&opts).await {
        Ok(report) => (StatusCode::OK, Json(SyncResponse { report })).into_response(),
        Err(e) => sync_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/sync/status
// ---------------------------------------------------------------------------

pub(crate) async fn sync_status(State(st): State<Arc<AppState>>) -> Response {
    match st.engine.sync_status(20).await {
        Ok(runs) => (StatusCode::OK, Json(SyncStatusResponse { runs })).into_response(),
        Err(e) => sync_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/webhooks
// ---------------------------------------------------------------------------

pub(crate) async fn list_webhooks(State(st): State<Arc<AppState>>) -> Response {
    match st.engine.list_managed_webhooks().await {
        Ok(webhooks) => (StatusCode::OK, Json(webhooks)).into_response(),
        Err(e) => sync_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn sync_error_response(e: SyncError) -> Response {
    let status = if e.is_signature() {
        StatusCode::BAD_REQUEST
    } else if e.is_concurrent_run() {
        StatusCode::CONFLICT
    } else {
        error!(error = %e, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

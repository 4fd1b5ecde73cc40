//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the bucket and the metadata store

use crate::services::catalog_service::{CatalogService, MetadataStatus};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Checks that the configured bucket exists in the object store.
/// 2. Pings the metadata store.
///
/// Only the object store decides the status code: HTTP 200 when the bucket
/// answers, HTTP 503 otherwise. A missing or failing metadata store is
/// reported but the service still serves uploads and degraded listings.
pub async fn readyz(State(catalog): State<CatalogService>) -> impl IntoResponse {
    let storage_check = match catalog.storage_ready().await {
        Ok(true) => CheckStatus::ok("ok"),
        Ok(false) => CheckStatus::failed(format!("bucket `{}` does not exist", catalog.bucket())),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let metadata_check = match catalog.metadata_status().await {
        MetadataStatus::Ok => CheckStatus::ok("ok"),
        MetadataStatus::Disabled => CheckStatus::ok("disabled"),
        MetadataStatus::Error(e) => CheckStatus {
            ok: false,
            state: "error",
            error: Some(e),
        },
    };

    let overall_ok = storage_check.ok;
    let degraded = !metadata_check.ok || metadata_check.state == "disabled";

    let mut checks = HashMap::new();
    checks.insert("object_store", storage_check);
    checks.insert("metadata", metadata_check);

    let body = ReadyResponse {
        status: match (overall_ok, degraded) {
            (false, _) => "error".into(),
            (true, true) => "degraded".into(),
            (true, false) => "ok".into(),
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    state: &'static str,
    error: Option<String>,
}

impl CheckStatus {
    fn ok(state: &'static str) -> Self {
        Self {
            ok: true,
            state,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            state: "error",
            error: Some(error),
        }
    }
}

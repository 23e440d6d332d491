//! The operator-facing zone management API plus the internal cluster
//! route, both served by the same `axum` router and guarded by the
//! same bearer-token middleware, per the peer-transport decision of
//! reusing the operator API rather than a bespoke protocol.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use zonehub_core::{Action, CacheError, CacheHandle, Config, StorageError};
use zonehub_proto::zone::Zone;

use crate::metrics::HTTP_REQUESTS_TOTAL;

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheHandle,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route(
            "/zones/:name",
            get(get_zone)
                .put(upsert_zone)
                .post(upsert_zone)
                .patch(patch_zone)
                .delete(delete_zone),
        )
        .route("/internal/apply-change", post(apply_change))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token));

    Router::new()
        .merge(authenticated)
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn require_bearer_token(State(state): State<AppState>, headers: HeaderMap, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.config.api_token);
    match headers.get("Authentication").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => next.run(request).await,
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    let cache_ready = matches!(
        state.cache.fetch_local("healthz.invalid").await,
        Ok(_) | Err(CacheError::NotFound)
    );
    let storage_ready = tokio::fs::create_dir_all(&state.config.zones_folder).await.is_ok();
    if cache_ready && storage_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn get_zone(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let response = match state.cache.fetch(&name).await {
        Ok(zone) => (StatusCode::OK, Json(zone)).into_response(),
        Err(CacheError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(error) => {
            tracing::warn!(%name, %error, "zone fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    record_http_request("GET /zones/:name", response.status());
    response
}

async fn upsert_zone(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Zone>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let response = upsert_zone_inner(state, name, body).await;
    record_http_request("PUT/POST /zones/:name", response.status());
    response
}

async fn upsert_zone_inner(
    state: AppState,
    name: String,
    body: Result<Json<Zone>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(zone) = match body {
        Ok(json) => json,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if zone.name != name {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let existed = state.cache.fetch_local(&name).await.is_ok();
    match state.cache.put(&name, zone).await {
        Ok(_) => {
            let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
            (status, Json(json!({"status": "ok"}))).into_response()
        }
        Err(CacheError::Storage(StorageError::Validation(_))) => StatusCode::BAD_REQUEST.into_response(),
        Err(error) => {
            tracing::warn!(%name, %error, "zone upsert failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn patch_zone(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Zone>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let response = patch_zone_inner(state, name, body).await;
    record_http_request("PATCH /zones/:name", response.status());
    response
}

async fn patch_zone_inner(
    state: AppState,
    name: String,
    body: Result<Json<Zone>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(zone) = match body {
        Ok(json) => json,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    if zone.name != name {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state.cache.update(&name, zone).await {
        Ok(updated) => (StatusCode::OK, Json(json!({"status": "ok", "version": updated.version}))).into_response(),
        Err(CacheError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(CacheError::VersionRequired | CacheError::VersionMismatch) => {
            StatusCode::UNPROCESSABLE_ENTITY.into_response()
        }
        Err(CacheError::Storage(StorageError::Validation(_))) => StatusCode::UNPROCESSABLE_ENTITY.into_response(),
        Err(error) => {
            tracing::warn!(%name, %error, "zone patch failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_zone(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let response = match state.cache.delete(&name).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        Err(CacheError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(error) => {
            tracing::warn!(%name, %error, "zone delete failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    record_http_request("DELETE /zones/:name", response.status());
    response
}

#[derive(Debug, Deserialize)]
struct ApplyChangeBody {
    action: Action,
    domain: String,
    #[serde(default)]
    data: Option<Zone>,
}

async fn apply_change(State(state): State<AppState>, Json(body): Json<ApplyChangeBody>) -> Response {
    let response = match state.cache.apply_change(body.action, &body.domain, body.data).await {
        Ok(data) => Json(json!({"ok": true, "data": data})).into_response(),
        Err(error) => {
            tracing::debug!(domain = %body.domain, %error, "apply_change failed");
            Json(json!({"ok": false})).into_response()
        }
    };
    record_http_request("POST /internal/apply-change", response.status());
    response
}

fn record_http_request(route: &str, status: StatusCode) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, status.as_str()])
        .inc();
}

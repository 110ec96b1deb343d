//! HTTP server for the asset proxy
//!
//! Renderer endpoints resolve keys to handles and dereference handles to
//! bytes. Operator endpoints expose statistics and maintenance.

use crate::caches::AssetCaches;
use crate::error::{ProxyError, Result};
use crate::types::{
    CleanExpiredResponse, ClearResponse, HealthResponse, KeyQuery, PrefetchRequest,
    PrefetchResponse, ResolveResponse, StatsResponse,
};
use asset_cache::{AssetCache, AssetKind, LocalHandle};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub caches: AssetCaches,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(caches: AssetCaches) -> Self {
        Self {
            caches,
            started_at: Utc::now(),
        }
    }

    fn cache(&self, kind: &str) -> Result<&AssetCache> {
        let kind: AssetKind = kind.parse()?;
        Ok(self.caches.get(kind))
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/resolve/{kind}", get(resolve))
        .route("/peek/{kind}", get(peek))
        .route("/refresh/{kind}", post(refresh))
        .route("/prefetch/{kind}", post(prefetch))
        .route("/handle/{id}", get(read_handle))
        .route("/stats", get(stats))
        .route("/maintenance/clean-expired", post(clean_expired))
        .route("/maintenance/clear", post(clear))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let (status, stats) = match state.caches.stats().await {
        Ok(stats) => ("ok", Some(stats)),
        Err(e) => {
            warn!(error = %e, "Asset storage unreadable");
            ("degraded", None)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime_secs,
        stats,
    })
}

async fn resolve(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ResolveResponse>> {
    let cache = state.cache(&kind)?;
    let resolved = match &query.seed {
        Some(seed) => cache.resolve_with_seed(&query.key, seed).await,
        None => cache.resolve(&query.key).await,
    };
    Ok(Json(resolved.into()))
}

/// Current handle without triggering a load
async fn peek(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ResolveResponse>> {
    let cache = state.cache(&kind)?;
    cache
        .peek(&query.key)
        .map(|handle| Json(handle.into()))
        .ok_or_else(|| ProxyError::NotFound(format!("no handle for {}", query.key)))
}

async fn refresh(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ResolveResponse>> {
    let cache = state.cache(&kind)?;
    debug!(kind = %kind, key = %query.key, "Refreshing asset");
    Ok(Json(cache.refresh(&query.key).await.into()))
}

async fn prefetch(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Json(request): Json<PrefetchRequest>,
) -> Result<Json<PrefetchResponse>> {
    let cache = state.cache(&kind)?;
    let requested = request.keys.len();
    let ready = cache.prefetch(&request.keys).await;
    Ok(Json(PrefetchResponse { requested, ready }))
}

/// Bytes behind a handle; gone once the handle is revoked
async fn read_handle(State(state): State<SharedState>, Path(id): Path<u64>) -> Result<Response> {
    let handle = LocalHandle::from_id(id);
    let data = state
        .caches
        .handles
        .read(handle)
        .ok_or_else(|| ProxyError::NotFound(format!("{} is not live", handle)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        data,
    )
        .into_response())
}

async fn stats(State(state): State<SharedState>) -> Result<Json<StatsResponse>> {
    Ok(Json(state.caches.stats().await?))
}

/// Sweep every kind, then report the first failure if any
async fn clean_expired(State(state): State<SharedState>) -> Result<Json<CleanExpiredResponse>> {
    let avatar = state.caches.avatars.clean_expired().await;
    let post_image = state.caches.post_images.clean_expired().await;

    Ok(Json(CleanExpiredResponse {
        avatar: avatar?,
        post_image: post_image?,
    }))
}

/// Clear every kind, then report the first failure if any
async fn clear(State(state): State<SharedState>) -> Result<Json<ClearResponse>> {
    let avatar = state.caches.avatars.clear_all().await;
    let post_image = state.caches.post_images.clear_all().await;

    Ok(Json(ClearResponse {
        avatar: avatar?,
        post_image: post_image?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_cache::{BoxError, FetchBytes};
    use asset_store::{BlobStore, MemoryBlobStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Serves "<kind>:<key>" for every key except "missing"
    struct StubFetcher {
        kind: AssetKind,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchBytes for StubFetcher {
        async fn fetch_bytes(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if key == "missing" {
                return Err("Asset not found".into());
            }
            Ok(Bytes::from(format!("{}:{}", self.kind, key)))
        }
    }

    fn create_test_state() -> SharedState {
        let caches = AssetCaches::assemble(3600, |kind| {
            let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
            let fetcher: Arc<dyn FetchBytes> = Arc::new(StubFetcher {
                kind,
                calls: AtomicUsize::new(0),
            });
            (store, fetcher)
        });
        Arc::new(ServerState::new(caches))
    }

    async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, Bytes) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn send_json(router: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(router, method, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(create_test_state());

        let (status, json) = send_json(&router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["stats"]["avatar"]["count"], 0);
        assert_eq!(json["stats"]["handles"]["live"], 0);
    }

    #[tokio::test]
    async fn test_resolve_then_read_handle() {
        let router = create_router(create_test_state());

        let (status, json) =
            send_json(&router, "GET", "/resolve/post-image?key=post%2Fa.jpg").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ready");
        let href = json["href"].as_str().unwrap().to_string();
        assert!(json["handle"].as_str().unwrap().starts_with("blob:asset-cache/"));

        let (status, body) = send(&router, "GET", &href).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"post-image:post/a.jpg");

        // Second resolve returns the same handle
        let (_, again) = send_json(&router, "GET", "/resolve/post-image?key=post%2Fa.jpg").await;
        assert_eq!(again["id"], json["id"]);
    }

    #[tokio::test]
    async fn test_resolve_failure_returns_fallback() {
        let router = create_router(create_test_state());

        let (status, json) = send_json(&router, "GET", "/resolve/avatar?key=missing").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "fallback");
        assert_eq!(json["fallback"]["type"], "generated_avatar");
        assert_eq!(
            json["fallback"]["url"],
            "https://api.dicebear.com/7.x/avataaars/svg?seed=missing"
        );

        let (_, json) =
            send_json(&router, "GET", "/resolve/avatar?key=missing&seed=user42").await;
        assert_eq!(
            json["fallback"]["url"],
            "https://api.dicebear.com/7.x/avataaars/svg?seed=user42"
        );

        let (_, json) = send_json(&router, "GET", "/resolve/post-image").await;
        assert_eq!(json["fallback"]["type"], "empty");
    }

    #[tokio::test]
    async fn test_unknown_kind_not_found() {
        let router = create_router(create_test_state());

        let (status, json) = send_json(&router, "GET", "/resolve/banner?key=a").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("banner"));
    }

    #[tokio::test]
    async fn test_peek_never_fetches() {
        let router = create_router(create_test_state());

        let (status, _) = send(&router, "GET", "/peek/avatar?key=u1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, resolved) = send_json(&router, "GET", "/resolve/avatar?key=u1").await;
        let (status, peeked) = send_json(&router, "GET", "/peek/avatar?key=u1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(peeked["id"], resolved["id"]);
    }

    #[tokio::test]
    async fn test_refresh_revokes_old_handle() {
        let router = create_router(create_test_state());

        let (_, first) = send_json(&router, "GET", "/resolve/avatar?key=u1").await;
        let (status, second) = send_json(&router, "POST", "/refresh/avatar?key=u1").await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(first["id"], second["id"]);

        let (status, _) = send(&router, "GET", first["href"].as_str().unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&router, "GET", second["href"].as_str().unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_prefetch_endpoint() {
        let router = create_router(create_test_state());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/prefetch/post-image")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"keys":["a","b","a","missing",""]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["requested"], 5);
        assert_eq!(json["ready"], 2);

        let (_, stats) = send_json(&router, "GET", "/stats").await;
        assert_eq!(stats["post_image"]["count"], 2);
        assert_eq!(stats["post_image"]["failures"], 1);
    }

    #[tokio::test]
    async fn test_maintenance_clear_revokes_handles() {
        let router = create_router(create_test_state());

        let (_, avatar) = send_json(&router, "GET", "/resolve/avatar?key=u1").await;
        send_json(&router, "GET", "/resolve/post-image?key=p1").await;

        let (status, json) = send_json(&router, "POST", "/maintenance/clear").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["avatar"], 1);
        assert_eq!(json["post_image"], 1);

        let (status, _) = send(&router, "GET", avatar["href"].as_str().unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, stats) = send_json(&router, "GET", "/stats").await;
        assert_eq!(stats["avatar"]["count"], 0);
        assert_eq!(stats["handles"]["live"], 0);
    }

    #[tokio::test]
    async fn test_maintenance_clean_expired_keeps_fresh_entries() {
        let router = create_router(create_test_state());
        send_json(&router, "GET", "/resolve/avatar?key=u1").await;

        let (status, json) = send_json(&router, "POST", "/maintenance/clean-expired").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["avatar"]["scanned"], 1);
        assert_eq!(json["avatar"]["removed"], 0);
        assert_eq!(json["post_image"]["scanned"], 0);
    }

    #[tokio::test]
    async fn test_handle_endpoint_rejects_unknown_id() {
        let router = create_router(create_test_state());

        let (status, _) = send(&router, "GET", "/handle/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clean_expired_sweeps_every_kind_before_failing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"in the way").unwrap();
        let broken: Arc<dyn BlobStore> =
            Arc::new(asset_store::FileBlobStore::open(blocker.join("avatar")).await);
        let post_store = Arc::new(MemoryBlobStore::new());
        post_store
            .put_at(
                "post/old.jpg",
                Bytes::from_static(b"old"),
                Utc::now() - chrono::Duration::days(2),
            )
            .await
            .unwrap();

        let caches = AssetCaches::assemble(3600, |kind| {
            let store: Arc<dyn BlobStore> = match kind {
                AssetKind::Avatar => Arc::clone(&broken),
                AssetKind::PostImage => post_store.clone() as Arc<dyn BlobStore>,
            };
            let fetcher: Arc<dyn FetchBytes> = Arc::new(StubFetcher {
                kind,
                calls: AtomicUsize::new(0),
            });
            (store, fetcher)
        });
        let router = create_router(Arc::new(ServerState::new(caches)));

        let (status, _) = send(&router, "POST", "/maintenance/clean-expired").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(post_store.get("post/old.jpg").await.is_none());
    }

    #[test]
    fn test_server_state_new() {
        let state = create_test_state();

        // started_at should be close to now
        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}

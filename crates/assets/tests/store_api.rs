//! Stores and playback against an in-process API double.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use gamma_assets::{
    AssetDetailFetch, AssetStatusStore, AttachOutcome, EngineFactory, PlaybackSessionManager,
    StrategyKind, StreamingEngine, Surface, SurfaceError, UploadListFetch,
};
use gamma_client::GammaApi;
use gamma_core::MediaStatus;
use serde_json::json;
use tokio::time::timeout;

#[derive(Default)]
struct Counters {
    list_calls: AtomicUsize,
    asset_calls: AtomicUsize,
    playlist_calls: AtomicUsize,
}

async fn list_uploads(State(c): State<Arc<Counters>>) -> Response {
    let n = c.list_calls.fetch_add(1, Ordering::SeqCst);
    if n == 1 {
        return (StatusCode::SERVICE_UNAVAILABLE, "down").into_response();
    }
    Json(json!([{"ID": "u1", "Title": "movie.mp4", "S3Key": "k1", "Status": "pending"}]))
        .into_response()
}

async fn get_asset(State(c): State<Arc<Counters>>, Path(id): Path<String>) -> Response {
    c.asset_calls.fetch_add(1, Ordering::SeqCst);
    if id != "a1" {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    Json(json!({"ID": "a1", "UploadID": "u1", "HlsRoot": "hls/u1/master.m3u8", "Status": "ready"}))
        .into_response()
}

async fn get_playlist(State(c): State<Arc<Counters>>, Path(id): Path<String>) -> Response {
    c.playlist_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"url": format!("https://cdn/{id}/master.m3u8")})).into_response()
}

async fn spawn_api() -> (Arc<GammaApi>, Arc<Counters>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let counters = Arc::new(Counters::default());
    let app = Router::new()
        .route("/uploads", get(list_uploads))
        .route("/assets/{id}", get(get_asset))
        .route("/assets/{id}/playlist", get(get_playlist))
        .with_state(Arc::clone(&counters));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let api = GammaApi::new(base, Duration::from_secs(5)).unwrap();
    (Arc::new(api), counters)
}

#[tokio::test]
async fn upload_list_store_degrades_to_stale_data() {
    let (api, counters) = spawn_api().await;
    let store = AssetStatusStore::spawn(UploadListFetch::new(api));
    let mut data = store.data();

    timeout(Duration::from_secs(5), data.wait_for(|s| s.data.is_some()))
        .await
        .unwrap()
        .unwrap();

    // Second call is answered with 503.
    store.refresh();
    timeout(Duration::from_secs(5), data.wait_for(|s| s.error.is_some()))
        .await
        .unwrap()
        .unwrap();

    let snap = store.snapshot();
    let uploads = snap.data.unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].status, MediaStatus::Pending);
    assert!(snap.error.unwrap().contains("503"));
    assert_eq!(counters.list_calls.load(Ordering::SeqCst), 2);
}

struct NativeSurface {
    sources: Mutex<Vec<String>>,
}

impl Surface for NativeSurface {
    fn can_play_type(&self, _media_type: &str) -> bool {
        true
    }

    fn set_source(&self, url: &str) -> Result<(), SurfaceError> {
        self.sources.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn clear_source(&self) {}
}

struct NoEngine;

impl EngineFactory for NoEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn create(&self) -> Box<dyn StreamingEngine> {
        unreachable!("software engine is disabled")
    }
}

#[tokio::test]
async fn ready_asset_from_store_plays_natively() {
    let (api, counters) = spawn_api().await;
    let store = AssetStatusStore::spawn(AssetDetailFetch::new(Arc::clone(&api), "a1"));
    let mut data = store.data();
    timeout(Duration::from_secs(5), data.wait_for(|s| s.data.is_some()))
        .await
        .unwrap()
        .unwrap();
    let asset = store.snapshot().data.unwrap();
    assert_eq!(asset.status, MediaStatus::Ready);

    let manager = PlaybackSessionManager::new(api, Arc::new(NoEngine));
    let surface = Arc::new(NativeSurface {
        sources: Mutex::new(Vec::new()),
    });
    let outcome = manager.attach(&asset, surface.clone()).await.unwrap();

    let handle = assert_matches!(outcome, AttachOutcome::Bound(h) => h);
    assert_eq!(handle.strategy, StrategyKind::Native);
    assert_eq!(
        *surface.sources.lock().unwrap(),
        vec!["https://cdn/a1/master.m3u8"]
    );
    assert_eq!(counters.playlist_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.asset_calls.load(Ordering::SeqCst), 1);
}

//! Upload, live notification and playback against one in-process server.
//!
//! The router plays both the HTTP API and the live WebSocket endpoint.
//! Frames pushed through `Server::events` reach every connected socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use gamma_app::{AssetDetailController, PlayerView, UploadOrchestrationController};
use gamma_assets::{
    AssetDetailFetch, AssetStatusStore, EngineFactory, PlaybackSessionManager, StrategyKind,
    StreamingEngine, Surface, SurfaceError, UploadListFetch,
};
use gamma_client::{GammaApi, UploadClient, UploadFile};
use gamma_core::MediaStatus;
use gamma_live::{ChannelState, LiveStatusChannel, ReconnectConfig};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Server {
    base: String,
    uploads: Mutex<Vec<Value>>,
    received: AtomicUsize,
    list_calls: AtomicUsize,
    playlist_calls: AtomicUsize,
    events: broadcast::Sender<String>,
}

async fn create_upload(State(s): State<Arc<Server>>, Json(body): Json<Value>) -> Response {
    let title = body["filename"].as_str().unwrap_or_default().to_string();
    s.uploads.lock().unwrap().push(json!({
        "ID": "u1", "Title": title, "S3Key": "k1", "Status": "pending"
    }));
    Json(json!({
        "id": "u1",
        "upload_url": format!("{}/store/u1", s.base),
        "key": "k1",
    }))
    .into_response()
}

async fn store_bytes(State(s): State<Arc<Server>>, body: Bytes) -> StatusCode {
    s.received.store(body.len(), Ordering::SeqCst);
    StatusCode::OK
}

async fn list_uploads(State(s): State<Arc<Server>>) -> Json<Value> {
    s.list_calls.fetch_add(1, Ordering::SeqCst);
    Json(Value::Array(s.uploads.lock().unwrap().clone()))
}

async fn get_asset(Path(id): Path<String>) -> Response {
    if id != "a1" {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    Json(json!({"ID": "a1", "UploadID": "u1", "HlsRoot": "hls/u1/master.m3u8", "Status": "ready"}))
        .into_response()
}

async fn get_playlist(State(s): State<Arc<Server>>, Path(id): Path<String>) -> Json<Value> {
    s.playlist_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"url": format!("https://cdn/{id}/master.m3u8")}))
}

async fn ws_handler(ws: WebSocketUpgrade, State(s): State<Arc<Server>>) -> Response {
    // Subscribe before the handshake completes so no frame is missed.
    let events = s.events.subscribe();
    ws.on_upgrade(move |socket| forward(socket, events))
}

async fn forward(mut socket: WebSocket, mut events: broadcast::Receiver<String>) {
    while let Ok(frame) = events.recv().await {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
}

async fn spawn_server() -> Arc<Server> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (events, _) = broadcast::channel(16);
    let server = Arc::new(Server {
        base: format!("http://{}", listener.local_addr().unwrap()),
        uploads: Mutex::new(Vec::new()),
        received: AtomicUsize::new(0),
        list_calls: AtomicUsize::new(0),
        playlist_calls: AtomicUsize::new(0),
        events,
    });
    let app = Router::new()
        .route("/uploads", get(list_uploads).post(create_upload))
        .route("/store/{id}", put(store_bytes))
        .route("/assets/{id}", get(get_asset))
        .route("/assets/{id}/playlist", get(get_playlist))
        .route("/ws", get(ws_handler))
        .with_state(Arc::clone(&server));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    server
}

struct NativeOnly;

impl EngineFactory for NativeOnly {
    fn is_supported(&self) -> bool {
        false
    }

    fn create(&self) -> Box<dyn StreamingEngine> {
        unreachable!("software engine disabled")
    }
}

#[derive(Default)]
struct RecordingSurface {
    sources: Mutex<Vec<String>>,
}

impl Surface for RecordingSurface {
    fn can_play_type(&self, _media_type: &str) -> bool {
        true
    }

    fn set_source(&self, url: &str) -> Result<(), SurfaceError> {
        self.sources.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn clear_source(&self) {}
}

#[tokio::test]
async fn upload_is_announced_live_and_the_asset_plays() {
    let server = spawn_server().await;
    let api = Arc::new(GammaApi::new(server.base.clone(), WAIT).unwrap());
    let ws_url = format!("{}/ws", server.base.replacen("http", "ws", 1));
    let live = LiveStatusChannel::websocket(ws_url, ReconnectConfig::fixed(Duration::from_millis(50)));

    let store = Arc::new(AssetStatusStore::spawn(UploadListFetch::new(Arc::clone(&api))));
    let controller =
        UploadOrchestrationController::new(UploadClient::new(api.clone()), store.clone(), &live);

    let mut channel_state = live.watch_state();
    timeout(WAIT, channel_state.wait_for(|s| *s == ChannelState::Open))
        .await
        .unwrap()
        .unwrap();

    let mut list = store.data();
    timeout(WAIT, list.wait_for(|s| s.data.as_ref().is_some_and(|d| d.is_empty())))
        .await
        .unwrap()
        .unwrap();

    // Upload: session, transfer, then a list refresh showing the new record.
    controller
        .handle_file(UploadFile::new("movie.mp4", "video/mp4", vec![7u8; 4096]))
        .unwrap();
    let mut ui = controller.state();
    let done = timeout(WAIT, ui.wait_for(|s| !s.uploading && s.last_completed.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(done.progress_percent, 100);
    assert!(done.last_error.is_none());
    assert_eq!(done.last_completed.unwrap().id, "u1");
    assert_eq!(server.received.load(Ordering::SeqCst), 4096);

    timeout(
        WAIT,
        list.wait_for(|s| {
            s.data
                .as_ref()
                .is_some_and(|d| d.len() == 1 && d[0].status == MediaStatus::Pending)
        }),
    )
    .await
    .unwrap()
    .unwrap();

    // Processing finishes server-side; the live frame triggers a refresh.
    let calls_before = server.list_calls.load(Ordering::SeqCst);
    server.uploads.lock().unwrap()[0]["Status"] = json!("ready");
    server
        .events
        .send(r#"{"type":"asset_processed","data":{"id":"u1"}}"#.to_string())
        .unwrap();
    timeout(
        WAIT,
        list.wait_for(|s| {
            s.data
                .as_ref()
                .is_some_and(|d| d.first().is_some_and(|u| u.status == MediaStatus::Ready))
        }),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(server.list_calls.load(Ordering::SeqCst) > calls_before);

    // Detail view: the ready asset binds exactly one strategy.
    let asset_store = Arc::new(AssetStatusStore::spawn(AssetDetailFetch::new(
        Arc::clone(&api),
        "a1",
    )));
    let manager = Arc::new(PlaybackSessionManager::new(api.clone(), Arc::new(NativeOnly)));
    let surface = Arc::new(RecordingSurface::default());
    let detail = AssetDetailController::open(asset_store, Arc::clone(&manager), surface.clone());

    let mut view = detail.view();
    timeout(WAIT, view.wait_for(|v| *v == PlayerView::Playing(StrategyKind::Native)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        *surface.sources.lock().unwrap(),
        vec!["https://cdn/a1/master.m3u8"]
    );
    assert_eq!(server.playlist_calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.active_asset().as_deref(), Some("a1"));

    assert!(detail.close());
    assert_eq!(manager.active_asset(), None);

    live.shutdown().await;
}

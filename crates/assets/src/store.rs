//! Switch-to-latest cache for server-side media state.
//!
//! [`AssetStatusStore`] runs one driver task that owns a trigger channel
//! and at most one in-flight fetch. Every trigger bumps the generation and
//! replaces the in-flight fetch (dropping the old future cancels it).
//! Triggers that queue up while the driver is busy collapse into one
//! fetch. A finished fetch is published only if its generation is still
//! the latest.
//!
//! Consumers never see an error raised: a failed fetch keeps the previous
//! data and records the error next to it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use gamma_client::{ApiError, GammaApi};
use gamma_core::{AssetRecord, UploadRecord};
use gamma_live::{LiveStatusChannel, Subscription};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One fetch of the cached value.
#[async_trait]
pub trait Fetch<T>: Send + Sync + 'static {
    async fn fetch(&self) -> Result<T, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Fetch failed: {0}")]
    Fetch(String),
}

/// Consumer-visible state of a store.
#[derive(Debug)]
pub struct Snapshot<T> {
    /// Last successfully fetched value.
    pub data: Option<Arc<T>>,
    /// Error of the latest fetch, cleared by the next success.
    pub error: Option<String>,
    /// A fetch is in flight.
    pub loading: bool,
    /// Trigger generation whose result `data`/`error` reflect.
    pub generation: u64,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            loading: self.loading,
            generation: self.generation,
        }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            generation: 0,
        }
    }
}

type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send>>;

struct InFlight<T> {
    generation: u64,
    future: FetchFuture<T>,
}

/// Cache of one collection or record, kept fresh by triggers.
pub struct AssetStatusStore<T> {
    trigger_tx: mpsc::UnboundedSender<()>,
    snapshot_rx: watch::Receiver<Snapshot<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> AssetStatusStore<T> {
    /// Start the driver task and issue the initial fetch.
    pub fn spawn(fetcher: impl Fetch<T>) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let fetcher: Arc<dyn Fetch<T>> = Arc::new(fetcher);

        let task = tokio::spawn(drive(fetcher, trigger_rx, snapshot_tx));
        let _ = trigger_tx.send(());

        Self {
            trigger_tx,
            snapshot_rx,
            task,
        }
    }

    /// Request a refetch. Returns immediately.
    pub fn refresh(&self) {
        let _ = self.trigger_tx.send(());
    }

    /// Receiver that observes every published snapshot.
    pub fn data(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot_rx.clone()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.snapshot_rx.borrow().clone()
    }

    /// Refresh on every processing-complete event from the live channel.
    ///
    /// Dropping the returned subscription stops following.
    pub fn follow(&self, channel: &LiveStatusChannel) -> Subscription {
        let trigger_tx = self.trigger_tx.clone();
        channel.subscribe(move |event| {
            if event.is_processing_complete() {
                let _ = trigger_tx.send(());
            }
        })
    }
}

impl<T> Drop for AssetStatusStore<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Driver loop. Exits when every trigger sender is gone.
async fn drive<T: Send + Sync + 'static>(
    fetcher: Arc<dyn Fetch<T>>,
    mut triggers: mpsc::UnboundedReceiver<()>,
    snapshot_tx: watch::Sender<Snapshot<T>>,
) {
    let mut generation: u64 = 0;
    let mut in_flight: Option<InFlight<T>> = None;

    loop {
        tokio::select! {
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    return;
                }
                let mut coalesced = 0u32;
                while triggers.try_recv().is_ok() {
                    coalesced += 1;
                }

                generation += 1;
                if let Some(previous) = in_flight.take() {
                    tracing::debug!(
                        superseded = previous.generation,
                        generation,
                        "Cancelling in-flight fetch"
                    );
                }
                tracing::debug!(generation, coalesced, "Fetch triggered");

                let fetcher = Arc::clone(&fetcher);
                in_flight = Some(InFlight {
                    generation,
                    future: Box::pin(async move { fetcher.fetch().await }),
                });
                snapshot_tx.send_modify(|s| s.loading = true);
            }
            (fetched_generation, result) = settle(&mut in_flight) => {
                in_flight = None;
                if fetched_generation != generation {
                    tracing::debug!(fetched_generation, generation, "Discarding stale fetch result");
                    continue;
                }
                publish(&snapshot_tx, fetched_generation, result);
            }
        }
    }
}

/// Resolve the in-flight fetch, or never if there is none.
async fn settle<T>(in_flight: &mut Option<InFlight<T>>) -> (u64, Result<T, StoreError>) {
    match in_flight {
        Some(fetch) => {
            let result = fetch.future.as_mut().await;
            (fetch.generation, result)
        }
        None => std::future::pending().await,
    }
}

fn publish<T>(
    snapshot_tx: &watch::Sender<Snapshot<T>>,
    generation: u64,
    result: Result<T, StoreError>,
) {
    match result {
        Ok(value) => snapshot_tx.send_modify(|s| {
            s.data = Some(Arc::new(value));
            s.error = None;
            s.loading = false;
            s.generation = generation;
        }),
        Err(e) => {
            tracing::warn!(generation, error = %e, "Fetch failed, keeping previous data");
            snapshot_tx.send_modify(|s| {
                s.error = Some(e.to_string());
                s.loading = false;
                s.generation = generation;
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// `GET /uploads`.
pub struct UploadListFetch {
    api: Arc<GammaApi>,
}

impl UploadListFetch {
    pub fn new(api: Arc<GammaApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Fetch<Vec<UploadRecord>> for UploadListFetch {
    async fn fetch(&self) -> Result<Vec<UploadRecord>, StoreError> {
        Ok(self.api.list_uploads().await?)
    }
}

/// `GET /assets/{id}`.
pub struct AssetDetailFetch {
    api: Arc<GammaApi>,
    asset_id: String,
}

impl AssetDetailFetch {
    pub fn new(api: Arc<GammaApi>, asset_id: impl Into<String>) -> Self {
        Self {
            api,
            asset_id: asset_id.into(),
        }
    }
}

#[async_trait]
impl Fetch<AssetRecord> for AssetDetailFetch {
    async fn fetch(&self) -> Result<AssetRecord, StoreError> {
        Ok(self.api.get_asset(&self.asset_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use futures::StreamExt;
    use gamma_live::{Connector, FrameStream, LiveError, ReconnectConfig};
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use super::*;

    type Reply = oneshot::Sender<Result<String, StoreError>>;

    /// Fetcher whose every call is answered by the test.
    struct ScriptedFetch {
        requests: mpsc::UnboundedSender<(u32, Reply)>,
        started: AtomicU32,
        completed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Fetch<String> for ScriptedFetch {
        async fn fetch(&self) -> Result<String, StoreError> {
            let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            let (tx, rx) = oneshot::channel();
            self.requests.send((n, tx)).unwrap();
            let result = rx
                .await
                .unwrap_or_else(|_| Err(StoreError::Fetch("reply dropped".into())));
            self.completed.fetch_add(1, Ordering::SeqCst);
            result
        }
    }

    fn scripted() -> (
        AssetStatusStore<String>,
        mpsc::UnboundedReceiver<(u32, Reply)>,
        Arc<AtomicU32>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let completed = Arc::new(AtomicU32::new(0));
        let store = AssetStatusStore::spawn(ScriptedFetch {
            requests: tx,
            started: AtomicU32::new(0),
            completed: Arc::clone(&completed),
        });
        (store, rx, completed)
    }

    async fn next_request(rx: &mut mpsc::UnboundedReceiver<(u32, Reply)>) -> (u32, Reply) {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for fetch")
            .expect("fetcher gone")
    }

    async fn wait_until<T, F>(store: &AssetStatusStore<T>, pred: F) -> Snapshot<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&Snapshot<T>) -> bool,
    {
        let mut rx = store.data();
        let snapshot = timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("store gone")
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn initial_fetch_runs_on_spawn() {
        let (store, mut requests, _) = scripted();
        let (n, reply) = next_request(&mut requests).await;
        assert_eq!(n, 1);
        assert!(store.snapshot().loading);

        reply.send(Ok("first".into())).unwrap();
        let snap = wait_until(&store, |s| s.data.is_some()).await;

        assert_eq!(snap.data.as_deref().map(String::as_str), Some("first"));
        assert!(snap.error.is_none());
        assert!(!snap.loading);
    }

    #[tokio::test]
    async fn newer_trigger_supersedes_in_flight_fetch() {
        let (store, mut requests, completed) = scripted();
        let (_, first_reply) = next_request(&mut requests).await;

        store.refresh();
        let (n, second_reply) = next_request(&mut requests).await;
        assert_eq!(n, 2);

        // The first fetch was cancelled, so its late answer goes nowhere.
        assert!(first_reply.send(Ok("stale".into())).is_err());
        second_reply.send(Ok("fresh".into())).unwrap();

        let snap = wait_until(&store, |s| s.data.is_some()).await;
        assert_eq!(snap.data.as_deref().map(String::as_str), Some("fresh"));
        assert_eq!(snap.generation, 2);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn burst_of_triggers_coalesces_into_one_fetch() {
        let (store, mut requests, _) = scripted();
        // Current-thread runtime: the driver has not run yet.
        for _ in 0..5 {
            store.refresh();
        }

        let (n, reply) = next_request(&mut requests).await;
        assert_eq!(n, 1);
        reply.send(Ok("once".into())).unwrap();
        wait_until(&store, |s| s.data.is_some()).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_stale_data_and_sets_error() {
        let (store, mut requests, _) = scripted();
        let (_, reply) = next_request(&mut requests).await;
        reply.send(Ok("v1".into())).unwrap();
        wait_until(&store, |s| s.data.is_some()).await;

        store.refresh();
        let (_, reply) = next_request(&mut requests).await;
        reply.send(Err(StoreError::Fetch("boom".into()))).unwrap();
        let snap = wait_until(&store, |s| s.error.is_some()).await;

        assert_eq!(snap.data.as_deref().map(String::as_str), Some("v1"));
        assert!(snap.error.as_deref().unwrap().contains("boom"));

        store.refresh();
        let (_, reply) = next_request(&mut requests).await;
        reply.send(Ok("v2".into())).unwrap();
        let snap = wait_until(&store, |s| s.error.is_none() && !s.loading).await;
        assert_eq!(snap.data.as_deref().map(String::as_str), Some("v2"));
    }

    struct QueueConnector {
        frames: std::sync::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    }

    #[async_trait]
    impl Connector for QueueConnector {
        async fn connect(&self) -> Result<FrameStream, LiveError> {
            match self.frames.lock().unwrap().take() {
                Some(rx) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|t| (Ok(t), rx))
                })
                .boxed()),
                None => Err(LiveError::Connection("no more connections".into())),
            }
        }
    }

    #[tokio::test]
    async fn follow_refreshes_on_processing_complete_only() {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let channel = LiveStatusChannel::new(
            Arc::new(QueueConnector {
                frames: std::sync::Mutex::new(Some(frames_rx)),
            }),
            ReconnectConfig::default(),
        );
        let (store, mut requests, _) = scripted();
        let (_, reply) = next_request(&mut requests).await;
        reply.send(Ok("initial".into())).unwrap();
        wait_until(&store, |s| s.data.is_some()).await;

        let _following = store.follow(&channel);
        frames_tx.send(r#"{"type":"heartbeat"}"#.into()).unwrap();
        frames_tx
            .send(r#"{"type":"asset_processed","data":{"id":"u1"}}"#.into())
            .unwrap();

        let (n, reply) = next_request(&mut requests).await;
        assert_eq!(n, 2);
        reply.send(Ok("after event".into())).unwrap();
        let snap = wait_until(&store, |s| s.generation == 2).await;
        assert_eq!(snap.data.as_deref().map(String::as_str), Some("after event"));
        channel.shutdown().await;
    }
}

//! The shared live status channel.
//!
//! [`LiveStatusChannel`] owns one background task that runs
//! connect -> process frames -> wait -> reconnect until shut down.
//! Every decoded event is delivered to all current subscribers in the
//! order frames arrived. Malformed frames are logged and dropped.
//!
//! The connection is opened lazily by the first [`subscribe`] (or an
//! explicit [`start`]) and stays open when the last subscriber leaves.
//!
//! [`subscribe`]: LiveStatusChannel::subscribe
//! [`start`]: LiveStatusChannel::start

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{Connector, WsConnector};
use crate::messages::{parse_frame, LiveEvent};
use crate::reconnect::ReconnectConfig;
use crate::subscribers::{SubscriberRegistry, Subscription};

/// How long [`LiveStatusChannel::shutdown`] waits for the task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle as observed by the channel task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// An attempt to open the connection is in progress (or has not started).
    Connecting,
    /// Connected and receiving frames.
    Open,
    /// The connection dropped or failed; waiting out the reconnect delay.
    ClosedRetrying,
}

/// Cheaply cloneable handle to the process-wide live channel.
#[derive(Clone)]
pub struct LiveStatusChannel {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    reconnect: ReconnectConfig,
    subscribers: Arc<SubscriberRegistry>,
    state_tx: Arc<watch::Sender<ChannelState>>,
    attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LiveStatusChannel {
    /// Create a channel over an arbitrary connector. Nothing connects yet.
    pub fn new(connector: Arc<dyn Connector>, reconnect: ReconnectConfig) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        Self {
            inner: Arc::new(Inner {
                connector,
                reconnect,
                subscribers: Arc::new(SubscriberRegistry::default()),
                state_tx: Arc::new(state_tx),
                attempts: Arc::new(AtomicU64::new(0)),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Create a channel that connects to a WebSocket endpoint.
    pub fn websocket(url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self::new(Arc::new(WsConnector::new(url)), reconnect)
    }

    /// Spawn the connection task if it is not running yet. Idempotent.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }

        let runner = ChannelTask {
            connector: Arc::clone(&self.inner.connector),
            reconnect: self.inner.reconnect.clone(),
            subscribers: Arc::clone(&self.inner.subscribers),
            state_tx: Arc::clone(&self.inner.state_tx),
            attempts: Arc::clone(&self.inner.attempts),
            cancel: self.inner.cancel.clone(),
        };

        *task = Some(tokio::spawn(async move {
            tracing::info!("Starting live channel task");
            runner.run().await;
            tracing::info!("Live channel task exited");
        }));
    }

    /// Register a handler for every future event. Starts the connection
    /// if this is the first use.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        let subscription = self.inner.subscribers.add(Arc::new(handler));
        self.start();
        subscription
    }

    /// Subscribe and receive events through an unbounded queue instead
    /// of a callback.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<LiveEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        *self.inner.state_tx.borrow()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Number of connection attempts made so far, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Stop the connection task and wait briefly for it to exit.
    ///
    /// The channel cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down live channel");
        self.inner.cancel.cancel();

        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        }
    }
}

/// Everything the background task needs, without a reference back to
/// the handle (so dropping the last handle cancels the task).
struct ChannelTask {
    connector: Arc<dyn Connector>,
    reconnect: ReconnectConfig,
    subscribers: Arc<SubscriberRegistry>,
    state_tx: Arc<watch::Sender<ChannelState>>,
    attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl ChannelTask {
    /// Core loop: connect -> process frames -> wait -> reconnect.
    ///
    /// Runs until the cancellation token is triggered.
    async fn run(&self) {
        let mut delay = self.reconnect.initial_delay;

        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.set_state(ChannelState::Connecting);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(mut frames) => {
                    self.set_state(ChannelState::Open);
                    delay = self.reconnect.initial_delay;
                    tracing::info!(attempt, "Live channel open");

                    loop {
                        tokio::select! {
                            _ = self.cancel.cancelled() => return,
                            next = frames.next() => match next {
                                Some(Ok(text)) => self.handle_frame(&text),
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "Live channel connection lost");
                                    break;
                                }
                                None => {
                                    tracing::info!("Live channel stream ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Live channel connect failed");
                }
            }

            self.set_state(ChannelState::ClosedRetrying);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                "Reconnecting live channel after delay"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            delay = self.reconnect.next_delay(delay);
        }
    }

    fn handle_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(event) => {
                tracing::debug!(kind = event.kind(), "Live event received");
                self.subscribers.emit(&event);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed live frame");
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        self.state_tx.send_replace(state);
    }
}

//! The reconnecting change-stream consumer.

use std::sync::Arc;

use changefeed_core::record::ChangeEvent;
use futures::StreamExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::decoder::SseDecoder;
use crate::error::TransportError;
use crate::state::{ConnectionStatus, ConsumerState};
use crate::subscriptions::{Subscription, SubscriptionRegistry};
use crate::transport::{ByteStream, StreamTransport};

/// Holds one stream connection at a time, reconnecting with backoff and
/// resuming after the last received event. Received events go to the
/// registered subscribers.
pub struct ChangeStreamClient {
    subscriptions: SubscriptionRegistry,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeStreamClient {
    /// Starts consuming from `transport` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(transport: Arc<dyn StreamTransport>) -> Self {
        Self::with_state(transport, SubscriptionRegistry::new(), ConsumerState::new)
    }

    /// Like `connect`, with a custom state constructor (for example, to
    /// shorten reconnect delays).
    #[must_use]
    pub fn with_state(
        transport: Arc<dyn StreamTransport>,
        subscriptions: SubscriptionRegistry,
        state: impl FnOnce(SubscriptionRegistry) -> ConsumerState,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = state(subscriptions.clone());
        let task = tokio::spawn(drive(transport, state, status_tx, shutdown_rx));

        Self {
            subscriptions,
            status: status_rx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Calls `callback` for every received event named in `names`, or for
    /// every event when `names` is empty.
    pub fn subscribe<F>(&self, names: &[&str], callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(names, callback)
    }

    /// Tracks the most recent event named in `names`.
    pub fn watch_latest(
        &self,
        names: &[&str],
    ) -> (Subscription, watch::Receiver<Option<ChangeEvent>>) {
        let (tx, rx) = watch::channel(None);
        let subscription = self.subscribe(names, move |event| {
            tx.send_replace(Some(event.clone()));
        });
        (subscription, rx)
    }

    /// Returns the current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Returns a receiver notified on every status change.
    #[must_use]
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Closes the connection and cancels any pending reconnect. The status
    /// is `Disconnected` once this returns. Calling it again is a no-op.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "change stream driver ended abnormally");
            }
        }
    }
}

impl Drop for ChangeStreamClient {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn closed(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means shutdown.
    let _ = shutdown.wait_for(|closed| *closed).await;
}

enum Outcome {
    Shutdown,
    Lost(TransportError),
}

async fn drive(
    transport: Arc<dyn StreamTransport>,
    mut state: ConsumerState,
    status: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let cursor = state.begin_connect();
        status.send_replace(state.status().clone());

        let outcome = tokio::select! {
            biased;
            () = closed(&mut shutdown) => Outcome::Shutdown,
            opened = transport.open(cursor) => match opened {
                Ok(stream) => {
                    state.on_open();
                    status.send_replace(state.status().clone());
                    info!(resume_after = ?cursor, "change stream connected");
                    consume(stream, &mut state, &mut shutdown).await
                }
                Err(e) => Outcome::Lost(e),
            },
        };

        let delay = match outcome {
            Outcome::Shutdown => break,
            Outcome::Lost(e) => {
                let delay = state.on_error(&e);
                status.send_replace(state.status().clone());
                warn!(error = %e, retry_in = ?delay, "change stream connection lost");
                delay
            }
        };

        tokio::select! {
            biased;
            () = closed(&mut shutdown) => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    state.teardown();
    status.send_replace(state.status().clone());
    debug!("change stream client closed");
}

async fn consume(
    mut stream: ByteStream,
    state: &mut ConsumerState,
    shutdown: &mut watch::Receiver<bool>,
) -> Outcome {
    let mut decoder = SseDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;
            () = closed(shutdown) => return Outcome::Shutdown,
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for message in decoder.push(&bytes) {
                    state.on_message(&message);
                }
            }
            Some(Err(e)) => return Outcome::Lost(e),
            None => return Outcome::Lost(TransportError::Closed),
        }
    }
}

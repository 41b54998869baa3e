//! Shared application state.

use std::sync::Arc;

use changefeed_plugin::plugin::EventsPlugin;
use tokio::sync::watch;

use crate::auth::ApiTokens;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The changefeed plugin, bound to the event store.
    pub plugin: Arc<EventsPlugin>,
    /// Credentials accepted as authenticated users.
    pub tokens: Arc<ApiTokens>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(plugin: Arc<EventsPlugin>, tokens: ApiTokens) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            plugin,
            tokens: Arc::new(tokens),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Signals every open change stream to end.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once `begin_shutdown` has been called. Dropping every
    /// clone of the state without calling it never resolves the signal.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut receiver = self.shutdown.subscribe();
        async move {
            if receiver.wait_for(|closing| *closing).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

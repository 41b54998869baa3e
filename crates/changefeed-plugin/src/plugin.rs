//! Installs the changefeed into a host configuration.

use std::sync::Arc;

use changefeed_core::clock::Clock;
use changefeed_core::config::PluginConfig;
use changefeed_core::error::DomainError;
use changefeed_core::host::{EndpointConfig, HostConfig, HttpMethod};
use changefeed_core::record::{EVENTS_COLLECTION, EventId, EventName};
use changefeed_core::store::EventStore;
use tracing::{debug, info};

use crate::application::change_stream::ChangeStream;
use crate::application::event_writer::{ChangeHooks, EventWriter};
use crate::application::publish::EventPublisher;
use crate::application::retention::{RetentionSweeper, SweeperHandle};
use crate::domain::collection::events_collection;

/// Path of the change-stream endpoint, relative to the API prefix.
pub const STREAM_PATH: &str = "/_events/stream";

/// The changefeed plugin: a sanitized configuration bound to an event store.
pub struct EventsPlugin {
    config: PluginConfig,
    store: Arc<dyn EventStore>,
    writer: Arc<EventWriter>,
}

impl EventsPlugin {
    #[must_use]
    pub fn new(config: PluginConfig, store: Arc<dyn EventStore>) -> Self {
        let writer = Arc::new(EventWriter::new(Arc::clone(&store)));
        Self {
            config,
            store,
            writer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Returns the event store the plugin writes to.
    #[must_use]
    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    /// Extends `host` with the changefeed.
    ///
    /// Appends change hooks to every target collection (configured
    /// collections plus the jobs collection, never the events collection),
    /// registers the events collection unless the host already has one, and
    /// adds the change-stream endpoint. A disabled plugin still registers the
    /// collection, but its hooks record nothing.
    #[must_use]
    pub fn apply(&self, mut host: HostConfig) -> HostConfig {
        let registered: Vec<&str> = host.collections.iter().map(|c| c.slug.as_str()).collect();
        let targets = self.config.target_collections(&registered);

        for target in &targets {
            let Some(collection) = host.collections.iter_mut().find(|c| &c.slug == target) else {
                debug!(collection = %target, "target collection is not registered, skipping");
                continue;
            };
            let hooks = Arc::new(ChangeHooks::new(
                target.clone(),
                Arc::clone(&self.writer),
                self.config.disabled,
            ));
            collection.hooks.after_change.push(hooks.clone());
            collection.hooks.after_delete.push(hooks);
        }

        if host.collection(EVENTS_COLLECTION).is_none() {
            host.collections.push(events_collection(&self.config.admin));
        }

        host.endpoints.push(EndpointConfig {
            path: STREAM_PATH.to_owned(),
            method: HttpMethod::Get,
        });

        host
    }

    /// Runs the plugin's init step: starts the retention sweeper unless the
    /// plugin is disabled.
    #[must_use = "dropping the handle stops the sweeper"]
    pub fn on_init(&self, clock: Arc<dyn Clock>) -> Option<SweeperHandle> {
        if self.config.disabled {
            info!("changefeed plugin disabled, retention sweeper not started");
            return None;
        }

        let handle = RetentionSweeper::new(self.store(), clock, self.config.retention())
            .with_interval(self.config.sweep_interval())
            .start();
        info!(
            retention_ms = self.config.retention_ms,
            poll_interval_ms = self.config.poll_interval_ms,
            "changefeed plugin initialized"
        );
        Some(handle)
    }

    /// Opens a change stream bound to this plugin's store.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a fresh stream cannot read the store's
    /// current time.
    pub async fn change_stream(
        &self,
        resume_after: Option<EventId>,
        names: Option<Vec<EventName>>,
    ) -> Result<ChangeStream, DomainError> {
        ChangeStream::connect(self.store(), resume_after, names).await
    }

    #[must_use]
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher::new(self.store())
    }
}

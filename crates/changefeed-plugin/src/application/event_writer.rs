//! Turns document-change notifications into persisted event records.

use std::sync::Arc;

use async_trait::async_trait;
use changefeed_core::hooks::{AfterChangeHook, AfterDeleteHook, ChangeKind, HookContext};
use changefeed_core::record::{
    ChangePayload, EVENTS_COLLECTION, EventName, EventRecord, NewEventRecord, Operation,
};
use changefeed_core::store::{EventStore, WriteContext};
use tracing::{debug, error};

/// Persists one event record per reported document change.
pub struct EventWriter {
    store: Arc<dyn EventStore>,
}

impl EventWriter {
    /// Creates a writer persisting into `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Records `operation` on `document` in `collection`.
    ///
    /// Returns `None` without touching the store when the collection is the
    /// events collection itself or `skip_events` is set. Store failures are
    /// logged and also yield `None`; they never reach the caller.
    pub async fn record(
        &self,
        collection: &str,
        operation: Operation,
        document: &serde_json::Value,
        skip_events: bool,
    ) -> Option<EventRecord> {
        if collection == EVENTS_COLLECTION {
            return None;
        }
        if skip_events {
            debug!(collection, %operation, "event recording suppressed by context");
            return None;
        }

        let name = match EventName::for_change(collection, operation) {
            Ok(name) => name,
            Err(e) => {
                error!(collection, %operation, error = %e, "cannot name change event");
                return None;
            }
        };
        let payload = match serde_json::to_value(ChangePayload::new(
            collection,
            operation,
            document.clone(),
        )) {
            Ok(payload) => payload,
            Err(e) => {
                error!(collection, %operation, error = %e, "cannot serialize change payload");
                return None;
            }
        };

        match self
            .store
            .create(NewEventRecord { name, payload }, WriteContext::suppressed())
            .await
        {
            Ok(record) => {
                debug!(event_id = %record.id, name = %record.name, "event recorded");
                Some(record)
            }
            Err(e) => {
                error!(collection, %operation, error = %e, "failed to create event");
                None
            }
        }
    }
}

/// The after-change and after-delete hooks installed on one collection.
pub struct ChangeHooks {
    collection: String,
    writer: Arc<EventWriter>,
    disabled: bool,
}

impl ChangeHooks {
    /// Creates the hooks for `collection`. Disabled hooks pass documents
    /// through without recording anything.
    #[must_use]
    pub fn new(collection: impl Into<String>, writer: Arc<EventWriter>, disabled: bool) -> Self {
        Self {
            collection: collection.into(),
            writer,
            disabled,
        }
    }
}

#[async_trait]
impl AfterChangeHook for ChangeHooks {
    async fn after_change(
        &self,
        document: serde_json::Value,
        kind: ChangeKind,
        context: &mut HookContext,
    ) -> serde_json::Value {
        if !self.disabled {
            let operation = match kind {
                ChangeKind::Create => Operation::Create,
                ChangeKind::Update => Operation::Update,
            };
            self.writer
                .record(&self.collection, operation, &document, context.skip_events)
                .await;
        }
        document
    }
}

#[async_trait]
impl AfterDeleteHook for ChangeHooks {
    async fn after_delete(
        &self,
        document: serde_json::Value,
        context: &mut HookContext,
    ) -> serde_json::Value {
        if !self.disabled {
            self.writer
                .record(&self.collection, Operation::Delete, &document, context.skip_events)
                .await;
        }
        document
    }
}

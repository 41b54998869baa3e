//! Publishing of custom, application-defined events.

use std::sync::Arc;

use changefeed_core::error::DomainError;
use changefeed_core::record::{EventName, EventRecord, NewEventRecord};
use changefeed_core::store::{EventStore, WriteContext};
use tracing::debug;

/// Writes arbitrary named events into the event store, where change
/// streams pick them up like any collection change.
#[derive(Clone)]
pub struct EventPublisher {
    store: Arc<dyn EventStore>,
}

impl EventPublisher {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Publishes `payload` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `name` is not of the form
    /// `<scope>.<action>` or `payload` is not a JSON object, or the store's
    /// error if the write fails.
    pub async fn publish(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<EventRecord, DomainError> {
        let name = EventName::parse(name)?;
        if !payload.is_object() {
            return Err(DomainError::Validation(format!(
                "event payload must be a JSON object: {name}"
            )));
        }

        let record = self
            .store
            .create(NewEventRecord { name, payload }, WriteContext::suppressed())
            .await?;
        debug!(event_id = %record.id, name = %record.name, "custom event published");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use changefeed_core::error::DomainError;
    use changefeed_test_support::{FailingEventStore, FixedClock, InMemoryEventStore};
    use serde_json::json;

    use super::EventPublisher;

    #[tokio::test]
    async fn test_publish_stores_named_event() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(Utc::now()))));
        let publisher = EventPublisher::new(store.clone());

        // Act
        let record = publisher
            .publish("cache.invalidate", json!({ "key": "homepage" }))
            .await
            .unwrap();

        // Assert
        assert_eq!(record.name.as_str(), "cache.invalidate");
        assert_eq!(record.payload["key"], "homepage");
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_invalid_name() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(Utc::now()))));
        let publisher = EventPublisher::new(store.clone());

        // Act
        let result = publisher.publish("invalidate", json!({})).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_publish_rejects_non_object_payload() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(Utc::now()))));
        let publisher = EventPublisher::new(store);

        // Act
        let result = publisher.publish("cache.invalidate", json!([1, 2])).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_publish_surfaces_store_failure() {
        // Arrange
        let publisher = EventPublisher::new(Arc::new(FailingEventStore));

        // Act
        let result = publisher.publish("cache.invalidate", json!({})).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}

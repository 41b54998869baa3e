//! Event store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::query::{EventQuery, Filter};
use crate::record::{EventRecord, NewEventRecord};

/// Context threaded through a store write into any nested hook chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteContext {
    /// When set, change hooks triggered by this write must not record events.
    pub skip_events: bool,
}

impl WriteContext {
    /// Context used for writes that must never produce further events.
    #[must_use]
    pub fn suppressed() -> Self {
        Self { skip_events: true }
    }
}

/// Persistence surface for event records.
///
/// Records are write-once; the trait has no update operation.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new record. The store assigns `id`, `created_at` and
    /// `updated_at`.
    async fn create(
        &self,
        record: NewEventRecord,
        context: WriteContext,
    ) -> Result<EventRecord, DomainError>;

    /// Find records matching the query, ordered by creation time.
    async fn find(&self, query: &EventQuery) -> Result<Vec<EventRecord>, DomainError>;

    /// Delete every record matching `filter`, returning how many were removed.
    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError>;

    /// The store's current time, read from the same clock that stamps
    /// `created_at`.
    async fn now(&self) -> Result<DateTime<Utc>, DomainError>;
}

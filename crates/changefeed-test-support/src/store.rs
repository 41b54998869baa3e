//! Test stores: mock `EventStore` implementations for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use changefeed_core::clock::Clock;
use changefeed_core::error::DomainError;
use changefeed_core::query::{EventQuery, Filter, SortOrder};
use changefeed_core::record::{EventId, EventName, EventRecord, NewEventRecord};
use changefeed_core::store::{EventStore, WriteContext};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<EventRecord>,
    contexts: Vec<WriteContext>,
    next_id: i64,
}

/// An in-memory event store that assigns ids from a counter and timestamps
/// from the injected clock, and records the `WriteContext` of every create.
///
/// `created_at` never goes backwards, even if the clock does.
pub struct InMemoryEventStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    failing_finds: AtomicUsize,
}

impl InMemoryEventStore {
    /// Create an empty store stamping records with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
            failing_finds: AtomicUsize::new(0),
        }
    }

    /// Insert a record with an explicit creation time, bypassing the clock.
    /// Useful for seeding history and backdated records.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid event name or the mutex is poisoned.
    pub fn seed(&self, name: &str, payload: serde_json::Value, created_at: DateTime<Utc>) -> EventRecord {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let record = EventRecord {
            id: EventId(inner.next_id),
            name: EventName::parse(name).expect("seeded event name must be valid"),
            payload,
            created_at,
            updated_at: created_at,
        };
        inner.records.push(record.clone());
        record
    }

    /// Make the next `count` calls to `find` fail with an infrastructure error.
    pub fn fail_next_finds(&self, count: usize) {
        self.failing_finds.store(count, Ordering::SeqCst);
    }

    /// Returns a snapshot of every stored record in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<EventRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    /// Returns the `WriteContext` passed to each successful `create` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn create_contexts(&self) -> Vec<WriteContext> {
        self.inner.lock().unwrap().contexts.clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(
        &self,
        record: NewEventRecord,
        context: WriteContext,
    ) -> Result<EventRecord, DomainError> {
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.now();
        let created_at = inner
            .records
            .last()
            .map_or(now, |last| last.created_at.max(now));
        inner.next_id += 1;
        let stored = EventRecord {
            id: EventId(inner.next_id),
            name: record.name,
            payload: record.payload,
            created_at,
            updated_at: created_at,
        };
        inner.records.push(stored.clone());
        inner.contexts.push(context);
        Ok(stored)
    }

    async fn find(&self, query: &EventQuery) -> Result<Vec<EventRecord>, DomainError> {
        let failing = self
            .failing_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }

        let inner = self.inner.lock().unwrap();
        let mut found: Vec<EventRecord> = inner
            .records
            .iter()
            .filter(|r| query.filter.matches(r))
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.created_at, r.id));
        if query.sort == SortOrder::Descending {
            found.reverse();
        }
        found.truncate(query.limit);
        Ok(found)
    }

    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.records.len();
        inner.records.retain(|r| !filter.matches(r));
        Ok((before - inner.records.len()) as u64)
    }

    async fn now(&self) -> Result<DateTime<Utc>, DomainError> {
        Ok(self.clock.now())
    }
}

/// An event store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn create(
        &self,
        _record: NewEventRecord,
        _context: WriteContext,
    ) -> Result<EventRecord, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find(&self, _query: &EventQuery) -> Result<Vec<EventRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn delete(&self, _filter: &Filter) -> Result<u64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn now(&self) -> Result<DateTime<Utc>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

//! Per-connection tailing of the event store.
//!
//! A `ChangeStream` holds the cursor and name filter of one long-lived
//! client connection. It polls the store on a fixed interval and yields
//! every new record exactly once per connection; a failed poll is retried
//! from the same cursor on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use changefeed_core::error::DomainError;
use changefeed_core::query::{EventQuery, Filter};
use changefeed_core::record::{ChangeEvent, EventId, EventName};
use changefeed_core::store::EventStore;
use futures::Stream;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Maximum number of records delivered per poll.
pub const MAX_BATCH: usize = 100;

/// Where a connection resumes tailing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCursor {
    /// Deliver records with an id greater than this one.
    After(EventId),
    /// Deliver records created at or after the connection start.
    Since(DateTime<Utc>),
}

impl StreamCursor {
    fn filter(self) -> Filter {
        match self {
            Self::After(id) => Filter::IdGreaterThan(id),
            Self::Since(t) => Filter::CreatedAtOrAfter(t),
        }
    }
}

/// A frame emitted on a change stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Sent once when the connection opens.
    Connected,
    /// A new event record.
    Change(ChangeEvent),
}

/// Parses the comma-separated `events` filter.
///
/// Returns `None` (no filter) when the parameter is absent or has no
/// non-empty entries. Invalid names are dropped with a warning; a filter
/// whose every entry was invalid matches nothing.
#[must_use]
pub fn parse_event_filter(param: Option<&str>) -> Option<Vec<EventName>> {
    let entries: Vec<&str> = param?
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.is_empty() {
        return None;
    }

    let mut names: Vec<EventName> = entries
        .into_iter()
        .filter_map(|entry| match EventName::parse(entry) {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(entry, error = %e, "ignoring invalid event filter entry");
                None
            }
        })
        .collect();
    names.sort();
    names.dedup();
    Some(names)
}

/// Parses a resume cursor. Unparseable cursors are ignored with a warning.
#[must_use]
pub fn parse_cursor(param: Option<&str>) -> Option<EventId> {
    let raw = param.map(str::trim).filter(|raw| !raw.is_empty())?;
    match raw.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(cursor = raw, error = %e, "ignoring unparseable resume cursor");
            None
        }
    }
}

/// Logs the end of a connection when the frame stream is dropped.
struct ClosedLog;

impl Drop for ClosedLog {
    fn drop(&mut self) {
        debug!("change stream closed");
    }
}

/// The tailing state of one stream connection.
pub struct ChangeStream {
    store: Arc<dyn EventStore>,
    cursor: StreamCursor,
    names: Option<Vec<EventName>>,
}

impl ChangeStream {
    /// Opens a stream. Without a resume cursor the stream delivers records
    /// created at or after `start` and never replays history.
    #[must_use]
    pub fn open(
        store: Arc<dyn EventStore>,
        start: DateTime<Utc>,
        resume_after: Option<EventId>,
        names: Option<Vec<EventName>>,
    ) -> Self {
        let cursor = resume_after.map_or(StreamCursor::Since(start), StreamCursor::After);
        Self {
            store,
            cursor,
            names,
        }
    }

    /// Opens a stream whose fresh-connection start is read from the store,
    /// so it is compared against `created_at` on the same clock.
    ///
    /// # Errors
    ///
    /// Returns the store's error if a fresh connection cannot read the
    /// store's time.
    pub async fn connect(
        store: Arc<dyn EventStore>,
        resume_after: Option<EventId>,
        names: Option<Vec<EventName>>,
    ) -> Result<Self, DomainError> {
        let cursor = match resume_after {
            Some(id) => StreamCursor::After(id),
            None => StreamCursor::Since(store.now().await?),
        };
        Ok(Self {
            store,
            cursor,
            names,
        })
    }

    /// Returns the current cursor.
    #[must_use]
    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    /// Returns the name filter, if any.
    #[must_use]
    pub fn names(&self) -> Option<&[EventName]> {
        self.names.as_deref()
    }

    /// The store query for the next poll.
    #[must_use]
    pub fn query(&self) -> EventQuery {
        let mut conditions = vec![self.cursor.filter()];
        if let Some(names) = &self.names {
            conditions.push(Filter::NameIn(names.clone()));
        }
        EventQuery::new(Filter::And(conditions), MAX_BATCH)
    }

    /// Fetches the next batch and advances the cursor past it.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the cursor is left unchanged.
    pub async fn poll(&mut self) -> Result<Vec<ChangeEvent>, DomainError> {
        let records = self.store.find(&self.query()).await?;
        let events: Vec<ChangeEvent> = records.iter().map(ChangeEvent::from).collect();
        if let Some(last) = events.last() {
            self.cursor = StreamCursor::After(last.id);
        }
        Ok(events)
    }

    /// Turns the connection into an endless stream of frames: `Connected`
    /// first, then the records found by polling every `poll_interval`
    /// (the first poll runs immediately). Dropping the stream stops polling.
    pub fn into_frames(mut self, poll_interval: Duration) -> impl Stream<Item = StreamFrame> + Send {
        async_stream::stream! {
            let _closed = ClosedLog;
            yield StreamFrame::Connected;

            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.poll().await {
                    Ok(events) => {
                        if !events.is_empty() {
                            debug!(count = events.len(), cursor = ?self.cursor, "delivering events");
                        }
                        for event in events {
                            yield StreamFrame::Change(event);
                        }
                    }
                    Err(e) => error!(error = %e, cursor = ?self.cursor, "change stream poll failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use changefeed_core::error::DomainError;
    use changefeed_core::record::{EventId, EventName};
    use changefeed_test_support::{FailingEventStore, FixedClock, InMemoryEventStore, ManualClock};
    use futures::StreamExt;
    use serde_json::json;

    use super::{ChangeStream, StreamCursor, StreamFrame, parse_cursor, parse_event_filter};

    fn names(list: &[&str]) -> Vec<EventName> {
        list.iter().map(|n| EventName::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_parse_event_filter_splits_trims_and_sorts() {
        let parsed = parse_event_filter(Some("posts.delete, posts.create,,posts.create"));
        assert_eq!(parsed, Some(names(&["posts.create", "posts.delete"])));
    }

    #[test]
    fn test_parse_event_filter_without_entries_is_no_filter() {
        assert_eq!(parse_event_filter(None), None);
        assert_eq!(parse_event_filter(Some("")), None);
        assert_eq!(parse_event_filter(Some(" , ")), None);
    }

    #[test]
    fn test_parse_event_filter_with_only_invalid_entries_matches_nothing() {
        assert_eq!(parse_event_filter(Some("posts")), Some(vec![]));
    }

    #[test]
    fn test_parse_cursor_ignores_garbage() {
        assert_eq!(parse_cursor(Some("42")), Some(EventId(42)));
        assert_eq!(parse_cursor(Some("abc")), None);
        assert_eq!(parse_cursor(Some("  ")), None);
        assert_eq!(parse_cursor(None), None);
    }

    #[tokio::test]
    async fn test_fresh_stream_never_receives_history() {
        // Arrange
        let start = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryEventStore::new(clock.clone()));
        store.seed("posts.create", json!({}), start - chrono::Duration::seconds(1));
        let mut stream = ChangeStream::open(store.clone(), start, None, None);

        // Act
        let first = stream.poll().await.unwrap();
        let live = store.seed("posts.update", json!({}), start);
        let second = stream.poll().await.unwrap();

        // Assert
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, live.id);
        assert_eq!(stream.cursor(), StreamCursor::After(live.id));
    }

    #[tokio::test]
    async fn test_connect_starts_fresh_stream_at_store_time() {
        // Arrange
        let store_time = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(store_time))));
        store.seed("posts.create", json!({}), store_time - chrono::Duration::milliseconds(1));
        let live = store.seed("posts.update", json!({}), store_time);

        // Act
        let mut stream = ChangeStream::connect(store.clone(), None, None).await.unwrap();
        let events = stream.poll().await.unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, live.id);
    }

    #[tokio::test]
    async fn test_connect_fails_when_store_time_is_unavailable() {
        // Act
        let fresh = ChangeStream::connect(Arc::new(FailingEventStore), None, None).await;
        let resumed = ChangeStream::connect(Arc::new(FailingEventStore), Some(EventId(3)), None).await;

        // Assert
        assert!(matches!(fresh, Err(DomainError::Infrastructure(_))));
        assert_eq!(resumed.unwrap().cursor(), StreamCursor::After(EventId(3)));
    }

    #[tokio::test]
    async fn test_resumed_stream_receives_only_newer_ids() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock(now);
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock)));
        let old = store.seed("posts.create", json!({}), now - chrono::Duration::minutes(5));
        let missed = store.seed("posts.update", json!({}), now - chrono::Duration::minutes(4));
        let mut stream = ChangeStream::open(store.clone(), now, Some(old.id), None);

        // Act
        let events = stream.poll().await.unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, missed.id);
    }

    #[tokio::test]
    async fn test_name_filter_excludes_other_events() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock(now);
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock)));
        let filter = parse_event_filter(Some("posts.create,posts.delete"));
        let mut stream = ChangeStream::open(store.clone(), now, None, filter);
        store.seed("posts.create", json!({}), now);
        store.seed("posts.update", json!({}), now);
        store.seed("posts.delete", json!({}), now);

        // Act
        let events = stream.poll().await.unwrap();

        // Assert
        let delivered: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(delivered, vec!["posts.create", "posts.delete"]);
    }

    #[tokio::test]
    async fn test_poll_caps_batch_and_continues_from_cursor() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock(now);
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock)));
        let mut stream = ChangeStream::open(store.clone(), now, None, None);
        for _ in 0..150 {
            store.seed("posts.create", json!({}), now);
        }

        // Act
        let first = stream.poll().await.unwrap();
        let second = stream.poll().await.unwrap();
        let third = stream.poll().await.unwrap();

        // Assert
        assert_eq!(first.len(), 100);
        assert_eq!(second.len(), 50);
        assert!(third.is_empty());
        assert!(second[0].id > first[99].id);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_cursor() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock(now);
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock)));
        let mut stream = ChangeStream::open(store.clone(), now, Some(EventId(0)), None);
        store.seed("posts.create", json!({}), now);
        store.fail_next_finds(1);

        // Act
        let failed = stream.poll().await;
        let retried = stream.poll().await.unwrap();

        // Assert
        assert!(failed.is_err());
        assert_eq!(retried.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_start_with_connected_and_survive_poll_errors() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock(now);
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock)));
        store.fail_next_finds(2);
        let stream = ChangeStream::open(store.clone(), now, None, None);
        let frames = stream.into_frames(Duration::from_millis(1000));
        futures::pin_mut!(frames);

        // Act
        let connected = frames.next().await;
        let created = store.seed("posts.create", json!({ "collection": "posts" }), now);
        let delivered = frames.next().await;

        // Assert
        assert_eq!(connected, Some(StreamFrame::Connected));
        match delivered {
            Some(StreamFrame::Change(event)) => {
                assert_eq!(event.id, created.id);
                assert_eq!(event.name.as_str(), "posts.create");
                assert_eq!(event.created_at, now);
            }
            other => panic!("expected a change frame, got {other:?}"),
        }
    }
}

//! Filter predicates and queries over event records.

use chrono::{DateTime, Utc};

use crate::record::{EventId, EventName, EventRecord};

/// A `where` predicate over event records.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every record.
    All,
    /// `id = x`
    IdEquals(EventId),
    /// `id > x`
    IdGreaterThan(EventId),
    /// `created_at >= t`
    CreatedAtOrAfter(DateTime<Utc>),
    /// `created_at < t`
    CreatedBefore(DateTime<Utc>),
    /// `name IN (...)`
    NameIn(Vec<EventName>),
    /// Conjunction of the inner predicates. An empty list matches everything.
    And(Vec<Filter>),
}

impl Filter {
    /// Evaluates the predicate against a record.
    ///
    /// Stores without a native query language use this directly; SQL stores
    /// translate the same tree into a `WHERE` clause.
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        match self {
            Self::All => true,
            Self::IdEquals(id) => record.id == *id,
            Self::IdGreaterThan(id) => record.id > *id,
            Self::CreatedAtOrAfter(t) => record.created_at >= *t,
            Self::CreatedBefore(t) => record.created_at < *t,
            Self::NameIn(names) => names.contains(&record.name),
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

/// Ordering by creation time; ties are broken by id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// A `find` request against the event store.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    /// Records must match this predicate.
    pub filter: Filter,
    /// Result ordering.
    pub sort: SortOrder,
    /// Maximum number of records returned.
    pub limit: usize,
}

impl EventQuery {
    /// Creates an ascending query capped at `limit` records.
    #[must_use]
    pub fn new(filter: Filter, limit: usize) -> Self {
        Self {
            filter,
            sort: SortOrder::Ascending,
            limit,
        }
    }

    /// Sets the result ordering.
    #[must_use]
    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(id: i64, name: &str, created_at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            id: EventId(id),
            name: EventName::parse(name).unwrap(),
            payload: serde_json::json!({}),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_created_before_is_strict() {
        let t = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let at_cutoff = record(1, "posts.create", t);
        let before_cutoff = record(2, "posts.create", t - Duration::milliseconds(1));

        assert!(!Filter::CreatedBefore(t).matches(&at_cutoff));
        assert!(Filter::CreatedBefore(t).matches(&before_cutoff));
    }

    #[test]
    fn test_and_combines_cursor_and_name_filter() {
        let t = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let filter = Filter::And(vec![
            Filter::IdGreaterThan(EventId(5)),
            Filter::NameIn(vec![
                EventName::parse("posts.create").unwrap(),
                EventName::parse("posts.delete").unwrap(),
            ]),
        ]);

        assert!(filter.matches(&record(6, "posts.create", t)));
        assert!(!filter.matches(&record(5, "posts.create", t)));
        assert!(!filter.matches(&record(7, "posts.update", t)));
    }

    #[test]
    fn test_empty_and_matches_everything() {
        let t = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        assert!(Filter::And(vec![]).matches(&record(1, "posts.create", t)));
    }
}

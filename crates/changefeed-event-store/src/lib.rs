//! PostgreSQL-backed storage for changefeed event records.

pub mod pg_event_store;

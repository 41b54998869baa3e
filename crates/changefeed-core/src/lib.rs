//! Changefeed Core: shared event-record abstractions.
//!
//! This crate defines the record model, the filter language and the store
//! and hook traits that every other changefeed crate depends on. It contains
//! no infrastructure code.

pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
pub mod query;
pub mod record;
pub mod store;

//! Changefeed: real-time change notification for host collections.
//!
//! Records CRUD operations as durable event records, expires them after a
//! retention window and tails them for long-lived stream connections.

pub mod application;
pub mod domain;
pub mod plugin;

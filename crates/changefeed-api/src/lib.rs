//! Changefeed API: HTTP surface of the changefeed plugin.
//!
//! Serves the change stream (`GET /api/_events/stream`), the privileged
//! event record endpoints under `/api/payload-events` and a health check.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

//! Changefeed client: consumes the change stream of a changefeed server.
//!
//! `ChangeStreamClient` keeps one connection open, reconnects with
//! exponential backoff and resumes after the last received event.
//! Subscribers register callbacks for sets of event names.

pub mod backoff;
pub mod client;
pub mod decoder;
pub mod error;
pub mod state;
pub mod subscriptions;
pub mod transport;

pub use client::ChangeStreamClient;
pub use error::TransportError;
pub use state::ConnectionStatus;
pub use subscriptions::Subscription;
pub use transport::{HttpTransport, StreamTransport};

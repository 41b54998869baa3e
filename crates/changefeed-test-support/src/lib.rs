//! Shared test mocks and utilities for the changefeed plugin.

mod clock;
mod documents;
mod store;

pub use clock::{FixedClock, ManualClock};
pub use documents::InMemoryDocumentStore;
pub use store::{FailingEventStore, InMemoryEventStore};

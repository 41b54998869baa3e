//! Transport-independent connection state of a stream consumer.

use std::fmt;
use std::time::Duration;

use changefeed_core::record::{ChangeEvent, EventId};
use tracing::{debug, warn};

use crate::backoff::ReconnectBackoff;
use crate::decoder::SseMessage;
use crate::error::TransportError;
use crate::subscriptions::SubscriptionRegistry;

/// Name of the stream messages that carry event records.
pub const CHANGE_EVENT: &str = "change";

/// Observable connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt failed; holds the error message.
    Error(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// The consumer's state machine: status, resume cursor and reconnect delay.
///
/// Inputs are the connection lifecycle (`begin_connect`, `on_open`,
/// `on_error`, `teardown`) and decoded messages (`on_message`).
#[derive(Debug)]
pub struct ConsumerState {
    status: ConnectionStatus,
    cursor: Option<EventId>,
    backoff: ReconnectBackoff,
    subscriptions: SubscriptionRegistry,
}

impl ConsumerState {
    #[must_use]
    pub fn new(subscriptions: SubscriptionRegistry) -> Self {
        Self::with_backoff(subscriptions, ReconnectBackoff::default())
    }

    #[must_use]
    pub fn with_backoff(subscriptions: SubscriptionRegistry, backoff: ReconnectBackoff) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            cursor: None,
            backoff,
            subscriptions,
        }
    }

    #[must_use]
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Id of the last event received, sent as `lastEventId` on reconnect.
    #[must_use]
    pub fn cursor(&self) -> Option<EventId> {
        self.cursor
    }

    /// Marks a connection attempt and returns the cursor to resume from.
    pub fn begin_connect(&mut self) -> Option<EventId> {
        self.status = ConnectionStatus::Connecting;
        self.cursor
    }

    /// The connection opened: reset the reconnect delay.
    pub fn on_open(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.backoff.reset();
    }

    /// Handles one decoded message. `change` messages are parsed, advance the
    /// cursor and are dispatched to subscribers; the event id is returned.
    /// Other messages and unparseable payloads are dropped.
    pub fn on_message(&mut self, message: &SseMessage) -> Option<EventId> {
        if message.event != CHANGE_EVENT {
            debug!(event = %message.event, "ignoring stream message");
            return None;
        }

        let event: ChangeEvent = match serde_json::from_str(&message.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "failed to parse change event");
                return None;
            }
        };
        self.cursor = Some(event.id);
        let delivered = self.subscriptions.dispatch(&event);
        debug!(event_id = %event.id, name = %event.name, delivered, "change event received");
        Some(event.id)
    }

    /// The connection failed or was lost. Returns how long to wait before the
    /// next attempt; each consecutive failure doubles the delay up to the cap.
    pub fn on_error(&mut self, error: &TransportError) -> Duration {
        self.status = ConnectionStatus::Error(error.to_string());
        self.backoff.next_delay()
    }

    /// The consumer was closed.
    pub fn teardown(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }
}

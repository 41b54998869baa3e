//! Opening change-stream connections.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use changefeed_core::record::EventId;
use futures::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use crate::error::TransportError;

/// Path of the change-stream endpoint, relative to the server's base URL.
pub const STREAM_ENDPOINT: &str = "api/_events/stream";

/// Raw body chunks of an open stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens one stream connection, resuming after `last_event_id` when given.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, last_event_id: Option<EventId>) -> Result<ByteStream, TransportError>;
}

/// Connects to the change stream over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
    events: Option<String>,
}

impl HttpTransport {
    /// Targets the stream endpoint of the server at `base_url`. A path
    /// prefix in `base_url` is kept, with or without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidUrl` if `base_url` does not parse.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(base_url)
            .and_then(|mut base| {
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                base.join(STREAM_ENDPOINT)
            })
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            token: None,
            events: None,
        })
    }

    /// Sends `token` as a bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Asks the server to send only the named events.
    #[must_use]
    pub fn with_events(mut self, names: &[&str]) -> Self {
        self.events = (!names.is_empty()).then(|| names.join(","));
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, last_event_id: Option<EventId>) -> Result<ByteStream, TransportError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(id) = last_event_id {
            query.push(("lastEventId", id.to_string()));
        }
        if let Some(events) = &self.events {
            query.push(("events", events.clone()));
        }

        let mut request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .query(&query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(url = %self.url, last_event_id = ?last_event_id, "opening change stream");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from)),
        ))
    }
}

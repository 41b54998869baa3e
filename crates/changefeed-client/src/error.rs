//! Client transport errors.

use thiserror::Error;

/// Why a stream connection could not be opened or was lost.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The stream URL could not be built.
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    /// The HTTP request or body read failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected response status {0}")]
    Status(u16),

    /// The server ended the stream.
    #[error("stream closed by server")]
    Closed,
}

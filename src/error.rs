//! # Errors
//!
//! Failures never escape the controller's public operations; they become the `fail`
//! state. These types classify *why* a request failed, for logs and for
//! [`Controller::last_error`](crate::controller::Controller::last_error).

use crate::transport::Method;

/// Errors raised while moving a request through the gateway.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request has no URL")]
    MissingUrl,
    #[error("Response body is not JSON: {0}")]
    Decode(String),
    #[error("Transport closed")]
    Closed,
    #[error("Transport dropped response channel")]
    Dropped,
    #[error("Unexpected request: {0}")]
    Unexpected(String),
}

/// Why the last network operation of a controller ended in `fail`.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("{method} {url} answered {status}")]
    Status {
        method: Method,
        url: String,
        status: u16,
    },
    #[error("{method} {url} returned no resource")]
    EmptyBody { method: Method, url: String },
}

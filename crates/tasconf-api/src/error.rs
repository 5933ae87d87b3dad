use std::time::Duration;

use thiserror::Error;

use crate::transport::AckKind;

/// Top-level error type for the `tasconf-api` crate.
///
/// Covers every failure mode of the broker connection: URL validation,
/// connect handshake, request submission, and acknowledgement waits.
/// `tasconf-core` wraps these with device context.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// Broker URL could not be turned into connection options.
    #[error("Invalid broker URL '{url}': {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    // ── Connection ──────────────────────────────────────────────────
    /// The broker refused the connection or the socket could not be opened.
    #[error("Connection to {broker} failed: {reason}")]
    Connection { broker: String, reason: String },

    /// The event loop has shut down; no further requests can be served.
    #[error("MQTT event loop is no longer running")]
    Disconnected,

    // ── Requests ────────────────────────────────────────────────────
    /// The request could not be queued with the client.
    #[error("Failed to submit {operation} request: {source}")]
    Client {
        operation: AckKind,
        #[source]
        source: rumqttc::ClientError,
    },

    /// No acknowledgement arrived within the command timeout.
    #[error("{operation} on '{topic}' timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: AckKind,
        topic: String,
        timeout: Duration,
    },

    /// The broker answered with a failure code.
    #[error("Broker rejected {operation} on '{topic}'")]
    Rejected { operation: AckKind, topic: String },
}

impl Error {
    /// Returns `true` if the broker connection itself is gone or unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Disconnected)
    }
}

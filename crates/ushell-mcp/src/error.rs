//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
///
/// Transport and framing faults are reported at the point of detection and
/// never retried inside the crate. A tool that fails on the server side is
/// not an error: it comes back as [`ToolOutcome::Failed`](crate::ToolOutcome).
#[derive(Debug, Error)]
pub enum McpError {
    /// The socket could not be established (refused, unreachable, DNS, timeout).
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        /// The `host:port` that was attempted.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A read or write failed mid-session.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No terminal message arrived before the deadline.
    #[error("timed out after {0:?} waiting for response")]
    Timeout(Duration),

    /// The peer closed the connection, or it was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame could not be decoded into a message.
    #[error("malformed frame ({cause}): {raw}")]
    Decode {
        /// The frame text (lossily decoded if it was not UTF-8).
        raw: String,
        /// Why decoding failed.
        cause: String,
    },

    /// A terminal message carried an id other than the outstanding one.
    #[error("response id {actual:?} does not match outstanding request {expected:?}")]
    Correlation {
        /// Id of the outstanding request.
        expected: String,
        /// Id found on the terminal message.
        actual: String,
    },

    /// A response result did not have the shape its method requires.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected a non-tool request.
    #[error("server error: {0}")]
    Server(String),

    /// The `initialize` handshake did not complete.
    #[error("initialize failed: {0}")]
    Startup(#[source] Box<McpError>),

    /// A request is already in flight on this connection.
    #[error("request {0} is still outstanding on this connection")]
    RequestOutstanding(String),

    /// A previous exchange timed out or lost correlation; stale messages may
    /// still arrive, so the connection must be drained or reopened.
    #[error("connection is desynchronized - drain or reconnect before issuing requests")]
    Desynchronized,

    /// The session already reached a terminal state.
    #[error("session already finished ({0})")]
    SessionFinished(SessionState),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(key: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl McpError {
    /// Create a connection error.
    pub fn connection(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connection {
            addr: addr.into(),
            source,
        }
    }

    /// Create a decode error.
    pub fn decode(raw: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Decode {
            raw: raw.into(),
            cause: cause.into(),
        }
    }

    /// Create a correlation error.
    pub fn correlation(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Correlation {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error.
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Whether waiting again could succeed.
    ///
    /// Only a timeout qualifies; a closed connection never recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the connection that produced this error should be discarded.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::Correlation { .. }
        )
    }
}

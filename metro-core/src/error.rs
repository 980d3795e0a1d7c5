//! Domain-specific error types for the metro protocol.
//!
//! All fallible operations return `Result<T, MetroError>`.
//! Nothing in the engine panics on bad input from the server.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the metro client engine.
#[derive(Debug, Error)]
pub enum MetroError {
    // ── Connection Errors ────────────────────────────────────────
    /// The transport could not be established (refused, DNS, timeout).
    #[error("connection error: {0}")]
    Connection(String),

    /// The TCP/IO layer reported an error on an open connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// An operation needed an open connection.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a connection is open.
    #[error("already connected")]
    AlreadyConnected,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A line did not start with a `TYPE:<tag>` segment, or a segment had no key.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The `TYPE` tag is not one the protocol defines.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A field the frame type requires is absent.
    #[error("missing field {field} in {kind} frame")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A field is present but its value is unusable.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// A line exceeded the codec's maximum length and was skipped.
    #[error("line too long")]
    LineTooLong,

    // ── Correlation Errors ───────────────────────────────────────
    /// No reply of the expected type arrived within the attempt budget.
    #[error("no response after {attempts} frame(s)")]
    NoResponse { attempts: usize },

    /// A single read exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Session Errors ───────────────────────────────────────────
    /// A command was issued before authentication; nothing was sent.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The server answered with `TYPE:ERR`.
    #[error("rejected by server: {}", reason.as_deref().unwrap_or("no reason given"))]
    Rejected { reason: Option<String> },

    /// A state transition was not valid from the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The telemetry listener is still stopping from a previous run.
    #[error("telemetry listener is still stopping")]
    ListenerBusy,
}

impl MetroError {
    /// Returns `true` for errors caused by bad frames from the server.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_)
                | Self::UnknownMessageType(_)
                | Self::MissingField { .. }
                | Self::InvalidField { .. }
                | Self::LineTooLong
        )
    }

    /// Returns `true` when the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Io(_) | Self::ConnectionClosed | Self::ChannelClosed
        )
    }

    /// Shorthand for an [`MetroError::InvalidField`].
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MetroError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MetroError::ChannelClosed
    }
}

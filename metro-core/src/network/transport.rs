//! The seam between request/response logic and the socket.

use std::time::Duration;

use async_trait::async_trait;

use crate::codec::Decoded;
use crate::error::MetroError;
use crate::frame::Frame;

/// Something that can send frames and hand back replies one at a time.
///
/// [`crate::Connection`] is the production implementation; tests use
/// scripted ones.
#[async_trait]
pub trait FrameTransport: Send {
    /// Write one frame to the peer.
    async fn send(&mut self, frame: Frame) -> Result<(), MetroError>;

    /// Wait up to `timeout` for the next reply line.
    ///
    /// The outer error means no line could be read:
    /// [`MetroError::Timeout`] when the deadline passed and
    /// [`MetroError::ConnectionClosed`] when the peer is gone. The inner
    /// result is the line's decode outcome.
    async fn recv(&mut self, timeout: Duration) -> Result<Decoded, MetroError>;

    /// Throw away replies that are already queued, returning how many.
    fn discard_pending(&mut self) -> usize {
        0
    }
}

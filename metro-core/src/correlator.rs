//! Request/response pairing on a stream that also carries pushes.
//!
//! One request is sent, then replies are read one at a time until one
//! of the expected types shows up. Pushes, unexpected types and
//! malformed lines each use up one attempt from a fixed budget, so an
//! unanswered request always ends in [`MetroError::NoResponse`] instead
//! of waiting forever.

use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::MetroError;
use crate::frame::Frame;
use crate::message::MessageType;
use crate::network::FrameTransport;

/// Default attempt budget per request.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct Correlator {
    max_attempts: usize,
    read_timeout: Duration,
}

impl Correlator {
    pub fn new(max_attempts: usize, read_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            read_timeout,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.max_attempts, config.read_timeout())
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Send `request` and return the first reply whose type is in `expected`.
    pub async fn request<T>(
        &self,
        transport: &mut T,
        request: Frame,
        expected: &[MessageType],
    ) -> Result<Frame, MetroError>
    where
        T: FrameTransport + ?Sized,
    {
        let stale = transport.discard_pending();
        if stale > 0 {
            tracing::debug!(stale, "discarded replies left over from an earlier request");
        }

        let kind = request.kind();
        transport.send(request).await?;

        for attempt in 1..=self.max_attempts {
            let decoded = match transport.recv(self.read_timeout).await {
                Ok(decoded) => decoded,
                Err(MetroError::Timeout(after)) => {
                    tracing::warn!(request = %kind, ?after, "no reply before read timeout");
                    return Err(MetroError::NoResponse {
                        attempts: attempt - 1,
                    });
                }
                Err(e) => return Err(e),
            };

            match decoded {
                Ok(frame) if frame.kind().is_push() => {
                    tracing::trace!(request = %kind, attempt, "skipping push while awaiting reply");
                }
                Ok(frame) if expected.contains(&frame.kind()) => return Ok(frame),
                Ok(frame) => {
                    tracing::warn!(request = %kind, got = %frame.kind(), attempt, "ignoring unexpected reply");
                }
                Err(e) => {
                    tracing::warn!(request = %kind, error = %e, attempt, "ignoring malformed reply");
                }
            }
        }

        tracing::warn!(request = %kind, attempts = self.max_attempts, "reply budget exhausted");
        Err(MetroError::NoResponse {
            attempts: self.max_attempts,
        })
    }

    /// Send `request` and return whatever single reply comes next.
    pub async fn exchange_any<T>(&self, transport: &mut T, request: Frame) -> Result<Frame, MetroError>
    where
        T: FrameTransport + ?Sized,
    {
        transport.discard_pending();
        transport.send(request).await?;
        match transport.recv(self.read_timeout).await {
            Ok(decoded) => decoded,
            Err(MetroError::Timeout(_)) => Err(MetroError::NoResponse { attempts: 0 }),
            Err(e) => Err(e),
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

//! Background delivery of telemetry samples.
//!
//! ```text
//!   Idle ──start──► Listening ──stop──► Stopping ──loop exits──► Idle
//!                       │                                         ▲
//!                       └──────────── feed closed ────────────────┘
//! ```

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TelemetryConfig;
use crate::error::MetroError;
use crate::frame::Frame;
use crate::network::Connection;
use crate::telemetry::TelemetrySample;

/// Receives decoded samples on the listener task.
pub trait TelemetrySubscriber: Send + 'static {
    fn on_sample(&mut self, sample: TelemetrySample);
}

impl<F> TelemetrySubscriber for F
where
    F: FnMut(TelemetrySample) + Send + 'static,
{
    fn on_sample(&mut self, sample: TelemetrySample) {
        self(sample)
    }
}

impl TelemetrySubscriber for mpsc::UnboundedSender<TelemetrySample> {
    fn on_sample(&mut self, sample: TelemetrySample) {
        if self.send(sample).is_err() {
            tracing::trace!("telemetry subscriber dropped its receiver");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    /// Cancelled, but the loop has not exited yet.
    Stopping,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Listening => write!(f, "Listening"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// What [`TelemetryListener::stop`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    NotRunning,
    /// The loop exited within the grace period.
    Stopped,
    /// The loop is still winding down. Call `stop` again or close the
    /// connection.
    GraceExceeded,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one telemetry loop.
pub struct TelemetryListener {
    config: TelemetryConfig,
    running: Option<Running>,
}

impl TelemetryListener {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// A loop that ended on its own reads as `Idle`.
    pub fn state(&self) -> ListenerState {
        match &self.running {
            None => ListenerState::Idle,
            Some(r) if r.handle.is_finished() => ListenerState::Idle,
            Some(r) if r.cancel.is_cancelled() => ListenerState::Stopping,
            Some(_) => ListenerState::Listening,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ListenerState::Listening
    }

    /// Start delivering samples from `connection` to `subscriber`.
    ///
    /// Returns `Ok(false)` if already listening. A loop still stopping
    /// from an earlier `stop` gives [`MetroError::ListenerBusy`].
    pub fn start<S>(&mut self, connection: &Connection, subscriber: S) -> Result<bool, MetroError>
    where
        S: TelemetrySubscriber,
    {
        match self.state() {
            ListenerState::Listening => {
                tracing::debug!("telemetry listener already running");
                return Ok(false);
            }
            ListenerState::Stopping => return Err(MetroError::ListenerBusy),
            ListenerState::Idle => self.running = None,
        }

        let feed = connection.subscribe_telemetry(self.config.buffer_size)?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listen(
            feed,
            subscriber,
            cancel.clone(),
            self.config.poll_interval(),
        ));

        tracing::info!(server = %connection.info(), "telemetry listener started");
        self.running = Some(Running { cancel, handle });
        Ok(true)
    }

    /// Cancel the loop and wait up to the grace period for it to exit.
    pub async fn stop(&mut self) -> StopOutcome {
        if self.state() == ListenerState::Idle {
            self.running = None;
            return StopOutcome::NotRunning;
        }
        let Some(running) = self.running.as_mut() else {
            return StopOutcome::NotRunning;
        };

        running.cancel.cancel();
        let grace = self.config.stop_grace();
        match tokio::time::timeout(grace, &mut running.handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "telemetry task ended abnormally");
                }
                self.running = None;
                tracing::info!("telemetry listener stopped");
                StopOutcome::Stopped
            }
            Err(_) => {
                tracing::warn!(?grace, "telemetry listener did not stop within grace period");
                StopOutcome::GraceExceeded
            }
        }
    }

    /// Cancel and abort without waiting.
    pub fn abort(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

impl Default for TelemetryListener {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl Drop for TelemetryListener {
    fn drop(&mut self) {
        self.abort();
    }
}

impl fmt::Debug for TelemetryListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryListener")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

async fn listen<S>(
    mut feed: mpsc::Receiver<Frame>,
    mut subscriber: S,
    cancel: CancellationToken,
    poll_interval: std::time::Duration,
) where
    S: TelemetrySubscriber,
{
    let mut delivered: u64 = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(poll_interval, feed.recv()) => next,
        };

        let frame = match next {
            Err(_) => continue,
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("telemetry feed closed");
                break;
            }
        };

        match TelemetrySample::try_from(&frame) {
            Ok(sample) => {
                delivered += 1;
                subscriber.on_sample(sample);
            }
            Err(e) => tracing::warn!(error = %e, %frame, "dropping malformed telemetry"),
        }
    }
    // Dropping `feed` frees the connection's telemetry slot.
    tracing::debug!(delivered, "telemetry loop exited");
}

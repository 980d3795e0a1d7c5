//! Telemetry pushes: decoding and background delivery.

pub mod listener;
pub mod sample;

pub use listener::{ListenerState, StopOutcome, TelemetryListener, TelemetrySubscriber};
pub use sample::{BatteryLevel, Direction, TelemetrySample, UNKNOWN, battery_bar};

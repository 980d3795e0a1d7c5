//! # metro-core
//!
//! Client engine for the metro train control protocol.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `MessageType`, `Action`, the `TYPE:<tag>;K:V` line format
//! - **Codec**: `MetroCodec` for line-framed TCP I/O via `tokio_util`
//! - **Network**: `Connection`, with one reader task that splits replies from telemetry pushes
//! - **Correlator**: request/response pairing with a bounded reply budget
//! - **State**: connection and session state machines
//! - **Command**: `CommandDispatcher` for authenticated control actions
//! - **Telemetry**: `TelemetrySample` decoding and the cancellable `TelemetryListener`
//! - **Client**: `MetroClient`, the facade front ends drive
//! - **Error**: `MetroError`, a typed `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod message;
pub mod network;
pub mod state;
pub mod telemetry;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::MetroClient;
pub use codec::MetroCodec;
pub use command::CommandDispatcher;
pub use config::{ClientConfig, NetworkConfig, TelemetryConfig};
pub use correlator::Correlator;
pub use error::MetroError;
pub use frame::Frame;
pub use message::{Action, MessageType};
pub use network::{Connection, ConnectionInfo, FrameTransport};
pub use state::{ConnectionPhase, Session, SessionPhase, Token};
pub use telemetry::{
    BatteryLevel, Direction, ListenerState, StopOutcome, TelemetryListener, TelemetrySample,
    TelemetrySubscriber, battery_bar,
};

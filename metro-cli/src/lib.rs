//! # metro-cli: Metro Control Dashboard
//!
//! Connects to a metro server, authenticates, then hands the terminal
//! to a `ratatui` dashboard showing live telemetry, a command menu and
//! a log pane. A worker task owns the `MetroClient`; the UI only
//! exchanges messages with it.

pub mod app;
pub mod config;
pub mod worker;

pub use app::{App, UiEvent};
pub use config::CliConfig;
pub use worker::{ClientEvent, Login, UiCommand, Worker};

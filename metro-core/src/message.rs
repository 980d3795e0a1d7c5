//! Protocol message types and command actions.
//!
//! Uses proper enums with `FromStr`, so an unknown wire tag is an error
//! rather than a silent fallback.

use crate::error::MetroError;
use std::fmt;
use std::str::FromStr;

// ── MessageType ──────────────────────────────────────────────────

/// The `TYPE` tag carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Login request (client → server).
    Auth,
    /// Login accepted, carries the session token (server → client).
    AuthOk,
    /// Control command (client → server).
    Cmd,
    /// Command accepted (server → client).
    Ack,
    /// Request refused, optionally with a reason (server → client).
    Err,
    /// Asynchronous status push (server → client, any time).
    Telemetry,
    /// End of session (client → server).
    Logout,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Auth,
        MessageType::AuthOk,
        MessageType::Cmd,
        MessageType::Ack,
        MessageType::Err,
        MessageType::Telemetry,
        MessageType::Logout,
    ];

    /// The tag as written on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageType::Auth => "AUTH",
            MessageType::AuthOk => "AUTH_OK",
            MessageType::Cmd => "CMD",
            MessageType::Ack => "ACK",
            MessageType::Err => "ERR",
            MessageType::Telemetry => "TELEMETRY",
            MessageType::Logout => "LOGOUT",
        }
    }

    /// Frames the server pushes without being asked.
    pub fn is_push(&self) -> bool {
        matches!(self, MessageType::Telemetry)
    }
}

impl FromStr for MessageType {
    type Err = MetroError;

    // `Self::Err` would clash with the `Err` variant.
    fn from_str(s: &str) -> Result<Self, MetroError> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MetroError::UnknownMessageType(s.to_string()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Action ───────────────────────────────────────────────────────

/// A control action carried in the `ACTION` field of a `CMD` frame.
///
/// The four known actions get their own variants for front ends; any
/// other string is passed through untouched. Whether an action is valid
/// is for the server to decide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    SpeedUp,
    SlowDown,
    StopNow,
    StartNow,
    Other(String),
}

impl Action {
    pub const KNOWN: [Action; 4] = [
        Action::SpeedUp,
        Action::SlowDown,
        Action::StopNow,
        Action::StartNow,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Action::SpeedUp => "SPEED_UP",
            Action::SlowDown => "SLOW_DOWN",
            Action::StopNow => "STOPNOW",
            Action::StartNow => "STARTNOW",
            Action::Other(s) => s,
        }
    }

    /// Operator-facing description of what the action does.
    pub fn description(&self) -> &str {
        match self {
            Action::SpeedUp => "Increase speed by 10 km/h",
            Action::SlowDown => "Decrease speed by 10 km/h",
            Action::StopNow => "Stop the train immediately",
            Action::StartNow => "Resume movement",
            Action::Other(_) => "Custom action",
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Action::KNOWN
            .into_iter()
            .find(|a| a.as_str() == s)
            .unwrap_or_else(|| Action::Other(s.to_string())))
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(action) => action,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Authentication state for one connection.
//!
//! ```text
//!  Unauthenticated ──► Authenticating ──► Authenticated ──► LoggedOut
//!        ▲                   │                                  │
//!        └───────────────────┘ (refused / no reply)             │
//!        ▲                                                      │
//!        └──────────────── authenticate again ◄─────────────────┘
//! ```
//!
//! The token lives inside the `Authenticated` variant, so "has a token"
//! and "is authenticated" cannot disagree.

use std::fmt;
use std::time::Instant;

use crate::correlator::Correlator;
use crate::error::MetroError;
use crate::frame::{Frame, field};
use crate::message::MessageType;
use crate::network::FrameTransport;

// ── Token ────────────────────────────────────────────────────────

/// Opaque credential issued by `AUTH_OK`. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Surrounding whitespace is trimmed, and the trimmed form is what
    /// later frames echo back. The rest of the value is kept as sent.
    pub fn new(raw: &str) -> Result<Self, MetroError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MetroError::invalid_field(field::TOKEN, "empty token"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── SessionPhase ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Unauthenticated,

    /// `AUTH` sent, reply pending.
    Authenticating { username: String },

    Authenticated {
        username: String,
        token: Token,
        since: Instant,
    },

    /// Logged out; the token has been discarded.
    LoggedOut,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Authenticating { .. } => write!(f, "Authenticating"),
            Self::Authenticated { .. } => write!(f, "Authenticated"),
            Self::LoggedOut => write!(f, "LoggedOut"),
        }
    }
}

impl SessionPhase {
    /// Valid from: `Unauthenticated`, `LoggedOut`.
    pub fn begin_authenticate(&mut self, username: &str) -> Result<(), MetroError> {
        match self {
            Self::Unauthenticated | Self::LoggedOut => {
                *self = Self::Authenticating {
                    username: username.to_string(),
                };
                Ok(())
            }
            Self::Authenticating { .. } => Err(MetroError::InvalidState(
                "cannot authenticate: authentication already in progress",
            )),
            Self::Authenticated { .. } => Err(MetroError::InvalidState(
                "cannot authenticate: already authenticated",
            )),
        }
    }

    /// Valid from: `Authenticating`.
    pub fn complete_authenticate(&mut self, token: Token) -> Result<(), MetroError> {
        match self {
            Self::Authenticating { username } => {
                *self = Self::Authenticated {
                    username: std::mem::take(username),
                    token,
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(MetroError::InvalidState(
                "cannot complete authentication: not in Authenticating state",
            )),
        }
    }

    /// Back to `Unauthenticated` after a refused or unanswered `AUTH`.
    pub fn fail_authenticate(&mut self) {
        if matches!(self, Self::Authenticating { .. }) {
            *self = Self::Unauthenticated;
        }
    }

    /// Drop the token. `Authenticated` becomes `LoggedOut`; an
    /// interrupted `Authenticating` falls back to `Unauthenticated`.
    pub fn logout(&mut self) {
        match self {
            Self::Authenticated { .. } => *self = Self::LoggedOut,
            Self::Authenticating { .. } => *self = Self::Unauthenticated,
            Self::Unauthenticated | Self::LoggedOut => {}
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Session {
    phase: SessionPhase,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticated { .. })
    }

    pub fn token(&self) -> Option<&Token> {
        match &self.phase {
            SessionPhase::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::Authenticating { username }
            | SessionPhase::Authenticated { username, .. } => Some(username),
            _ => None,
        }
    }

    /// Send `AUTH` and wait for `AUTH_OK` or `ERR`.
    ///
    /// On any failure the session is left `Unauthenticated`. A refusal
    /// carries the server's `REASON`, if it gave one.
    pub async fn authenticate<T>(
        &mut self,
        transport: &mut T,
        correlator: &Correlator,
        username: &str,
        password: &str,
    ) -> Result<Token, MetroError>
    where
        T: FrameTransport + ?Sized,
    {
        let request = Frame::auth(username, password)?;
        self.phase.begin_authenticate(username)?;

        let outcome = match correlator
            .request(transport, request, &[MessageType::AuthOk, MessageType::Err])
            .await
        {
            Ok(reply) => token_from_reply(&reply),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(token) => {
                self.phase.complete_authenticate(token.clone())?;
                tracing::info!(username, "authenticated");
                Ok(token)
            }
            Err(e) => {
                self.phase.fail_authenticate();
                tracing::warn!(username, error = %e, "authentication failed");
                Err(e)
            }
        }
    }

    /// Best-effort `LOGOUT`.
    ///
    /// When authenticated, sends the token and waits for any single
    /// reply without checking its type. The token is dropped whatever
    /// happens on the wire.
    pub async fn logout<T>(&mut self, transport: &mut T, correlator: &Correlator)
    where
        T: FrameTransport + ?Sized,
    {
        let Some(token) = self.token().cloned() else {
            tracing::debug!(phase = %self.phase, "logout without a session; nothing sent");
            self.phase.logout();
            return;
        };

        match Frame::logout(token.as_str()) {
            Ok(frame) => match correlator.exchange_any(transport, frame).await {
                Ok(reply) => tracing::info!(reply = %reply.kind(), "logged out"),
                Err(e) => tracing::warn!(error = %e, "no logout acknowledgement"),
            },
            Err(e) => tracing::warn!(error = %e, "could not build logout frame"),
        }
        self.phase.logout();
    }
}

fn token_from_reply(reply: &Frame) -> Result<Token, MetroError> {
    if reply.is(MessageType::AuthOk) {
        Token::new(reply.require(field::TOKEN)?)
    } else {
        Err(reply.rejection())
    }
}

//! One object a front end drives: connect, authenticate, command,
//! listen, log out, close.

use crate::command::CommandDispatcher;
use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::error::MetroError;
use crate::message::Action;
use crate::network::{Connection, ConnectionInfo};
use crate::state::{ConnectionPhase, Session, Token};
use crate::telemetry::{ListenerState, StopOutcome, TelemetryListener, TelemetrySubscriber};

#[derive(Debug)]
pub struct MetroClient {
    config: ClientConfig,
    connection: Option<Connection>,
    phase: ConnectionPhase,
    session: Session,
    dispatcher: CommandDispatcher,
    listener: TelemetryListener,
}

impl MetroClient {
    pub fn new(config: ClientConfig) -> Self {
        let correlator = Correlator::from_config(&config.network);
        Self {
            listener: TelemetryListener::new(config.telemetry.clone()),
            dispatcher: CommandDispatcher::new(correlator),
            session: Session::new(),
            phase: ConnectionPhase::Disconnected,
            connection: None,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `true` while the connection is open and its reader is alive.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_open)
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn server(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref().map(Connection::info)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn listener_state(&self) -> ListenerState {
        self.listener.state()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), MetroError> {
        if self.is_connected() {
            return Err(MetroError::AlreadyConnected);
        }
        if self.connection.is_some() {
            tracing::debug!("discarding dead connection before reconnecting");
            self.close().await;
        }

        self.phase.begin_connect()?;
        let info = ConnectionInfo::new(host, port);
        match Connection::connect(&info, &self.config.network).await {
            Ok(connection) => {
                self.phase.complete_connect()?;
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                self.phase.finish_disconnect()?;
                tracing::warn!(server = %info, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Adopt an already established connection.
    pub fn attach(&mut self, connection: Connection) -> Result<(), MetroError> {
        if self.is_connected() {
            return Err(MetroError::AlreadyConnected);
        }
        self.phase.force_disconnect();
        self.phase.begin_connect()?;
        self.phase.complete_connect()?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Abort the listener, log out if authenticated, then close the
    /// connection. Safe to call at any time, any number of times.
    pub async fn close(&mut self) {
        self.listener.abort();

        let Some(mut connection) = self.connection.take() else {
            self.phase.force_disconnect();
            return;
        };
        if self.phase.begin_disconnect().is_err() {
            self.phase.force_disconnect();
        }

        if self.session.is_authenticated() {
            self.session
                .logout(&mut connection, self.dispatcher.correlator())
                .await;
        }
        connection.close().await;

        if self.phase.finish_disconnect().is_err() {
            self.phase.force_disconnect();
        }
    }

    // ── Session ──────────────────────────────────────────────────

    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<Token, MetroError> {
        let connection = self.connection.as_mut().ok_or(MetroError::NotConnected)?;
        self.session
            .authenticate(connection, self.dispatcher.correlator(), username, password)
            .await
    }

    pub async fn issue_command(&mut self, action: &Action) -> Result<(), MetroError> {
        let connection = self.connection.as_mut().ok_or(MetroError::NotConnected)?;
        self.dispatcher.issue(&self.session, connection, action).await
    }

    /// Best-effort `LOGOUT`; the local token is dropped either way.
    pub async fn logout(&mut self) -> Result<(), MetroError> {
        let connection = self.connection.as_mut().ok_or(MetroError::NotConnected)?;
        self.session
            .logout(connection, self.dispatcher.correlator())
            .await;
        Ok(())
    }

    // ── Telemetry ────────────────────────────────────────────────

    /// Returns `Ok(false)` when a listener is already running.
    pub fn start_listening<S>(&mut self, subscriber: S) -> Result<bool, MetroError>
    where
        S: TelemetrySubscriber,
    {
        let connection = self.connection.as_ref().ok_or(MetroError::NotConnected)?;
        self.listener.start(connection, subscriber)
    }

    pub async fn stop_listening(&mut self) -> StopOutcome {
        self.listener.stop().await
    }
}

impl Default for MetroClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

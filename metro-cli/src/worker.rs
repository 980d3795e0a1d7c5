//! The task that owns [`MetroClient`].
//!
//! The UI never touches the client directly. It sends [`UiCommand`]s
//! and renders the [`ClientEvent`]s that come back, so a command
//! waiting on a slow server never freezes the screen.

use std::time::Duration;

use metro_core::{Action, ListenerState, MetroClient, StopOutcome, TelemetrySample};
use tokio::sync::mpsc;

/// How often the worker checks whether the server is still there.
const LINK_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Issue(Action),
    ToggleTelemetry,
    /// Connect and authenticate again after the link dropped.
    Reconnect,
    Quit,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Log(String),
    Telemetry(TelemetrySample),
    Listening(bool),
    Disconnected,
    /// The link is back and the session is authenticated again.
    Connected,
    Closed,
}

/// Where and as whom to log in again on [`UiCommand::Reconnect`].
#[derive(Clone)]
pub struct Login {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

pub struct Worker {
    client: MetroClient,
    events: mpsc::UnboundedSender<ClientEvent>,
    link_up: bool,
    login: Option<Login>,
}

impl Worker {
    pub fn new(client: MetroClient, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let link_up = client.is_connected();
        Self {
            client,
            events,
            link_up,
            login: None,
        }
    }

    pub fn with_login(mut self, login: Login) -> Self {
        self.login = Some(login);
        self
    }

    /// Serve UI commands until `Quit` or until the UI goes away, then
    /// close the client.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<UiCommand>) {
        let mut link_check = tokio::time::interval(LINK_CHECK_INTERVAL);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(UiCommand::Quit) | None => break,
                    Some(cmd) => self.handle(cmd).await,
                },
                _ = link_check.tick() => self.check_link(),
            }
        }

        self.log("Closing session...");
        self.client.close().await;
        let _ = self.events.send(ClientEvent::Closed);
    }

    async fn handle(&mut self, cmd: UiCommand) {
        match cmd {
            UiCommand::Issue(action) => self.issue(action).await,
            UiCommand::ToggleTelemetry => self.toggle_telemetry().await,
            UiCommand::Reconnect => self.reconnect().await,
            UiCommand::Quit => {}
        }
    }

    async fn issue(&mut self, action: Action) {
        self.log(format!("> {action}"));
        match self.client.issue_command(&action).await {
            Ok(()) => self.log(format!("- {action} acknowledged")),
            Err(e) => {
                self.log(format!("[ERR ] {action}: {e}"));
                if e.is_fatal() {
                    self.check_link();
                }
            }
        }
    }

    async fn toggle_telemetry(&mut self) {
        if self.client.listener_state() == ListenerState::Idle {
            let events = self.events.clone();
            let subscriber = move |sample: TelemetrySample| {
                let _ = events.send(ClientEvent::Telemetry(sample));
            };
            match self.client.start_listening(subscriber) {
                Ok(_) => {
                    self.log("Telemetry listening started");
                    let _ = self.events.send(ClientEvent::Listening(true));
                }
                Err(e) => self.log(format!("[ERR ] telemetry: {e}")),
            }
            return;
        }

        match self.client.stop_listening().await {
            StopOutcome::Stopped | StopOutcome::NotRunning => {
                self.log("Telemetry listening stopped");
                let _ = self.events.send(ClientEvent::Listening(false));
            }
            StopOutcome::GraceExceeded => {
                self.log("[ERR ] telemetry listener is still stopping; try again");
            }
        }
    }

    async fn reconnect(&mut self) {
        if self.client.is_connected() {
            self.log("Already connected");
            return;
        }
        let Some(login) = self.login.clone() else {
            self.log("[ERR ] no server to reconnect to");
            return;
        };

        self.log(format!("> reconnecting to {}:{}", login.host, login.port));
        if let Err(e) = self.client.connect(&login.host, login.port).await {
            self.log(format!("[ERR ] reconnect: {e}"));
            return;
        }
        match self.client.authenticate(&login.user, &login.password).await {
            Ok(_) => {
                self.link_up = true;
                self.log(format!("- reconnected as {}", login.user));
                let _ = self.events.send(ClientEvent::Connected);
            }
            Err(e) => {
                self.log(format!("[ERR ] reconnect: {e}"));
                self.client.close().await;
            }
        }
    }

    fn check_link(&mut self) {
        if self.link_up && !self.client.is_connected() {
            self.link_up = false;
            self.log("[ERR ] server closed the connection");
            let _ = self.events.send(ClientEvent::Listening(false));
            let _ = self.events.send(ClientEvent::Disconnected);
        }
    }

    fn log(&self, line: impl Into<String>) {
        let _ = self.events.send(ClientEvent::Log(line.into()));
    }
}

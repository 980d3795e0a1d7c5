/*
##    ## ######## ######## #######   #######
###  ### ##          ##    ##    ## ##     ##
######## ##          ##    ##    ## ##     ##
## ## ## ######      ##    #######  ##     ##
##    ## ##          ##    ##  ##   ##     ##
##    ## ##          ##    ##   ##  ##     ##
##    ## ########    ##    ##    ##  #######
*/

//! Metro Control Dashboard entry point.
//!
//! ```text
//! metro-cli                          Connect using env vars, config, or defaults
//! metro-cli <host> <port>            Connect to an explicit server
//! metro-cli --config <path>          Use custom config TOML
//! metro-cli --gen-config             Dump default config and exit
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{self, Event};
use metro_core::MetroClient;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use metro_cli::{App, ClientEvent, CliConfig, Login, UiCommand, UiEvent, Worker};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "metro-cli", about = "Metro train telemetry and control dashboard")]
struct Cli {
    /// Server host (overrides config).
    #[arg(env = "METRO_SERVER_HOST")]
    host: Option<String>,

    /// Server port (overrides config).
    #[arg(env = "METRO_SERVER_PORT")]
    port: Option<u16>,

    /// Username; prompted for when absent.
    #[arg(short, long)]
    user: Option<String>,

    /// Password; prompted for when absent.
    #[arg(short, long, env = "METRO_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "metro-cli.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Reported on stderr now, and in the log once tracing is up.
    let (config, config_error) = match CliConfig::load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => {
            eprintln!(
                "warning: invalid config {}: {e}; using defaults",
                cli.config.display()
            );
            (CliConfig::default(), Some(e))
        }
    };
    init_tracing(&config)?;
    info!("metro-cli v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("invalid config {}: {e}; using defaults", cli.config.display());
    }

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let user = match cli.user {
        Some(user) => user,
        None => prompt("Username: ")?,
    };
    let password = match cli.password {
        Some(password) => password,
        None => prompt("Password: ")?,
    };

    // ── 1. Connect and authenticate ─────────────────────────────

    println!("Connecting to {host}:{port}...");
    let mut client = MetroClient::new(config.client_config());
    if let Err(e) = client.connect(&host, port).await {
        error!("connect failed: {e}");
        return Err(e.into());
    }
    if let Err(e) = client.authenticate(&user, &password).await {
        error!("authentication failed: {e}");
        client.close().await;
        return Err(e.into());
    }
    let server = client
        .server()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{host}:{port}"));

    // ── 2. Channels and background tasks ────────────────────────

    let (event_tx, event_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Dedicated thread for blocking crossterm poll
    tokio::task::spawn_blocking(move || {
        loop {
            if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
                if ui_tx.is_closed() {
                    break;
                }
                continue;
            }
            let sent = match event::read() {
                Ok(Event::Key(key)) => ui_tx.send(UiEvent::Key(key)),
                Ok(Event::Resize(w, h)) => ui_tx.send(UiEvent::Resize(w, h)),
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });

    let login = Login {
        host,
        port,
        user: user.clone(),
        password,
    };
    let worker = tokio::spawn(Worker::new(client, event_tx).with_login(login).run(cmd_rx));

    // ── 3. Terminal ─────────────────────────────────────────────

    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;
    terminal.clear()?;

    let app = App::new(server, user);
    let outcome = run_ui(&mut terminal, app, event_rx, ui_rx, &cmd_tx).await;

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;

    // The worker logs out and closes the connection on its way out.
    let _ = cmd_tx.send(UiCommand::Quit);
    if let Err(e) = worker.await {
        error!("worker task failed: {e}");
    }
    outcome?;

    println!("Session closed.");
    Ok(())
}

/// Main UI event loop. Returns once the user quits and the worker has
/// closed the client.
async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mut app: App,
    mut event_rx: mpsc::UnboundedReceiver<ClientEvent>,
    mut ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    cmd_tx: &mpsc::UnboundedSender<UiCommand>,
) -> std::io::Result<()> {
    loop {
        terminal.draw(|f| app.draw(f))?;

        tokio::select! {
            Some(event) = event_rx.recv() => app.update(event),

            Some(event) = ui_rx.recv() => match event {
                UiEvent::Key(key) => {
                    if let Some(cmd) = app.handle_key(key) {
                        let _ = cmd_tx.send(cmd);
                    }
                }
                // Ratatui picks up the new size on the next draw.
                UiEvent::Resize(_, _) => {}
            },

            // Keeps the "updated Ns ago" line moving.
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }

        if app.closed || (app.exit && event_rx.is_closed()) {
            return Ok(());
        }
    }
}

fn init_tracing(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.logging.file)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn prompt(label: &str) -> std::io::Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use metro_core::{Action, BatteryLevel, TelemetrySample};
use ratatui::{
    Frame,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Gauge, List, ListItem, Paragraph, Widget},
};

use crate::worker::{ClientEvent, UiCommand};

/// Log lines kept in memory.
const MAX_LOG_LINES: usize = 500;

const ORANGE: Color = Color::Rgb(255, 165, 0);

#[derive(Debug, Clone)]
pub enum UiEvent {
    Key(KeyEvent),
    Resize(u16, u16),
}

#[derive(Debug, Default)]
pub struct SessionInfo {
    pub server: String,
    pub user: String,
    pub connected: bool,
    pub listening: bool,
}

#[derive(Debug)]
pub struct App {
    pub session: SessionInfo,
    pub telemetry: Option<TelemetrySample>,
    pub samples_received: u64,
    pub logs: Vec<String>,
    pub log_scroll: usize,
    pub autoscroll: bool,
    pub exit: bool,
    /// Set once the worker has closed the client.
    pub closed: bool,
}

impl App {
    pub fn new(server: impl Into<String>, user: impl Into<String>) -> Self {
        let session = SessionInfo {
            server: server.into(),
            user: user.into(),
            connected: true,
            listening: false,
        };
        let logs = vec![
            "Welcome to Metro Control".to_string(),
            format!("Authenticated as {} on {}", session.user, session.server),
        ];
        Self {
            session,
            telemetry: None,
            samples_received: 0,
            logs,
            log_scroll: 0,
            autoscroll: true,
            exit: false,
            closed: false,
        }
    }

    // ── Input ────────────────────────────────────────────────────

    /// Map a key press to a command for the worker. Scrolling and quit
    /// are handled locally.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<UiCommand> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit(),
            KeyCode::Char('q') | KeyCode::Char('6') | KeyCode::Esc => self.quit(),
            KeyCode::Char(c @ '1'..='4') if self.session.connected => {
                let index = usize::from(c as u8 - b'1');
                Some(UiCommand::Issue(Action::KNOWN[index].clone()))
            }
            KeyCode::Char('5') if self.session.connected => Some(UiCommand::ToggleTelemetry),
            KeyCode::Char('r') if !self.session.connected && !self.exit => Some(UiCommand::Reconnect),
            KeyCode::PageUp | KeyCode::Up => {
                let step = if key.code == KeyCode::PageUp { 10 } else { 1 };
                self.log_scroll = (self.log_scroll + step).min(self.logs.len().saturating_sub(1));
                self.autoscroll = false;
                None
            }
            KeyCode::PageDown | KeyCode::Down => {
                let step = if key.code == KeyCode::PageDown { 10 } else { 1 };
                self.log_scroll = self.log_scroll.saturating_sub(step);
                if self.log_scroll == 0 {
                    self.autoscroll = true;
                }
                None
            }
            _ => None,
        }
    }

    fn quit(&mut self) -> Option<UiCommand> {
        if self.exit {
            return None;
        }
        self.exit = true;
        Some(UiCommand::Quit)
    }

    // ── Worker events ────────────────────────────────────────────

    pub fn update(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Log(msg) => {
                for line in msg.lines() {
                    self.push_log(line.to_string());
                }
            }
            ClientEvent::Telemetry(sample) => {
                self.samples_received += 1;
                self.telemetry = Some(sample);
            }
            ClientEvent::Listening(on) => self.session.listening = on,
            ClientEvent::Disconnected => {
                self.session.connected = false;
                self.session.listening = false;
                self.push_log("Disconnected. Press r to reconnect or q to exit.".to_string());
            }
            ClientEvent::Connected => {
                self.session.connected = true;
                self.session.listening = false;
            }
            ClientEvent::Closed => {
                self.session.connected = false;
                self.closed = true;
            }
        }
    }

    fn push_log(&mut self, line: String) {
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            let excess = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(..excess);
        }
        if self.autoscroll {
            self.log_scroll = 0;
        }
    }

    // ── Rendering ────────────────────────────────────────────────

    pub fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        self.render_dashboard(area, frame.buffer_mut());
    }

    fn render_dashboard(&self, area: Rect, buf: &mut Buffer) {
        let outer_block = Block::bordered()
            .title(
                Line::from(vec![
                    Span::raw(" Metro-Control-V0.1---"),
                    Span::styled(
                        "Telemetry & Commands",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(" "),
                ])
                .centered(),
            )
            .border_set(border::THICK)
            .border_style(Style::default().fg(Color::DarkGray));

        let inner_area = outer_block.inner(area);
        outer_block.render(area, buf);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(inner_area);
        self.render_header(rows[0], buf);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);
        self.render_logs(columns[0], buf);

        let sidebar = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(11), Constraint::Min(0)])
            .split(columns[1]);
        self.render_telemetry(sidebar[0], buf);
        self.render_menu(sidebar[1], buf);
    }

    fn render_header(&self, area: Rect, buf: &mut Buffer) {
        let (link, link_color) = if self.session.connected {
            ("CONNECTED", Color::Green)
        } else {
            ("DISCONNECTED", Color::Red)
        };
        let (listen, listen_color) = if self.session.listening {
            ("LISTENING", Color::Green)
        } else {
            ("IDLE", Color::Gray)
        };

        let line = Line::from(vec![
            Span::styled("Server: ", Style::default().fg(Color::Gray)),
            Span::styled(&self.session.server, Style::default().fg(Color::Yellow)),
            Span::raw("  "),
            Span::styled("User: ", Style::default().fg(Color::Gray)),
            Span::styled(&self.session.user, Style::default().fg(Color::Yellow)),
            Span::raw("  "),
            Span::styled(link, Style::default().fg(link_color).add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled("Telemetry: ", Style::default().fg(Color::Gray)),
            Span::styled(listen, Style::default().fg(listen_color)),
        ]);
        Paragraph::new(line)
            .block(Block::bordered().border_style(Style::default().fg(Color::DarkGray)))
            .render(area, buf);
    }

    fn render_logs(&self, area: Rect, buf: &mut Buffer) {
        let logs_block = Block::bordered()
            .title(Line::from(vec![
                Span::styled(" Logs ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                if self.autoscroll {
                    Span::styled("[Autoscroll]", Style::default().fg(Color::Green).add_modifier(Modifier::DIM))
                } else {
                    Span::styled("[Manual]", Style::default().fg(Color::Yellow).add_modifier(Modifier::DIM))
                },
            ]))
            .border_style(Style::default().fg(Color::DarkGray))
            .padding(ratatui::widgets::Padding::horizontal(1));

        let logs_inner = logs_block.inner(area);
        logs_block.render(area, buf);

        // scroll 0 = the last `visible_height` lines
        let visible_height = logs_inner.height as usize;
        let total = self.logs.len();
        let start = total
            .saturating_sub(visible_height)
            .saturating_sub(self.log_scroll);
        let end = (start + visible_height).min(total);

        let items: Vec<ListItem> = self.logs[start..end]
            .iter()
            .map(|log| {
                if let Some(rest) = log.strip_prefix("> ") {
                    ListItem::new(Line::from(vec![
                        Span::styled("> ", Style::default().fg(Color::Green)),
                        Span::raw(rest),
                    ]))
                } else if let Some(rest) = log.strip_prefix("- ") {
                    ListItem::new(Line::from(vec![
                        Span::styled("- ", Style::default().fg(Color::Blue)),
                        Span::styled(rest, Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC)),
                    ]))
                } else if log.starts_with("[ERR ]") {
                    ListItem::new(Line::from(Span::styled(log.as_str(), Style::default().fg(Color::Red))))
                } else {
                    ListItem::new(Line::from(log.as_str()))
                }
            })
            .collect();
        List::new(items).render(logs_inner, buf);
    }

    fn render_telemetry(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered()
            .title(Span::styled(" Telemetry ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)))
            .border_style(Style::default().fg(Color::DarkGray))
            .padding(ratatui::widgets::Padding::horizontal(1));
        let inner = block.inner(area);
        block.render(area, buf);

        let Some(sample) = &self.telemetry else {
            let hint = if self.session.listening {
                "Waiting for the first sample..."
            } else {
                "Press [5] to start listening"
            };
            Paragraph::new(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
                .render(inner, buf);
            return;
        };

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // speed
                Constraint::Length(1), // battery gauge
                Constraint::Length(1), // battery bar
                Constraint::Length(1), // direction
                Constraint::Length(1), // station
                Constraint::Length(1),
                Constraint::Min(0), // last update
            ])
            .split(inner);

        let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));
        let color = battery_color(sample.battery_level());

        Paragraph::new(Line::from(vec![
            label("Speed     : "),
            Span::styled(
                format!("{:.1} km/h", sample.speed_kmh),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
        ]))
        .render(layout[0], buf);

        Gauge::default()
            .gauge_style(Style::default().fg(color).bg(Color::Black))
            .percent(u16::from(sample.battery_percent))
            .label(format!("Battery {}%", sample.battery_percent))
            .render(layout[1], buf);

        Paragraph::new(Line::from(vec![
            label("Battery   : "),
            Span::styled(sample.battery_bar(), Style::default().fg(color)),
        ]))
        .render(layout[2], buf);

        Paragraph::new(Line::from(vec![
            label("Direction : "),
            Span::styled(sample.direction.to_string(), Style::default().fg(Color::Magenta)),
        ]))
        .render(layout[3], buf);

        Paragraph::new(Line::from(vec![
            label("Station   : "),
            Span::styled(sample.station.as_str(), Style::default().fg(Color::Magenta)),
        ]))
        .render(layout[4], buf);

        Paragraph::new(Line::from(vec![
            label("Updated   : "),
            Span::styled(
                format!(
                    "{:.1}s ago ({} samples)",
                    elapsed_secs(sample.received_at),
                    self.samples_received
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]))
        .render(layout[6], buf);
    }

    fn render_menu(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered()
            .title(Span::styled(" Commands ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)))
            .border_style(Style::default().fg(Color::DarkGray));
        let inner = block.inner(area);
        block.render(area, buf);

        let key_style = if self.session.connected {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let mut lines: Vec<Line> = Action::KNOWN
            .iter()
            .enumerate()
            .map(|(i, action)| {
                Line::from(vec![
                    Span::styled(format!("[{}] {:<10}", i + 1, action.as_str()), key_style),
                    Span::raw(format!(" - {}", action.description())),
                ])
            })
            .collect();
        let toggle = if self.session.listening {
            " - Stop listening to telemetry"
        } else {
            " - Listen to live telemetry"
        };
        lines.push(Line::from(vec![
            Span::styled("[5] Telemetry ", key_style),
            Span::raw(toggle),
        ]));
        if !self.session.connected {
            lines.push(Line::from(vec![
                Span::styled("[r] Reconnect ", Style::default().fg(Color::Cyan)),
                Span::raw(" - Connect and log in again"),
            ]));
        }
        lines.push(Line::from(vec![
            Span::styled("[q] Quit      ", Style::default().fg(Color::Red)),
            Span::raw(" - Log out and exit"),
        ]));
        Paragraph::new(lines).render(inner, buf);
    }
}

fn battery_color(level: BatteryLevel) -> Color {
    match level {
        BatteryLevel::Critical => Color::Red,
        BatteryLevel::Low => ORANGE,
        BatteryLevel::Good => Color::Green,
    }
}

fn elapsed_secs(since: Instant) -> f64 {
    since.elapsed().as_secs_f64()
}

//! Terminal front end for the remote execution client.
//!
//! Run with: cargo run -p tui-runner -- <file> [language]
//!
//! The service address comes from `REMOTE_EXEC_BASE_URL` (default
//! `localhost:8000`). The forgery-protection token is read from
//! `REMOTE_EXEC_CSRF_TOKEN`, or scraped from the service's landing page.
//! Logs go to `tui-runner.log`; set `RUST_LOG` to adjust verbosity.

use std::{
    fs::File,
    io,
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use remote_exec_core::{
    ClientConfig, EntryKind, EventKind, InputSurface, SessionEvent, SinkEvent,
};
use remote_exec_session::SessionClient;
use remote_exec_transport::{CsrfToken, HttpTransport, TransportConfig};
use tokio::sync::mpsc;

const DEFAULT_BASE_URL: &str = "localhost:8000";
const LOG_FILE: &str = "tui-runner.log";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = PathBuf::from(args.next().context("usage: tui-runner <file> [language]")?);
    let language = args.next().unwrap_or_else(|| "python".to_string());
    let code = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    init_logging()?;

    let transport = build_transport().await?;
    let client = SessionClient::new(transport, ClientConfig::from_env());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &client, code, language).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn init_logging() -> anyhow::Result<()> {
    let file = File::create(LOG_FILE).with_context(|| format!("creating {LOG_FILE}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

async fn build_transport() -> anyhow::Result<HttpTransport> {
    let config = TransportConfig::from_env(DEFAULT_BASE_URL)?;
    let transport = match CsrfToken::from_env() {
        Ok(token) => HttpTransport::new(&config, Some(token.expose().to_owned()))?,
        Err(_) => {
            tracing::info!(base = %config.base_url(), "no token in environment, reading landing page");
            HttpTransport::discover(&config)
                .await
                .context("fetching forgery-protection token")?
        }
    };
    Ok(transport)
}

/// Input box state shared between the client and the render loop.
#[derive(Default)]
struct TuiSurface {
    buffer: Mutex<String>,
    enabled: AtomicBool,
    focused: AtomicBool,
}

impl TuiSurface {
    fn buffer(&self) -> std::sync::MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    fn take_line(&self) -> String {
        std::mem::take(&mut *self.buffer())
    }
}

impl InputSurface for TuiSurface {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.buffer().clear();
    }

    fn focus(&self) {
        self.focused.store(true, Ordering::SeqCst);
    }
}

struct App {
    lines: Vec<(String, Style)>,
    scroll: u16,
    follow: bool,
    status: String,
    busy: bool,
}

impl App {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            scroll: 0,
            follow: true,
            status: "Starting...".to_string(),
            busy: false,
        }
    }

    fn apply(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Appended(entry) => {
                let style = match entry.kind {
                    EntryKind::Output => Style::default(),
                    EntryKind::InputEcho => Style::default().fg(Color::Cyan),
                    EntryKind::Error => Style::default().fg(Color::Red),
                };
                self.lines.push((entry.rendered(), style));
            }
            SinkEvent::Cleared => {
                self.lines.clear();
                self.scroll = 0;
            }
            SinkEvent::ScrolledTo(_) => self.follow = true,
        }
    }

    fn on_session_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::SubmissionAccepted => {
                self.busy = true;
                self.status = "Starting session...".to_string();
            }
            SessionEvent::SubmissionRejected { reason } => {
                self.status = format!("Rejected: {reason}");
            }
            SessionEvent::SessionStarted { session_id } => {
                self.status = format!("Running (session: {session_id})");
            }
            SessionEvent::InputRequired { waiting: true } => {
                self.status = "Waiting for input".to_string();
            }
            SessionEvent::InputRequired { waiting: false } => {
                self.status = "Running".to_string();
            }
            SessionEvent::SessionEnded { .. } => {
                self.busy = false;
                self.status = "Finished".to_string();
            }
            SessionEvent::SessionFailed { reason } => {
                self.busy = false;
                self.status = format!("Failed: {reason}");
            }
        }
    }

    fn scroll_up(&mut self, by: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(by);
    }

    fn scroll_down(&mut self, by: u16) {
        self.scroll = self.scroll.saturating_add(by);
    }
}

fn spawn_run(client: &SessionClient, code: &str, language: &str) {
    let client = client.clone();
    let code = code.to_string();
    let language = language.to_string();
    tokio::spawn(async move {
        if let Err(err) = client.execute_code(&code, &language).await {
            tracing::warn!(error = %err, "submission did not start");
        }
    });
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: &SessionClient,
    code: String,
    language: String,
) -> anyhow::Result<()> {
    let mut app = App::new();
    let surface = Arc::new(TuiSurface::default());

    let hooks = {
        let surface = Arc::clone(&surface);
        move || Some(Arc::clone(&surface) as Arc<dyn InputSurface>)
    };
    client.init(&hooks).await?;

    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<SinkEvent>();
    let mut output = client.output().history_plus_stream();
    tokio::spawn(async move {
        while let Some(event) = output.next().await {
            if output_tx.send(event).is_err() {
                break;
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let subscription = client.subscribe(EventKind::Any, move |event| {
        let _ = event_tx.send(event.clone());
    });

    spawn_run(client, &code, &language);

    loop {
        while let Ok(event) = output_rx.try_recv() {
            app.apply(event);
        }
        while let Ok(event) = event_rx.try_recv() {
            app.on_session_event(&event);
        }

        terminal.draw(|f| ui(f, &mut app, &surface))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                client.unsubscribe(subscription);
                client.dispose().await;
                return Ok(());
            }
            KeyEvent {
                code: KeyCode::Char('r'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                if !client.snapshot().busy {
                    spawn_run(client, &code, &language);
                }
            }
            KeyEvent {
                code: KeyCode::Tab | KeyCode::Esc,
                ..
            } => {
                surface.focused.store(false, Ordering::SeqCst);
                client.input_blurred();
            }
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } => {
                if surface.is_enabled() && surface.is_focused() {
                    surface.buffer().push(c);
                }
            }
            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => {
                surface.buffer().pop();
            }
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => {
                if surface.is_enabled() {
                    let line = surface.take_line();
                    if let Err(err) = client.submit_input(&line).await {
                        tracing::warn!(error = %err, "input not delivered");
                    }
                }
            }
            KeyEvent {
                code: KeyCode::Up, ..
            } => app.scroll_up(1),
            KeyEvent {
                code: KeyCode::Down,
                ..
            } => app.scroll_down(1),
            KeyEvent {
                code: KeyCode::PageUp,
                ..
            } => app.scroll_up(10),
            KeyEvent {
                code: KeyCode::PageDown,
                ..
            } => app.scroll_down(10),
            _ => {}
        }
    }
}

/// Break entries into rows of at most `width` characters, so the scroll
/// offset counts exactly what is drawn.
fn wrap_rows(lines: &[(String, Style)], width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut rows = Vec::with_capacity(lines.len());
    for (text, style) in lines {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            rows.push(Line::styled(String::new(), *style));
            continue;
        }
        for chunk in chars.chunks(width) {
            rows.push(Line::styled(chunk.iter().collect::<String>(), *style));
        }
    }
    rows
}

fn ui(f: &mut Frame, app: &mut App, surface: &TuiSurface) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let visible = chunks[0].height.saturating_sub(2);
    let rows = wrap_rows(&app.lines, usize::from(chunks[0].width.saturating_sub(2)));
    let total = u16::try_from(rows.len()).unwrap_or(u16::MAX);
    let bottom = total.saturating_sub(visible);
    if app.follow || app.scroll > bottom {
        app.scroll = bottom;
    }

    let output = Paragraph::new(rows)
        .block(Block::default().borders(Borders::ALL).title("Output"))
        .scroll((app.scroll, 0));
    f.render_widget(output, chunks[0]);

    let buffer = surface.buffer().clone();
    let (title, style) = if surface.is_enabled() {
        ("Input", Style::default().fg(Color::Yellow))
    } else {
        ("Input (disabled)", Style::default().fg(Color::DarkGray))
    };
    let input = Paragraph::new(buffer.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input, chunks[1]);

    if surface.is_enabled() && surface.is_focused() {
        let width = u16::try_from(buffer.chars().count()).unwrap_or(u16::MAX);
        f.set_cursor_position((chunks[1].x.saturating_add(width).saturating_add(1), chunks[1].y + 1));
    }

    let status_style = if app.status.starts_with("Failed") || app.status.starts_with("Rejected") {
        Style::default().fg(Color::Red)
    } else if app.busy {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(app.status.as_str(), status_style),
        Span::raw(" | "),
        Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
        Span::raw(" quit | "),
        Span::styled("Ctrl+R", Style::default().fg(Color::Yellow)),
        Span::raw(" rerun | "),
        Span::styled("Up/Down/PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" scroll "),
    ]));
    f.render_widget(status, chunks[2]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_entries_count_every_wrapped_row() {
        let lines = vec![
            ("x".repeat(25), Style::default()),
            ("short".to_string(), Style::default()),
        ];
        let rows = wrap_rows(&lines, 10);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].to_string(), "xxxxx");
        assert_eq!(rows[3].to_string(), "short");
    }
}

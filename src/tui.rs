use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{AcquireResult, ProgressEvent, ProgressSink, SweepProgress};
use crate::error::HarvestError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
    Help,
}

#[derive(Debug)]
struct AppState {
    phase: String,
    status: String,
    progress: Option<SweepProgress>,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    active: bool,
}

pub struct Tui {
    state: Arc<Mutex<AppState>>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase.to_string();
                state.status = payload.to_string();
                push_event(&mut state.events, message.clone());
            } else {
                state.status = message.clone();
            }
            if let Some(progress) = event.progress {
                state.progress = Some(progress);
            } else {
                let elapsed = state.started.elapsed();
                push_log(&mut state.logs, format!("[{:>6.1}s] {message}", elapsed.as_secs_f64()));
            }
        }
    }
}

impl Tui {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState {
                phase: "Idle".to_string(),
                status: "ready".to_string(),
                progress: None,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
                active: false,
            })),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. Returns once
    /// the work finishes, or with an error if the operator aborts.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, HarvestError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, &state, tick, self.log_scroll))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                self.set_active(false);
                restore_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        self.set_active(false);
        restore_terminal()?;
        Err(miette::Report::msg("aborted"))
    }

    pub fn finish(&mut self, result: &AcquireResult) -> miette::Result<()> {
        if let Ok(mut state) = self.state.lock() {
            state.phase = "Done".to_string();
            state.status = match &result.flavordb {
                Some(db) => format!("FlavorDB {}", db.status),
                None => "finished".to_string(),
            };
            state.view = View::Operational;
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::F(1) | KeyCode::Char('?') => self.set_view(View::Help),
            KeyCode::F(3) => self.set_view(View::Operational),
            KeyCode::F(4) => self.set_view(View::Logs),
            KeyCode::PageUp => self.scroll_logs(-5),
            KeyCode::PageDown => self.scroll_logs(5),
            KeyCode::Char('q') | KeyCode::Esc => return true,
            _ => {}
        }
        false
    }

    fn set_view(&self, view: View) {
        if let Ok(mut state) = self.state.lock() {
            state.view = view;
        }
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
                state.progress = None;
            }
        }
    }

    fn scroll_logs(&mut self, delta: i16) {
        let max = self.state.lock().map(|state| state.logs.len()).unwrap_or(0);
        let max_scroll = max.saturating_sub(1) as i16;
        let next = (self.log_scroll as i16 + delta).clamp(0, max_scroll);
        self.log_scroll = next as u16;
    }
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, state: &AppState, tick: usize, log_scroll: u16) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, tick), chunks[0]);
    frame.render_widget(draw_gauge(state), chunks[1]);

    match state.view {
        View::Operational => {
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
                .split(chunks[2]);
            frame.render_widget(draw_counters(state), main[0]);
            frame.render_widget(draw_events(state), main[1]);
        }
        View::Logs => frame.render_widget(draw_logs(state, log_scroll), chunks[2]),
        View::Help => frame.render_widget(draw_help(), chunks[2]),
    }
}

fn draw_header(state: &AppState, tick: usize) -> Paragraph<'static> {
    let hb = if state.active && tick % 2 == 0 { "*" } else { " " };
    let line = Line::from(vec![
        Span::styled(
            "FLAVOR-HARVEST",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Phase: "),
        Span::styled(state.phase.clone(), Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    Paragraph::new(line).block(Block::default().borders(Borders::ALL))
}

fn draw_gauge(state: &AppState) -> Gauge<'static> {
    let (ratio, label) = match state.progress {
        Some(progress) if progress.total > 0 => (
            progress.position as f64 / progress.total as f64,
            format!("{}/{} ids", progress.position, progress.total),
        ),
        _ => (0.0, "waiting".to_string()),
    };
    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Sweep"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label)
}

fn draw_counters(state: &AppState) -> Paragraph<'static> {
    let progress = state.progress.unwrap_or(SweepProgress {
        position: 0,
        total: 0,
        downloaded: 0,
        skipped: 0,
        not_found: 0,
        errors: 0,
    });
    let elapsed = state.started.elapsed().as_secs_f64();
    let lines = vec![
        counter_line("Downloaded", progress.downloaded, Color::Green),
        counter_line("Cached", progress.skipped, Color::Cyan),
        counter_line("Not found", progress.not_found, Color::Yellow),
        counter_line("Errors", progress.errors, Color::Red),
        Line::from(vec![
            Span::styled("Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{elapsed:.1}s")),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
    ];
    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Counters"))
}

fn counter_line(label: &'static str, value: u64, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        Span::styled(value.to_string(), Style::default().fg(color)),
    ])
}

fn draw_events(state: &AppState) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .events
        .iter()
        .map(|event| Line::from(event.clone()))
        .collect();
    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Events"))
}

fn draw_logs(state: &AppState, scroll: u16) -> Paragraph<'static> {
    let lines: Vec<Line> = state.logs.iter().map(|log| Line::from(log.clone())).collect();
    Paragraph::new(lines)
        .scroll((scroll, 0))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Logs (PgUp/PgDn)"))
}

fn draw_help() -> Paragraph<'static> {
    let lines = vec![
        Line::from("F1 / ?  help"),
        Line::from("F3      overview"),
        Line::from("F4      logs"),
        Line::from("q / Esc abort (cached entities are kept)"),
    ];
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"))
}

fn parse_phase(message: &str) -> Option<(&str, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (phase, payload) = rest.split_once(';')?;
    Some((phase.trim(), payload.trim()))
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn push_log(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > LOGS_MAX {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_messages_parse() {
        assert_eq!(
            parse_phase("phase=Sweep; ids 0..=1000"),
            Some(("Sweep", "ids 0..=1000"))
        );
        assert_eq!(parse_phase("sweep id=4"), None);
    }
}

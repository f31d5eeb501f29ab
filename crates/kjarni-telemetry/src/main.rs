//! kjarni-telemetry: TUI dashboard for a running kjarni level.
//!
//! Listens for the JSON snapshots a kjarni host sends over UDP and shows them
//! in a terminal dashboard built with ratatui.
//!
//! Run a host built with the `diagnostics` feature (on by default), then run
//! `cargo run -p kjarni-telemetry`.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline};
use ratatui::Terminal;
use serde::{Deserialize, Serialize};

const METRICS_ADDR: &str = "127.0.0.1:9100";
const REQUEST_ADDR: &str = "127.0.0.1:9101";

// ── Wire types (kjarni::diag JSON) ───────────────────────────────────────

#[derive(Deserialize, Clone, Default)]
struct DiagSnapshot {
    tps: f32,
    delta_ms: f32,
    tick_count: u64,
    elapsed_secs: f32,
    #[serde(default)]
    level_name: String,
    #[serde(default)]
    level_id: String,
    entity_count: usize,
    #[serde(default)]
    client_count: usize,
    #[serde(default)]
    entity_types: Vec<EntityTypeInfo>,
    #[serde(default)]
    events: Vec<EventCount>,
    #[serde(default)]
    recent_events: Vec<String>,
    #[serde(default)]
    logs: Vec<LogEntryInfo>,
}

#[derive(Deserialize, Clone, Default)]
struct EntityTypeInfo {
    name: String,
    count: usize,
    components: Vec<String>,
    entities: Option<Vec<EntityInfo>>,
}

#[derive(Deserialize, Clone, Default)]
struct EntityInfo {
    id: String,
    name: String,
    state: String,
    description: String,
}

#[derive(Deserialize, Clone, Default)]
struct EventCount {
    name: String,
    count: u64,
}

#[derive(Deserialize, Clone, Default)]
struct LogEntryInfo {
    level: String,
    target: String,
    message: String,
    timestamp_secs: f32,
}

/// Sent to the host when the set of expanded entity types changes.
#[derive(Serialize)]
struct InspectRequest {
    expanded_types: Vec<String>,
}

// ── Tabs ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Overview,
    Entities,
    Events,
    Logs,
}

impl Tab {
    const ALL: [Tab; 4] = [Tab::Overview, Tab::Entities, Tab::Events, Tab::Logs];

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    fn label(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Entities => "Entities",
            Tab::Events => "Events",
            Tab::Logs => "Logs",
        }
    }
}

// ── Entity tree ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum TreeRow {
    Type { type_idx: usize },
    Entity { type_idx: usize, entity_row: usize },
    /// One line of an expanded entity's description (display-only).
    Detail { type_idx: usize, entity_row: usize, line_idx: usize },
}

// ── Log filter ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LogFilter {
    All,
    Info,
    Warn,
    Error,
}

impl LogFilter {
    fn next(self) -> Self {
        match self {
            LogFilter::All => LogFilter::Info,
            LogFilter::Info => LogFilter::Warn,
            LogFilter::Warn => LogFilter::Error,
            LogFilter::Error => LogFilter::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogFilter::All => "ALL",
            LogFilter::Info => "INFO+",
            LogFilter::Warn => "WARN+",
            LogFilter::Error => "ERROR",
        }
    }

    fn passes(self, level: &str) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Info => matches!(level, "INFO" | "WARN" | "ERROR"),
            LogFilter::Warn => matches!(level, "WARN" | "ERROR"),
            LogFilter::Error => level == "ERROR",
        }
    }
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 1200;
const LOG_CAP: usize = 2000;

struct App {
    latest: DiagSnapshot,
    tps_history: VecDeque<u64>,
    delta_history: VecDeque<u64>,
    active_tab: Tab,
    paused: bool,
    connected: bool,
    /// Inspection requests to the host.
    request_socket: UdpSocket,

    expanded_types: HashSet<String>,
    expanded_entities: HashSet<String>,
    cursor: usize,

    logs: VecDeque<LogEntryInfo>,
    log_filter: LogFilter,
    log_auto_scroll: bool,
    log_scroll_offset: usize,
}

impl App {
    fn new(request_socket: UdpSocket) -> Self {
        Self {
            latest: DiagSnapshot::default(),
            tps_history: VecDeque::with_capacity(HISTORY_CAP),
            delta_history: VecDeque::with_capacity(HISTORY_CAP),
            active_tab: Tab::Overview,
            paused: false,
            connected: false,
            request_socket,
            expanded_types: HashSet::new(),
            expanded_entities: HashSet::new(),
            cursor: 0,
            logs: VecDeque::new(),
            log_filter: LogFilter::Info,
            log_auto_scroll: true,
            log_scroll_offset: 0,
        }
    }

    fn push_snapshot(&mut self, mut snap: DiagSnapshot) {
        if self.paused {
            return;
        }
        push_capped(&mut self.tps_history, snap.tps.round().max(0.0) as u64, HISTORY_CAP);
        // Microseconds, so the sparkline keeps sub-millisecond detail.
        push_capped(
            &mut self.delta_history,
            (snap.delta_ms * 1000.0).round().max(0.0) as u64,
            HISTORY_CAP,
        );
        for log in snap.logs.drain(..) {
            push_capped(&mut self.logs, log, LOG_CAP);
        }

        self.latest = snap;
        self.connected = true;
        self.clamp_cursor();
    }

    fn send_expand_request(&self) {
        let req = InspectRequest {
            expanded_types: self.expanded_types.iter().cloned().collect(),
        };
        if let Ok(json) = serde_json::to_vec(&req) {
            let _ = self.request_socket.send(&json);
        }
    }

    /// Flattened tree rows and the indices of the selectable ones.
    fn build_tree_rows(&self) -> (Vec<TreeRow>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut selectable = Vec::new();
        for (type_idx, ty) in self.latest.entity_types.iter().enumerate() {
            selectable.push(rows.len());
            rows.push(TreeRow::Type { type_idx });
            if !self.expanded_types.contains(&ty.name) {
                continue;
            }
            for (entity_row, entity) in ty.entities.iter().flatten().enumerate() {
                selectable.push(rows.len());
                rows.push(TreeRow::Entity { type_idx, entity_row });
                if self.expanded_entities.contains(&entity.id) {
                    for line_idx in 0..entity.description.lines().count() {
                        rows.push(TreeRow::Detail {
                            type_idx,
                            entity_row,
                            line_idx,
                        });
                    }
                }
            }
        }
        (rows, selectable)
    }

    fn entity(&self, type_idx: usize, entity_row: usize) -> Option<&EntityInfo> {
        self.latest
            .entity_types
            .get(type_idx)?
            .entities
            .as_ref()?
            .get(entity_row)
    }

    fn clamp_cursor(&mut self) {
        let (_, selectable) = self.build_tree_rows();
        self.cursor = self.cursor.min(selectable.len().saturating_sub(1));
    }

    fn toggle_expand(&mut self) {
        let (rows, selectable) = self.build_tree_rows();
        let Some(&row) = selectable.get(self.cursor) else {
            return;
        };
        match rows[row] {
            TreeRow::Type { type_idx } => {
                let name = self.latest.entity_types[type_idx].name.clone();
                if !self.expanded_types.remove(&name) {
                    self.expanded_types.insert(name);
                }
                self.send_expand_request();
            }
            TreeRow::Entity { type_idx, entity_row } => {
                if let Some(id) = self.entity(type_idx, entity_row).map(|e| e.id.clone()) {
                    if !self.expanded_entities.remove(&id) {
                        self.expanded_entities.insert(id);
                    }
                }
            }
            TreeRow::Detail { .. } => {}
        }
    }

    /// Collapse the row under the cursor, or jump to its parent type.
    fn collapse_or_parent(&mut self) {
        let (rows, selectable) = self.build_tree_rows();
        let Some(&row) = selectable.get(self.cursor) else {
            return;
        };
        match rows[row] {
            TreeRow::Type { type_idx } => {
                let name = &self.latest.entity_types[type_idx].name;
                if self.expanded_types.remove(name) {
                    self.send_expand_request();
                }
            }
            TreeRow::Entity { type_idx, entity_row } => {
                let id = self.entity(type_idx, entity_row).map(|e| e.id.clone());
                if id.is_some_and(|id| self.expanded_entities.remove(&id)) {
                    return;
                }
                let parent = rows.iter().position(|r| *r == TreeRow::Type { type_idx });
                if let Some(cursor) = parent.and_then(|p| selectable.iter().position(|&s| s == p)) {
                    self.cursor = cursor;
                }
            }
            TreeRow::Detail { .. } => {}
        }
        self.clamp_cursor();
    }

    fn log_counts(&self) -> (usize, usize, usize, usize) {
        let (mut d, mut i, mut w, mut e) = (0, 0, 0, 0);
        for log in &self.logs {
            match log.level.as_str() {
                "TRACE" | "DEBUG" => d += 1,
                "INFO" => i += 1,
                "WARN" => w += 1,
                "ERROR" => e += 1,
                _ => {}
            }
        }
        (d, i, w, e)
    }

    fn filtered_logs(&self) -> Vec<&LogEntryInfo> {
        self.logs
            .iter()
            .filter(|e| self.log_filter.passes(&e.level))
            .collect()
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    if queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(value);
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let recv_socket = UdpSocket::bind(METRICS_ADDR).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("failed to bind {METRICS_ADDR} (is another kjarni-telemetry running?): {err}"),
        )
    })?;
    recv_socket.set_nonblocking(true)?;

    let send_socket = UdpSocket::bind("127.0.0.1:0")?;
    send_socket.connect(REQUEST_ADDR)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = App::new(send_socket);
    let result = run(&mut terminal, &mut app, &recv_socket);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    socket: &UdpSocket,
) -> io::Result<()> {
    let mut buf = [0u8; 65536];
    loop {
        while let Ok(n) = socket.recv(&mut buf) {
            if let Ok(snap) = serde_json::from_slice::<DiagSnapshot>(&buf[..n]) {
                app.push_snapshot(snap);
            }
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(app, key) {
                    return Ok(());
                }
            }
        }
    }
}

// ── Key handling ─────────────────────────────────────────────────────────

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,

        KeyCode::Char(c @ '1'..='4') => {
            app.active_tab = Tab::ALL[c as usize - '1' as usize];
        }
        KeyCode::Tab => app.active_tab = app.active_tab.next(),
        KeyCode::BackTab => app.active_tab = app.active_tab.prev(),

        KeyCode::Up if app.active_tab == Tab::Entities => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Entities => {
            app.cursor += 1;
            app.clamp_cursor();
        }
        KeyCode::Enter | KeyCode::Right if app.active_tab == Tab::Entities => app.toggle_expand(),
        KeyCode::Left if app.active_tab == Tab::Entities => app.collapse_or_parent(),
        KeyCode::Esc if app.active_tab == Tab::Entities => {
            app.expanded_types.clear();
            app.expanded_entities.clear();
            app.cursor = 0;
            app.send_expand_request();
        }

        KeyCode::Char('l') if app.active_tab == Tab::Logs => app.log_filter = app.log_filter.next(),
        KeyCode::Char('g') if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = !app.log_auto_scroll;
        }
        KeyCode::Up if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset = app.log_scroll_offset.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset += 1;
        }
        _ => {}
    }
    false
}

// ── Drawing ──────────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(1), // tab bar
            Constraint::Min(6),    // tab content
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_tab_bar(f, app, chunks[1]);
    match app.active_tab {
        Tab::Overview => draw_overview_tab(f, app, chunks[2]),
        Tab::Entities => draw_entities_tab(f, app, chunks[2]),
        Tab::Events => draw_events_tab(f, app, chunks[2]),
        Tab::Logs => draw_logs_tab(f, app, chunks[2]),
    }
    draw_help_bar(f, app, chunks[3]);
}

fn label(text: &str) -> Span<'static> {
    Span::styled(text.to_string(), Style::default().fg(Color::DarkGray))
}

fn value(text: String) -> Span<'static> {
    Span::styled(text, Style::default().fg(Color::White))
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let (status, status_color) = if app.paused {
        (" PAUSED ", Color::Yellow)
    } else if app.connected {
        (" LIVE ", Color::Green)
    } else {
        (" WAITING ", Color::DarkGray)
    };

    let text = Line::from(vec![
        Span::styled(
            format!(" {status} "),
            Style::default().bg(status_color).fg(Color::Black),
        ),
        Span::raw("  "),
        label("TPS: "),
        Span::styled(
            format!("{:.1}", s.tps),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        label("Tick: "),
        value(s.tick_count.to_string()),
        Span::raw("  |  "),
        label("Entities: "),
        value(s.entity_count.to_string()),
        Span::raw("  |  "),
        label("Clients: "),
        value(s.client_count.to_string()),
        Span::raw("  |  "),
        label("Up: "),
        value(format_uptime(s.elapsed_secs)),
    ]);

    let block = Block::default()
        .title(" kjarni-telemetry ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_tab_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let (num_style, label_style) = if *tab == app.active_tab {
            (
                Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )
        } else {
            (Style::default().fg(Color::DarkGray), Style::default().fg(Color::DarkGray))
        };
        spans.push(Span::styled(format!(" {} ", i + 1), num_style));
        spans.push(Span::styled(format!("{} ", tab.label()), label_style));
        spans.push(Span::raw("  "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Overview ─────────────────────────────────────────────────────────────

fn draw_overview_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(3)])
        .split(area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let tps: Vec<u64> = app.tps_history.iter().copied().collect();
    let (min, avg, max) = stats(&tps);
    draw_sparkline(
        f,
        halves[0],
        " TPS History ",
        &tps,
        Color::Green,
        format!("min: {min:.0}  avg: {avg:.0}  max: {max:.0}"),
    );

    let delta: Vec<u64> = app.delta_history.iter().copied().collect();
    let (min, avg, max) = stats(&delta);
    draw_sparkline(
        f,
        halves[1],
        " Tick Interval ",
        &delta,
        Color::Yellow,
        format!(
            "min: {:.1}ms  avg: {:.1}ms  max: {:.1}ms",
            min / 1000.0,
            avg / 1000.0,
            max / 1000.0
        ),
    );

    let s = &app.latest;
    let mut lines = vec![
        Line::from(vec![label("  Level: "), value(s.level_name.clone())]),
        Line::from(vec![label("  Id:    "), value(s.level_id.clone())]),
        Line::from(vec![label("  Delta: "), value(format!("{:.2}ms", s.delta_ms))]),
        Line::from(""),
    ];
    for ty in &s.entity_types {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:>5} ", ty.count), Style::default().fg(Color::Cyan)),
            value(ty.name.clone()),
        ]));
    }
    let block = Block::default()
        .title(" Level ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(lines).block(block), chunks[1]);
}

fn draw_sparkline(
    f: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    data: &[u64],
    color: Color,
    summary: String,
) {
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 {
        return;
    }
    let spark_area = Rect {
        height: inner.height - 1,
        ..inner
    };
    let stats_area = Rect {
        y: inner.y + inner.height - 1,
        height: 1,
        ..inner
    };
    f.render_widget(
        Sparkline::default().data(data).style(Style::default().fg(color)),
        spark_area,
    );
    f.render_widget(Paragraph::new(Line::from(label(&summary))), stats_area);
}

// ── Entities ─────────────────────────────────────────────────────────────

fn draw_entities_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" Entity Types ({}) ", app.latest.entity_types.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let (rows, selectable) = app.build_tree_rows();
    if rows.is_empty() {
        f.render_widget(Paragraph::new(label("  No entity types")), inner);
        return;
    }
    let selected = selectable.get(app.cursor).copied();

    // Keep the selected row in view.
    let visible = inner.height as usize;
    let offset = selected.map_or(0, |s| s.saturating_sub(visible.saturating_sub(1)));

    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible)
        .map(|(i, row)| {
            let line = tree_line(app, row);
            if Some(i) == selected {
                line.style(Style::default().bg(Color::DarkGray))
            } else {
                line
            }
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn tree_line<'a>(app: &'a App, row: &TreeRow) -> Line<'a> {
    match *row {
        TreeRow::Type { type_idx } => {
            let ty = &app.latest.entity_types[type_idx];
            let marker = if app.expanded_types.contains(&ty.name) { "\u{25be}" } else { "\u{25b8}" };
            Line::from(vec![
                Span::styled(format!(" {marker} "), Style::default().fg(Color::Cyan)),
                Span::styled(ty.name.as_str(), Style::default().add_modifier(Modifier::BOLD)),
                label(&format!("  ({})  ", ty.count)),
                label(&format!("{{{}}}", ty.components.join(", "))),
            ])
        }
        TreeRow::Entity { type_idx, entity_row } => {
            let Some(entity) = app.entity(type_idx, entity_row) else {
                return Line::from("");
            };
            let marker = if app.expanded_entities.contains(&entity.id) { "\u{25be}" } else { "\u{25b8}" };
            Line::from(vec![
                Span::styled(format!("     {marker} "), Style::default().fg(Color::Cyan)),
                value(format!("{:?} ", entity.name)),
                label(&format!("{} [{}]", entity.id, entity.state)),
            ])
        }
        TreeRow::Detail {
            type_idx,
            entity_row,
            line_idx,
        } => {
            let text = app
                .entity(type_idx, entity_row)
                .and_then(|e| e.description.lines().nth(line_idx))
                .unwrap_or("");
            Line::from(vec![Span::raw("         "), value(text.to_string())])
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────────

fn draw_events_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(20)])
        .split(area);

    let counts: Vec<Line> = app
        .latest
        .events
        .iter()
        .map(|e| {
            Line::from(vec![
                Span::styled(format!("  {:>8} ", e.count), Style::default().fg(Color::Cyan)),
                value(e.name.clone()),
            ])
        })
        .collect();
    let block = Block::default()
        .title(" Totals ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(counts).block(block), chunks[0]);

    let recent: Vec<Line> = if app.latest.recent_events.is_empty() {
        vec![Line::from(label("  No events yet"))]
    } else {
        app.latest
            .recent_events
            .iter()
            .rev()
            .map(|e| Line::from(value(format!("  {e}"))))
            .collect()
    };
    let block = Block::default()
        .title(" Recent ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(recent).block(block), chunks[1]);
}

// ── Logs ─────────────────────────────────────────────────────────────────

fn draw_logs_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let (d, i, w, e) = app.log_counts();
    let scroll = if app.log_auto_scroll { "auto" } else { "manual" };
    let block = Block::default()
        .title(format!(
            " Logs [{}]  D:{d} I:{i} W:{w} E:{e}  scroll:{scroll} ",
            app.log_filter.label()
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let filtered = app.filtered_logs();
    if filtered.is_empty() {
        f.render_widget(Paragraph::new(label("  No log messages")), inner);
        return;
    }

    let visible = inner.height as usize;
    let max_offset = filtered.len().saturating_sub(visible);
    let offset = if app.log_auto_scroll {
        max_offset
    } else {
        app.log_scroll_offset.min(max_offset)
    };

    let lines: Vec<Line> = filtered
        .iter()
        .skip(offset)
        .take(visible)
        .map(|entry| {
            let color = match entry.level.as_str() {
                "TRACE" => Color::DarkGray,
                "DEBUG" => Color::Gray,
                "INFO" => Color::Cyan,
                "WARN" => Color::Yellow,
                "ERROR" => Color::Red,
                _ => Color::White,
            };
            Line::from(vec![
                label(&format!("  [{:>6.1}s] ", entry.timestamp_secs)),
                Span::styled(
                    format!("{:<5} ", entry.level),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                label(&format!("{} ", entry.target)),
                value(entry.message.clone()),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_help_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let key = |k: &str| Span::styled(k.to_string(), Style::default().fg(Color::Cyan));
    let mut spans = vec![key(" [1-4]"), Span::raw(" tab  "), key("[Tab]"), Span::raw(" next  ")];

    match app.active_tab {
        Tab::Entities => {
            spans.extend([
                key("[\u{2191}\u{2193}]"),
                Span::raw(" navigate  "),
                key("[Enter/\u{2192}]"),
                Span::raw(" expand  "),
                key("[\u{2190}]"),
                Span::raw(" collapse  "),
                key("[Esc]"),
                Span::raw(" collapse all  "),
            ]);
        }
        Tab::Logs => {
            spans.extend([
                key("[l]"),
                Span::raw(" filter  "),
                key("[g]"),
                Span::raw(" auto-scroll  "),
                key("[\u{2191}\u{2193}]"),
                Span::raw(" scroll  "),
            ]);
        }
        Tab::Overview | Tab::Events => {}
    }

    spans.extend([key("[p]"), Span::raw(" pause  "), key("[q]"), Span::raw(" quit")]);
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Min, average, and max of a series; zeros when empty.
fn stats(data: &[u64]) -> (f64, f64, f64) {
    let (Some(min), Some(max)) = (data.iter().min(), data.iter().max()) else {
        return (0.0, 0.0, 0.0);
    };
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (*min as f64, avg, *max as f64)
}

fn format_uptime(secs: f32) -> String {
    let total = secs as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(UdpSocket::bind("127.0.0.1:0").unwrap())
    }

    fn snapshot() -> DiagSnapshot {
        serde_json::from_str(
            r#"{
                "tps": 59.7, "delta_ms": 16.7, "tick_count": 120, "elapsed_secs": 2.0,
                "level_name": "Sector 7", "level_id": "x", "entity_count": 1,
                "client_count": 0,
                "entity_types": [
                    {"name": "Ship", "count": 1, "components": ["CopyData"],
                     "entities": [{"id": "a", "name": "Kestrel", "state": "ready",
                                   "description": "Ship \"Kestrel\"\nposition: (0, 0, 0)"}]},
                    {"name": "Station", "count": 0, "components": []}
                ],
                "events": [{"name": "tick", "count": 120}],
                "recent_events": [],
                "logs": [{"level": "WARN", "target": "kjarni", "message": "late", "timestamp_secs": 1.0}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(5.0), "5.0s");
        assert_eq!(format_uptime(125.0), "2m5s");
        assert_eq!(format_uptime(3725.0), "1h2m5s");
    }

    #[test]
    fn stats_of_empty_and_filled() {
        assert_eq!(stats(&[]), (0.0, 0.0, 0.0));
        assert_eq!(stats(&[2, 4, 6]), (2.0, 4.0, 6.0));
    }

    #[test]
    fn log_filters() {
        assert!(LogFilter::Info.passes("WARN"));
        assert!(!LogFilter::Warn.passes("INFO"));
        assert!(LogFilter::All.passes("TRACE"));
        assert_eq!(LogFilter::Error.next(), LogFilter::All);
    }

    #[test]
    fn tabs_cycle() {
        assert_eq!(Tab::Logs.next(), Tab::Overview);
        assert_eq!(Tab::Overview.prev(), Tab::Logs);
    }

    #[test]
    fn tree_expands_types_then_entities() {
        let mut app = app();
        app.push_snapshot(snapshot());
        assert_eq!(app.logs.len(), 1);
        assert_eq!(app.build_tree_rows().0.len(), 2);

        app.toggle_expand();
        assert!(app.expanded_types.contains("Ship"));
        let (rows, selectable) = app.build_tree_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(selectable, vec![0, 1, 2]);

        app.cursor = 1;
        app.toggle_expand();
        let (rows, selectable) = app.build_tree_rows();
        // Two description lines, neither selectable.
        assert_eq!(rows.len(), 5);
        assert_eq!(selectable, vec![0, 1, 4]);

        app.collapse_or_parent();
        assert!(app.expanded_entities.is_empty());
        app.collapse_or_parent();
        assert_eq!(app.cursor, 0);
    }
}

mod charts;
mod export;
mod help;

use crate::cli::{build_config, Cli};
use crate::orchestrator::{self, AppEvent, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use nightwatch::model::{Role, SessionStatus};
use nightwatch::state::{Tab, ViewState};
use nightwatch::text_summary;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use std::path::{Path, PathBuf};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure between the UI thread and the runtime.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let cfg = build_config(&args);
    // Configuration errors end the run before the terminal is taken over.
    let client = orchestrator::connect(&cfg)?;

    let export_dir = args
        .export_dir
        .clone()
        .unwrap_or_else(nightwatch::export::default_export_dir);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let domain = cfg.domain;
    let ui_handle =
        std::thread::spawn(move || run_threaded(domain, export_dir, event_rx, cmd_tx));

    let res = orchestrator::run_controller(client, &cfg, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// What the key loop should do after a key press.
enum KeyAction {
    Continue,
    Quit,
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    domain: nightwatch::model::Domain,
    export_dir: PathBuf,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // ViewState is owned by the UI thread only; no cross-thread mutation.
    let mut state = ViewState::new(domain);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let KeyAction::Quit = handle_key(&mut state, k, &cmd_tx, &export_dir) {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    res
}

fn apply_event(state: &mut ViewState, ev: AppEvent) {
    match ev {
        AppEvent::Health(h) => state.apply_health(h),
        AppEvent::Scan(update) => {
            state.apply_scan_update(update);
        }
        AppEvent::QueryFinished { domain, result } => {
            state.complete_query(domain, result);
        }
        AppEvent::History(h) => state.apply_history(h),
        AppEvent::HistoryDetail { scan_id, result } => state.apply_history_detail(scan_id, result),
    }
}

fn handle_key(
    state: &mut ViewState,
    k: KeyEvent,
    cmd_tx: &UnboundedSender<UiCommand>,
    export_dir: &Path,
) -> KeyAction {
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);
    match k.code {
        KeyCode::Char('c') if ctrl => return KeyAction::Quit,
        KeyCode::Tab => {
            state.tab = state.tab.next();
            return KeyAction::Continue;
        }
        KeyCode::BackTab => {
            state.tab = state.tab.prev();
            return KeyAction::Continue;
        }
        _ => {}
    }

    if state.tab == Tab::Query {
        match k.code {
            KeyCode::Char('d') if ctrl => state.cycle_domain(),
            KeyCode::Char('e') if ctrl => export::export_query_rows(state, export_dir),
            KeyCode::Char('y') if ctrl => export::copy_last_export(state),
            KeyCode::Char(c) if !ctrl => state.input.push(c),
            KeyCode::Backspace => {
                state.input.pop();
            }
            KeyCode::Esc => state.input.clear(),
            KeyCode::Enter => {
                let text = state.input.clone();
                if let Some(text) = state.submit_query(&text) {
                    let _ = cmd_tx.send(UiCommand::Query {
                        text,
                        domain: state.domain,
                    });
                }
            }
            _ => {}
        }
        return KeyAction::Continue;
    }

    match k.code {
        KeyCode::Char('q') => return KeyAction::Quit,
        KeyCode::Char('?') => state.tab = Tab::Help,
        KeyCode::Char('d') => state.cycle_domain(),
        KeyCode::Char('y') => export::copy_last_export(state),
        KeyCode::Char('s') if state.tab == Tab::Sentinel => {
            state.info = format!("Starting {} scan...", state.domain);
            let _ = cmd_tx.send(UiCommand::StartScan(state.domain));
        }
        KeyCode::Char('x') if state.tab == Tab::Sentinel => {
            if state.scan_running() {
                let _ = cmd_tx.send(UiCommand::CloseScan);
            } else {
                state.info = "No scan running.".into();
            }
        }
        KeyCode::Char('e') if state.tab == Tab::Sentinel => {
            export::export_scan_findings(state, export_dir)
        }
        KeyCode::Char('e') if state.tab == Tab::History => {
            export::export_history_findings(state, export_dir)
        }
        KeyCode::Char('r') if state.tab == Tab::History => {
            state.info = "Refreshing history...".into();
            let _ = cmd_tx.send(UiCommand::RefreshHistory);
        }
        KeyCode::Char('r') => {
            state.health = None;
            let _ = cmd_tx.send(UiCommand::RefreshHealth);
        }
        KeyCode::Up | KeyCode::Char('k') if state.tab == Tab::History => {
            state.select_prev_history()
        }
        KeyCode::Down | KeyCode::Char('j') if state.tab == Tab::History => {
            state.select_next_history()
        }
        KeyCode::Enter if state.tab == Tab::History => {
            if let Some(entry) = state.selected_history() {
                let _ = cmd_tx.send(UiCommand::LoadScan(entry.scan_id.clone()));
            }
        }
        _ => {}
    }
    KeyAction::Continue
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let health_color = match &state.health {
        None => Color::Gray,
        Some(h) if h.online => Color::Green,
        Some(_) => Color::Red,
    };
    let title = Line::from(vec![
        Span::raw("nightwatch | "),
        Span::styled(state.health_label(), Style::default().fg(health_color)),
        Span::raw(format!(" | domain: {}", state.domain)),
    ]);
    let tabs = Tabs::new(Tab::ALL.iter().map(|t| Line::from(t.title())).collect::<Vec<_>>())
        .select(Tab::ALL.iter().position(|t| *t == state.tab).unwrap_or(0))
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        Tab::Query => draw_query(chunks[1], f, state),
        Tab::Sentinel => draw_sentinel(chunks[1], f, state),
        Tab::History => draw_history(chunks[1], f, state),
        Tab::Help => help::draw_help(chunks[1], f),
    }

    let footer = Paragraph::new(Line::from(vec![
        Span::styled("Info: ", Style::default().fg(Color::Gray)),
        Span::raw(state.info.as_str()),
    ]))
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, chunks[2]);
}

fn draw_query(area: Rect, f: &mut ratatui::Frame, state: &ViewState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(cols[0]);

    let mut lines: Vec<Line> = Vec::new();
    for m in state.messages() {
        let (who, color) = match m.role {
            Role::User => ("You", Color::Cyan),
            Role::Assistant => ("Nightwatch", Color::Green),
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{who}: "), Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::raw(m.text.as_str()),
        ]));
        if let Some(sql) = m.sql() {
            lines.push(Line::from(Span::styled(
                format!("  SQL: {sql}"),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    if state.query_busy {
        lines.push(Line::from(Span::styled("Thinking...", Style::default().fg(Color::Gray))));
    }
    // Keep the newest messages in view.
    let visible = usize::from(left[0].height.saturating_sub(2));
    let skip = lines.len().saturating_sub(visible);
    let chat = Paragraph::new(lines.into_iter().skip(skip).collect::<Vec<_>>())
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Chat"));
    f.render_widget(chat, left[0]);

    let input_title = if state.query_busy {
        "Ask (waiting for answer)"
    } else {
        "Ask (enter to send, Ctrl-D domain, Ctrl-E export)"
    };
    let input = Paragraph::new(Line::from(vec![
        Span::raw(state.input.as_str()),
        Span::styled("_", Style::default().fg(Color::Gray)),
    ]))
    .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input, left[1]);

    let insights_height = state
        .last_query
        .as_ref()
        .map(|q| q.insights.len() as u16)
        .filter(|n| *n > 0)
        .map(|n| n.min(6) + 2)
        .unwrap_or(0);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage(40),
                Constraint::Length(insights_height),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(cols[1]);
    charts::draw_render_spec(f, right[0], state.render.as_ref());

    if let Some(q) = state.last_query.as_ref() {
        if insights_height > 0 {
            let items: Vec<Line> = q.insights.iter().map(|i| Line::from(format!("* {i}"))).collect();
            let p = Paragraph::new(items)
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title("Insights"));
            f.render_widget(p, right[1]);
        }
        charts::draw_records_table(f, right[2], &q.rows, "Rows");
    } else {
        charts::draw_records_table(f, right[2], &[], "Rows");
    }
}

fn draw_sentinel(area: Rect, f: &mut ratatui::Frame, state: &ViewState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(rows[1]);

    let scan = state.scan.as_ref();
    charts::draw_risk_gauge(
        f,
        rows[0],
        scan.and_then(|s| s.result.as_ref()).map(|r| r.risk_score),
    );

    let (title, status_color) = match scan {
        None => ("Events (press s to start a scan)".to_string(), Color::Gray),
        Some(s) => {
            let color = match s.status {
                SessionStatus::Pending => Color::Gray,
                SessionStatus::Streaming => Color::Yellow,
                SessionStatus::Completed => Color::Green,
                SessionStatus::Failed => Color::Red,
            };
            let status = match s.status {
                SessionStatus::Pending => "pending",
                SessionStatus::Streaming => "streaming",
                SessionStatus::Completed => "completed",
                SessionStatus::Failed => "failed",
            };
            (format!("Scan #{} ({}) {status}", s.id, s.domain), color)
        }
    };
    let mut items: Vec<ListItem> = scan
        .map(|s| {
            s.events
                .iter()
                .map(|e| ListItem::new(text_summary::scan_event_line(e)))
                .collect()
        })
        .unwrap_or_default();
    if let Some(reason) = scan.and_then(|s| s.failure.as_deref()) {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("failed: {reason}"),
            Style::default().fg(Color::Red),
        ))));
    }
    // Newest events at the bottom stay visible.
    let visible = usize::from(cols[0].height.saturating_sub(2));
    let skip = items.len().saturating_sub(visible);
    let list = List::new(items.into_iter().skip(skip).collect::<Vec<_>>()).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(title, Style::default().fg(status_color))),
    );
    f.render_widget(list, cols[0]);

    let result = scan.and_then(|s| s.result.as_ref());
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(35), Constraint::Min(0)].as_ref())
        .split(cols[1]);
    let narrative = result
        .map(|r| r.narrative.as_str())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("No narrative yet.");
    let p = Paragraph::new(narrative)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Narrative"));
    f.render_widget(p, right[0]);
    charts::draw_records_table(
        f,
        right[1],
        result.map(|r| r.findings.as_slice()).unwrap_or_default(),
        "Findings",
    );
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &ViewState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(area);

    let items: Vec<ListItem> = text_summary::history_lines(&state.history)
        .into_iter()
        .map(ListItem::new)
        .collect();
    let mut list_state = ListState::default();
    if !state.history.is_empty() {
        list_state.select(Some(state.history_selected));
    }
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Past scans ({})", state.history.len())),
        )
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow));
    f.render_stateful_widget(list, cols[0], &mut list_state);

    match state.history_detail.as_ref() {
        Some((scan_id, detail)) => {
            let right = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Percentage(30), Constraint::Min(0)].as_ref())
                .split(cols[1]);
            charts::draw_risk_gauge(f, right[0], Some(detail.risk_score));
            let p = Paragraph::new(detail.narrative.as_str())
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title(format!("Scan {scan_id}")));
            f.render_widget(p, right[1]);
            charts::draw_records_table(f, right[2], &detail.findings, "Findings");
        }
        None => {
            let p = Paragraph::new("Select a scan and press enter to load it.")
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().borders(Borders::ALL).title("Details"));
            f.render_widget(p, cols[1]);
        }
    }
}

//! Terminal dashboard for the listener

use crate::metrics::{truncate_id, LogLevel, Metrics};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use metmusic_core::drift::expected_position_secs;
use metmusic_core::notify::{format_start_time, format_time};
use metmusic_core::player::PlayerHandle;
use metmusic_core::{current_time_ms, ConnectionState, PlayerStatus, SyncPhase};
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

/// Dashboard state for scrolling etc.
struct DashboardState {
    /// Log scroll position (0 = most recent at bottom)
    log_scroll: usize,
    /// Whether auto-scroll is enabled (follows new logs)
    auto_scroll: bool,
    /// Log count at the last frame
    seen_logs: usize,
}

/// Run the dashboard until the user quits
pub async fn run(
    metrics: Arc<RwLock<Metrics>>,
    player: PlayerHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = DashboardState {
        log_scroll: 0,
        auto_scroll: true,
        seen_logs: 0,
    };

    // Main loop
    let tick_rate = Duration::from_millis(100);
    let mut should_quit = false;

    while !should_quit {
        {
            let mut m = metrics.write();
            m.snapshot = player.status();

            // New entries came in, scroll to bottom if auto-scroll enabled
            if m.logs.len() != state.seen_logs {
                state.seen_logs = m.logs.len();
                if state.auto_scroll {
                    state.log_scroll = 0;
                }
            }
        }

        // Draw
        terminal.draw(|f| draw(f, &metrics, &state))?;

        // Handle input
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let log_count = metrics.read().logs.len();
                    let volume = metrics.read().volume;

                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => should_quit = true,
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            should_quit = true
                        }
                        // Volume
                        KeyCode::Char('+') | KeyCode::Char('=') => player.set_volume(volume + 0.1),
                        KeyCode::Char('-') => player.set_volume(volume - 0.1),
                        // Scroll up (older logs)
                        KeyCode::Up | KeyCode::Char('k') => {
                            if log_count > 0 {
                                state.log_scroll = (state.log_scroll + 1).min(log_count.saturating_sub(1));
                                state.auto_scroll = false;
                            }
                        }
                        // Scroll down (newer logs)
                        KeyCode::Down | KeyCode::Char('j') => {
                            if state.log_scroll > 0 {
                                state.log_scroll -= 1;
                            }
                            if state.log_scroll == 0 {
                                state.auto_scroll = true;
                            }
                        }
                        KeyCode::PageUp => {
                            if log_count > 0 {
                                state.log_scroll = (state.log_scroll + 10).min(log_count.saturating_sub(1));
                                state.auto_scroll = false;
                            }
                        }
                        KeyCode::PageDown => {
                            state.log_scroll = state.log_scroll.saturating_sub(10);
                            if state.log_scroll == 0 {
                                state.auto_scroll = true;
                            }
                        }
                        // Home - oldest logs
                        KeyCode::Home => {
                            if log_count > 0 {
                                state.log_scroll = log_count.saturating_sub(1);
                                state.auto_scroll = false;
                            }
                        }
                        // End - newest logs (enable auto-scroll)
                        KeyCode::End => {
                            state.log_scroll = 0;
                            state.auto_scroll = true;
                        }
                        KeyCode::Char('a') => {
                            state.auto_scroll = !state.auto_scroll;
                            if state.auto_scroll {
                                state.log_scroll = 0;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

/// Draw the dashboard
fn draw(f: &mut Frame, metrics: &Arc<RwLock<Metrics>>, state: &DashboardState) {
    let m = metrics.read();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(7), // Stats
            Constraint::Min(8),    // Logs
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], &m);
    draw_stats(f, chunks[1], &m);
    draw_logs(f, chunks[2], &m, state);
    draw_footer(f, chunks[3], state);
}

fn status_style(status: Option<PlayerStatus>) -> Style {
    match status {
        Some(PlayerStatus::Playing) => Style::default().fg(Color::Green),
        Some(PlayerStatus::ConnectionError)
        | Some(PlayerStatus::LinkFetchFailed)
        | Some(PlayerStatus::PlaybackBlocked) => Style::default().fg(Color::Red),
        Some(PlayerStatus::Paused) | Some(PlayerStatus::Ended) => Style::default().fg(Color::Gray),
        _ => Style::default().fg(Color::Yellow),
    }
}

fn draw_header(f: &mut Frame, area: Rect, m: &Metrics) {
    let status_text = m
        .status
        .map(|s| s.message())
        .unwrap_or_else(|| "Starting...".to_string());

    let title = vec![Line::from(vec![
        Span::styled("MeTMusic Listener", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  Status: "),
        Span::styled(status_text, status_style(m.status)),
        Span::raw("  │  Uptime: "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
    ])];

    let header = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "));

    f.render_widget(header, area);
}

fn draw_stats(f: &mut Frame, area: Rect, m: &Metrics) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
        ])
        .split(area);

    // Session
    let (conn_text, conn_color) = match m.connection {
        ConnectionState::Connected => ("connected", Color::Green),
        ConnectionState::Connecting => ("connecting", Color::Yellow),
        ConnectionState::Disconnected => ("disconnected", Color::Red),
    };

    let session_info = vec![
        Line::from(vec![
            Span::raw("Session: "),
            Span::styled(truncate_id(&m.session_id), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Feed: "),
            Span::styled(conn_text, Style::default().fg(conn_color)),
        ]),
        Line::from(vec![
            Span::raw("Reconnects: "),
            Span::styled(m.reconnects.to_string(), Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![
            Span::raw("Volume: "),
            Span::styled(format!("{:.0}%", m.volume * 100.0), Style::default().fg(Color::Cyan)),
        ]),
    ];

    let session_block = Paragraph::new(session_info)
        .block(Block::default().borders(Borders::ALL).title(" Session "));
    f.render_widget(session_block, chunks[0]);

    // Track
    let track_info = match &m.track {
        Some(track) => {
            let elapsed = expected_position_secs(track.start_ms, current_time_ms());
            vec![
                Line::from(vec![
                    Span::styled(&track.title, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
                ]),
                Line::from(vec![
                    Span::styled(&track.artist, Style::default().fg(Color::Cyan)),
                    Span::raw(" · "),
                    Span::styled(&track.album, Style::default().fg(Color::Gray)),
                ]),
                Line::from(vec![
                    Span::raw("Started: "),
                    Span::styled(format_start_time(track.start_ms), Style::default().fg(Color::Yellow)),
                ]),
                Line::from(vec![
                    Span::raw("Timeline: "),
                    Span::styled(format_time(elapsed), Style::default().fg(Color::Green)),
                    Span::raw(format!("  ({})", truncate_id(&track.track_id))),
                ]),
            ]
        }
        None => vec![Line::from(Span::styled("-", Style::default().fg(Color::DarkGray)))],
    };

    let track_block = Paragraph::new(track_info)
        .block(Block::default().borders(Borders::ALL).title(" Now Playing "));
    f.render_widget(track_block, chunks[1]);

    // Sync
    let s = &m.snapshot;
    let phase = match s.phase {
        SyncPhase::Idle => "idle",
        SyncPhase::Preparing => "preparing",
        SyncPhase::Playing => "playing",
        SyncPhase::Paused => "paused",
    };

    let sync_info = vec![
        Line::from(vec![
            Span::raw("Phase: "),
            Span::styled(phase, Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Load avg: "),
            Span::styled(format!("{:.0}ms", s.average_loading_ms), Style::default().fg(Color::Cyan)),
            Span::raw(format!(" (lead {:.0}ms)", s.preload_lead_ms)),
        ]),
        Line::from(vec![
            Span::raw("Drift fixes: "),
            Span::styled(m.drift_corrections.to_string(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Cached: "),
            Span::styled(s.cached_tracks.to_string(), Style::default().fg(Color::White)),
            Span::raw(format!("  Loaded: {}", m.tracks_loaded)),
        ]),
    ];

    let sync_block = Paragraph::new(sync_info)
        .block(Block::default().borders(Borders::ALL).title(" Sync "));
    f.render_widget(sync_block, chunks[2]);
}

fn draw_logs(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total_logs = m.logs.len();

    let log_items: Vec<ListItem> = m
        .logs
        .iter()
        .rev()
        .skip(state.log_scroll)
        .take(visible_height)
        .map(|entry| {
            let level_style = match entry.level {
                LogLevel::Info => Style::default().fg(Color::Blue),
                LogLevel::Warning => Style::default().fg(Color::Yellow),
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Connection => Style::default().fg(Color::Green),
                LogLevel::Track => Style::default().fg(Color::Magenta),
            };

            let time = entry.timestamp.format("%H:%M:%S").to_string();

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("[{}] ", entry.level.as_str()), level_style),
                Span::raw(&entry.message),
            ]))
        })
        .collect();

    // Title with scroll indicator
    let scroll_indicator = if state.auto_scroll {
        " [AUTO] ".to_string()
    } else if total_logs > 0 {
        format!(" [{}/{}] ", total_logs - state.log_scroll, total_logs)
    } else {
        String::new()
    };

    let logs = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Activity Log{}", scroll_indicator)),
    );

    f.render_widget(logs, area);

    if total_logs > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));

        let mut scrollbar_state = ScrollbarState::new(total_logs)
            .position(total_logs.saturating_sub(state.log_scroll + visible_height));

        f.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin { vertical: 1, horizontal: 0 }),
            &mut scrollbar_state,
        );
    }
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let auto_text = if state.auto_scroll { "ON " } else { "OFF" };
    let auto_color = if state.auto_scroll { Color::Green } else { Color::Yellow };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Q ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Quit  "),
        Span::styled(" +/- ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Volume  "),
        Span::styled(" ↑↓ ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Scroll  "),
        Span::styled(" PgUp/Dn ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Page  "),
        Span::styled(" A ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Auto-scroll: "),
        Span::styled(auto_text, Style::default().fg(auto_color)),
    ]));

    f.render_widget(footer, area);
}

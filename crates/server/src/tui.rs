use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Row, Table, TableState};

use rift::{ConnectionId, InputId, SnapshotId, UniqueId};

use crate::engine::ServerStats;

const MAX_LOG_LINES: usize = 200;

/// One connected client as shown on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub client_id: ConnectionId,
    pub entity: UniqueId,
    pub acked_snapshot: SnapshotId,
    pub applied_input: InputId,
    pub snapshots_sent: u64,
    pub full_updates_sent: u64,
    pub last_snapshot_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default)]
pub struct TuiState {
    logs: VecDeque<(LogLevel, String)>,
    selected: usize,
    pending_kick: Option<ConnectionId>,
}

impl TuiState {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.logs.len() == MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back((level, message));
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Error, message.into());
    }

    pub fn logs(&self) -> impl Iterator<Item = &(LogLevel, String)> {
        self.logs.iter()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select_prev(&mut self, client_count: usize) {
        if client_count == 0 {
            self.selected = 0;
        } else {
            self.selected = self.selected.checked_sub(1).unwrap_or(client_count - 1);
        }
    }

    pub fn select_next(&mut self, client_count: usize) {
        if client_count == 0 {
            self.selected = 0;
        } else {
            self.selected = (self.selected + 1) % client_count;
        }
    }

    pub fn request_kick(&mut self, clients: &[ClientInfo]) {
        if let Some(client) = clients.get(self.selected) {
            self.pending_kick = Some(client.client_id);
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<ConnectionId> {
        self.pending_kick.take()
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, stats: &ServerStats, clients: &[ClientInfo]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(6),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_clients(frame, chunks[3], state, clients);
    render_log(frame, chunks[4], state);
    render_help(frame, chunks[5]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Rift Server ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Match: {}  |  Entities: {}  |  Projectiles: {}  |  Snapshots: {} ({}..={})",
        stats.tick,
        stats.phase.as_str(),
        stats.entity_count,
        stats.projectile_count,
        stats.retained_snapshots,
        stats.oldest_snapshot,
        stats.latest_snapshot,
    );
    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Clients ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let ratio = if stats.max_clients == 0 {
        0.0
    } else {
        stats.client_count as f64 / stats.max_clients as f64
    };
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} clients", stats.client_count, stats.max_clients));
    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.network;
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));
    let value = |text: String| Span::styled(text, Style::default().fg(Color::White));
    let rejected = stats.crc_rejects + stats.decode_errors;
    let lines = vec![
        Line::from(vec![
            label("Packets: "),
            value(format!("{} sent / {} recv", net.packets_sent, net.packets_received)),
        ]),
        Line::from(vec![
            label("Bytes: "),
            value(format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            )),
        ]),
        Line::from(vec![
            label("Simulated drops: "),
            value(net.packets_dropped.to_string()),
            label("  Resends: "),
            value(net.reliable_resends.to_string()),
        ]),
        Line::from(vec![
            label("Rejected: "),
            Span::styled(
                format!("{} crc / {} malformed", stats.crc_rejects, stats.decode_errors),
                Style::default().fg(if rejected > 0 { Color::Red } else { Color::White }),
            ),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_clients(frame: &mut Frame, area: Rect, state: &TuiState, clients: &[ClientInfo]) {
    let block = Block::default()
        .title(" Connections ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let header = Row::new(["Client", "Hero", "Acked", "Input", "Sent", "Full", "Last"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let rows = clients.iter().map(|c| {
        Row::new([
            c.client_id.to_string(),
            c.entity.to_string(),
            c.acked_snapshot.to_string(),
            c.applied_input.to_string(),
            c.snapshots_sent.to_string(),
            c.full_updates_sent.to_string(),
            format_bytes(c.last_snapshot_bytes as u64),
        ])
    });
    let widths = [Constraint::Length(8); 7];
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut table_state = TableState::default();
    if !clients.is_empty() {
        table_state.select(Some(state.selected().min(clients.len() - 1)));
    }
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Log ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let skip = state.logs.len().saturating_sub(visible);
    let items: Vec<ListItem> = state
        .logs()
        .skip(skip)
        .map(|(level, message)| {
            let color = match level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            ListItem::new(message.as_str()).style(Style::default().fg(color))
        })
        .collect();
    frame.render_widget(List::new(items).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("q/Esc quit  |  Up/Down select client  |  k kick selected")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );
    frame.render_widget(text, area);
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

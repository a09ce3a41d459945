use proxy_console::snapshot::SnapshotState;
use proxy_console::{ConnectionState, DashboardView, Record};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Stylize},
    text::{Line, Span},
    widgets::{Paragraph, TableState, Wrap},
    Frame,
};

use crate::cmd::console::state::Focus;
use crate::cmd::console::widgets::formatters::{format_count, level_color};

use super::inspect::render_inspect_popup;
use super::logs::{render_logs_panel, render_logs_placeholder};
use super::metrics::render_metrics_panel;

fn connection_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Open => Color::Green,
        ConnectionState::Connecting | ConnectionState::Reconnecting => Color::Yellow,
        ConnectionState::Failed => Color::Red,
        ConnectionState::Idle => Color::DarkGray,
    }
}

fn status_line(view: &DashboardView) -> Line<'static> {
    let mut spans = vec![
        Span::raw(" ● ").fg(connection_color(view.connection)),
        Span::raw(view.connection_label()).fg(connection_color(view.connection)),
        Span::raw(" | level ≤ "),
        Span::raw(view.filter.level_threshold.as_str()).fg(level_color(view.filter.level_threshold)),
    ];
    if let Some(search) = view.filter.search() {
        spans.push(Span::raw(" | search "));
        spans.push(Span::raw(format!("\"{search}\"")).yellow());
    }
    if !view.filter.streaming_enabled {
        spans.push(Span::raw(" | streaming off").dark_gray());
    }
    if view.paused {
        spans.push(Span::raw(" | ⏸ PAUSED").yellow().bold());
    }
    if view.pending_changes {
        spans.push(Span::raw(" | pending").dark_gray());
    }
    spans.push(Span::raw(format!(
        " | {} shown, {}/{} buffered",
        view.records.len(),
        view.buffer.len,
        view.buffer.capacity
    )));
    if view.buffer.evicted > 0 {
        spans.push(Span::raw(format!(", {} evicted", format_count(view.buffer.evicted))));
    }
    if view.buffer.dropped_while_paused > 0 {
        spans.push(
            Span::raw(format!(
                ", {} dropped while paused",
                format_count(view.buffer.dropped_while_paused)
            ))
            .yellow(),
        );
    }
    if let Some(info) = &view.server_buffer {
        spans.push(Span::raw(format!(" | server {:.1}%", info.usage_percent)).dark_gray());
    }
    if let Some(page) = &view.page {
        spans.push(Span::raw(format!(" | page {}/{}", page.page, page.total_pages)).dark_gray());
    }
    Line::from(spans)
}

fn empty_message(view: &DashboardView) -> &'static str {
    if view.snapshot == SnapshotState::Pending {
        "(loading history)"
    } else if view.connection == ConnectionState::Failed {
        "(stream unavailable, press r to reconnect)"
    } else if view.paused {
        "(paused)"
    } else if view.buffer.len > 0 {
        "(no records match the filter)"
    } else {
        "(waiting for records)"
    }
}

/// Renders the status line, notices, the logs table and the optional metrics panel
#[allow(clippy::too_many_arguments)]
pub fn render_main_view(
    frame: &mut Frame,
    area: Rect,
    view: &DashboardView,
    table_state: &mut TableState,
    focus: Focus,
    show_metrics: bool,
    follow: bool,
    inspected: Option<&Record>,
) {
    let mut notices: Vec<Line> = Vec::new();
    if let Some(failure) = &view.failure {
        notices.push(Line::from(format!(" ✖ {failure} (press r to reconnect)")).red().bold());
    }
    if let Some(banner) = &view.banner {
        notices.push(Line::from(format!(" ⚠ {} (press x to dismiss)", banner.message)).red());
    }
    if let SnapshotState::Failed { reason } = &view.snapshot {
        notices.push(Line::from(format!(" history unavailable: {reason}")).dark_gray());
    }

    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(notices.len() as u16),
        Constraint::Min(3),
    ])
    .split(area);

    frame.render_widget(Paragraph::new(status_line(view)), chunks[0]);
    if !notices.is_empty() {
        frame.render_widget(Paragraph::new(notices).wrap(Wrap { trim: true }), chunks[1]);
    }

    // Split the area if metrics are being shown
    let (logs_area, metrics_area) = if show_metrics {
        let split = Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)])
            .split(chunks[2]);
        (split[0], Some(split[1]))
    } else {
        (chunks[2], None)
    };

    let title = if follow {
        "Logs [follow]".to_string()
    } else {
        let position = table_state.selected().map(|i| i + 1).unwrap_or(0);
        format!("Logs [{}/{}]", position, view.records.len())
    };

    if view.records.is_empty() {
        render_logs_placeholder(&title, empty_message(view), logs_area, frame);
    } else {
        let search = view.filter.search();
        render_logs_panel(
            &view.records,
            &title,
            search.as_deref(),
            logs_area,
            frame,
            table_state,
            focus != Focus::Metrics,
        );
    }

    if let Some(metrics_area) = metrics_area {
        render_metrics_panel(&view.metrics, metrics_area, frame, focus == Focus::Metrics);
    }

    if focus == Focus::Inspect {
        if let Some(record) = inspected {
            render_inspect_popup(record, area, frame);
        }
    }
}


use crate::cmd::console::widgets::formatters::{
    format_timestamp, highlight_spans, level_style, truncate_message,
};
use proxy_console::Record;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Cell, HighlightSpacing, Row, Table, TableState},
    Frame,
};

/// Renders a placeholder when no records are visible
pub(crate) fn render_logs_placeholder(title: &str, message: &str, area: Rect, frame: &mut Frame) {
    let block = Block::bordered()
        .title(format!(" {} ", title))
        .border_set(border::THICK);

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let message_width = message.chars().count() as u16;
    let x = inner_area.x + (inner_area.width.saturating_sub(message_width)) / 2;
    let y = inner_area.y + inner_area.height / 2;

    if x < inner_area.x + inner_area.width && y < inner_area.y + inner_area.height {
        frame
            .buffer_mut()
            .set_string(x, y, message, Style::default().fg(Color::DarkGray));
    }
}

/// Renders the visible log records, oldest first
pub(crate) fn render_logs_panel(
    records: &[Record],
    title: &str,
    search: Option<&str>,
    area: Rect,
    frame: &mut Frame,
    table_state: &mut TableState,
    is_focused: bool,
) {
    let border_set = if is_focused {
        border::THICK
    } else {
        border::PLAIN
    };

    let block = Block::bordered()
        .title(format!(" {} ", title))
        .border_set(border_set)
        .style(if is_focused {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        });

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let available_width = inner_area.width.saturating_sub(2);
    let msg_width = (available_width.saturating_sub(40) as usize).max(20);

    let header_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    let header = Row::new(vec!["#", "Time", "Level", "PID", "Message"])
        .style(header_style)
        .height(1);

    let rows: Vec<Row> = records
        .iter()
        .map(|record| {
            let message = truncate_message(&record.message, msg_width);
            let pid = record.pid.map(|p| p.to_string()).unwrap_or_default();

            Row::new(vec![
                Cell::from(record.id.0.to_string()),
                Cell::from(format_timestamp(&record.timestamp)),
                Cell::from(record.level.as_str()).style(level_style(record.level)),
                Cell::from(pid),
                Cell::from(Line::from(highlight_spans(&message, search, Style::default()))),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(6),
        Constraint::Length(12), // HH:MM:SS.mmm
        Constraint::Length(8),
        Constraint::Length(7),
        Constraint::Min(20),
    ];

    let selected_row_style = Style::default()
        .add_modifier(Modifier::REVERSED)
        .bg(Color::DarkGray);

    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(selected_row_style)
        .highlight_symbol(Text::from(">"))
        .highlight_spacing(HighlightSpacing::Always);

    frame.render_stateful_widget(table, inner_area, table_state);
}

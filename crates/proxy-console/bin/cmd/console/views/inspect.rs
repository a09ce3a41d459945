use proxy_console::Record;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Clear, Paragraph, Wrap},
    Frame,
};

use crate::cmd::console::widgets::formatters::level_style;

/// Renders a centered popup displaying the full record
pub(crate) fn render_inspect_popup(record: &Record, area: Rect, frame: &mut Frame) {
    // Center the popup at 80% of screen size
    let popup_width = (area.width as f32 * 0.8) as u16;
    let popup_height = (area.height as f32 * 0.8) as u16;
    let x = (area.width.saturating_sub(popup_width)) / 2;
    let y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect {
        x: area.x + x,
        y: area.y + y,
        width: popup_width,
        height: popup_height,
    };

    // Clear the area to create a complete overlay
    frame.render_widget(Clear, popup_area);

    let block = Block::bordered()
        .title(format!(" Log Record {} ", record.id))
        .border_set(border::DOUBLE);

    let label = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Time:    ", label),
            Span::raw(record.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        ]),
        Line::from(vec![
            Span::styled("Level:   ", label),
            Span::styled(record.level.as_str(), level_style(record.level)),
            Span::raw(format!(" (priority {})", record.level.priority())),
        ]),
        Line::from(vec![
            Span::styled("PID:     ", label),
            Span::raw(
                record
                    .pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]),
        Line::from(""),
    ];
    lines.extend(record.message.lines().map(|line| Line::from(line.to_string())));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, popup_area);
}

use chrono::NaiveDateTime;
use proxy_console::Level;
use ratatui::{
    style::{Color, Modifier, Style},
    text::Span,
};
use regex::RegexBuilder;

use crate::cmd::palette::level_rgb;

pub(crate) fn level_color(level: Level) -> Color {
    let (r, g, b) = level_rgb(level);
    Color::Rgb(r, g, b)
}

pub(crate) fn level_style(level: Level) -> Style {
    let style = Style::default().fg(level_color(level));
    if level <= Level::Error {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

/// Pads or cuts `msg` to exactly `max_len` characters.
pub(crate) fn truncate_message(msg: &str, max_len: usize) -> String {
    let len = msg.chars().count();
    if len <= max_len {
        format!("{:<width$}", msg, width = max_len)
    } else {
        let truncated: String = msg.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Formats a record timestamp as HH:MM:SS.mmm
pub(crate) fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%H:%M:%S%.3f").to_string()
}

/// Formats a count as 999, 1.2k, 3.4M
pub(crate) fn format_count(count: u64) -> String {
    if count < 1_000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{:.1}k", count as f64 / 1_000.0)
    } else {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    }
}

/// Splits `text` into spans, highlighting every case-insensitive occurrence
/// of `needle`.
pub(crate) fn highlight_spans(text: &str, needle: Option<&str>, base: Style) -> Vec<Span<'static>> {
    let Some(needle) = needle.filter(|n| !n.is_empty()) else {
        return vec![Span::styled(text.to_string(), base)];
    };
    let Ok(pattern) = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
    else {
        return vec![Span::styled(text.to_string(), base)];
    };

    let highlight = base.fg(Color::Black).bg(Color::Yellow);
    let mut spans = Vec::new();
    let mut last = 0;
    for found in pattern.find_iter(text) {
        if found.start() > last {
            spans.push(Span::styled(text[last..found.start()].to_string(), base));
        }
        spans.push(Span::styled(found.as_str().to_string(), highlight));
        last = found.end();
    }
    if last < text.len() {
        spans.push(Span::styled(text[last..].to_string(), base));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_is_char_safe() {
        assert_eq!(truncate_message("abc", 5), "abc  ");
        assert_eq!(truncate_message("żółć gęś jaźń", 8), "żółć ...");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_240), "1.2k");
        assert_eq!(format_count(3_400_000), "3.4M");
    }

    #[test]
    fn test_highlight_spans_case_insensitive() {
        let spans = highlight_spans("Connection DENIED by denied-list", Some("denied"), Style::default());
        let texts: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(texts, ["Connection ", "DENIED", " by ", "denied", "-list"]);
    }

    #[test]
    fn test_highlight_spans_without_needle() {
        let spans = highlight_spans("plain", None, Style::default());
        assert_eq!(spans.len(), 1);
        let spans = highlight_spans("a.b", Some("."), Style::default());
        assert_eq!(spans.len(), 3);
    }
}

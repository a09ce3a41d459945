use ratatui::{style::Stylize, text::Line};

use crate::cmd::console::state::{Focus, InputMode};

/// Context-aware keybindings shown in the bottom border
pub(crate) fn controls_line(focus: Focus, input_mode: &InputMode) -> Line<'static> {
    if let InputMode::Search(draft) = input_mode {
        return Line::from(vec![
            " Search: ".into(),
            format!("{draft}▏").yellow(),
            " | Apply ".into(),
            "<enter> ".blue().bold(),
            " | Cancel ".into(),
            "<esc> ".blue().bold(),
        ]);
    }

    match focus {
        Focus::Logs => Line::from(vec![
            " Quit ".into(),
            "<q> ".blue().bold(),
            " | Navigate ".into(),
            "<↑↓/jk/G> ".blue().bold(),
            " | Level ".into(),
            "<l/L> ".blue().bold(),
            " | Search ".into(),
            "</> ".blue().bold(),
            " | Pause ".into(),
            "<p> ".blue().bold(),
            " | Stream ".into(),
            "<s> ".blue().bold(),
            " | Inspect ".into(),
            "<i> ".blue().bold(),
            " | Metrics ".into(),
            "<m> ".blue().bold(),
        ]),
        Focus::Metrics => Line::from(vec![
            " Quit ".into(),
            "<q> ".blue().bold(),
            " | Look-back ".into(),
            "<w> ".blue().bold(),
            " | Logs ".into(),
            "<h/←> ".blue().bold(),
            " | Hide ".into(),
            "<m> ".blue().bold(),
            " | Reconnect ".into(),
            "<r> ".blue().bold(),
        ]),
        Focus::Inspect => Line::from(vec![
            " Quit ".into(),
            "<q> ".blue().bold(),
            " | Navigate ".into(),
            "<↑↓/jk> ".blue().bold(),
            " | Close ".into(),
            "<i/esc> ".blue().bold(),
        ]),
    }
}

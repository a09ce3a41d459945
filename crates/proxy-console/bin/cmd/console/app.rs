use clap::Args;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use eyre::Result;
use proxy_console::logging::{self, LogTarget};
use proxy_console::{spawn_session, DashboardView, FilterState, Record, SessionHandle, UserCommand};
use ratatui::{
    style::Stylize,
    symbols::border,
    text::Line,
    widgets::{Block, TableState},
    DefaultTerminal, Frame,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use super::state::{Focus, InputMode};
use super::views::bottom_bar::controls_line;
use super::views::main_view::render_main_view;
use crate::cmd::connect::ConnectArgs;

#[derive(Debug, Args)]
pub struct ConsoleArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Diagnostics log file (defaults to proxy-console.log in the temp dir)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub(crate) struct App {
    handle: SessionHandle,
    view: Arc<DashboardView>,
    exit: bool,
    last_render_duration: Duration,
    table_state: TableState,
    follow: bool,
    focus: Focus,
    show_metrics: bool,
    input_mode: InputMode,
    inspected: Option<Record>,
}

impl ConsoleArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.connect.config()?;
        let target = self
            .log_file
            .clone()
            .map(LogTarget::File)
            .unwrap_or_else(LogTarget::default_file);
        logging::init(&target, self.connect.verbose)?;

        let handle = spawn_session(config)?;
        let mut app = App {
            view: handle.view(),
            handle,
            exit: false,
            last_render_duration: Duration::from_millis(0),
            table_state: TableState::default(),
            follow: true,
            focus: Focus::Logs,
            show_metrics: false,
            input_mode: InputMode::Normal,
            inspected: None,
        };

        let mut terminal = ratatui::init();
        let app_result = app.run(&mut terminal);
        ratatui::restore();
        app.handle.shutdown();
        app_result.map_err(|e| eyre::eyre!("TUI error: {}", e))
    }
}

impl App {
    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> io::Result<()> {
        while !self.exit {
            self.refresh_view();

            let render_start = Instant::now();
            terminal.draw(|frame| self.draw(frame))?;
            self.last_render_duration = render_start.elapsed();

            self.handle_events()?;
        }
        Ok(())
    }

    /// Picks up the latest published view and keeps the selection on the same record.
    fn refresh_view(&mut self) {
        let view = self.handle.view();
        if view.revision == self.view.revision {
            return;
        }
        let selected = reanchor(
            &self.view.records,
            self.table_state.selected(),
            &view.records,
            self.follow,
        );
        self.view = view;
        self.table_state.select(selected);
    }

    fn draw(&mut self, frame: &mut Frame) {
        self.render_ui(frame);
    }

    fn handle_events(&mut self) -> io::Result<()> {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press {
                    self.handle_key_event(key_event);
                }
            }
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        if let InputMode::Search(draft) = &mut self.input_mode {
            match key_event.code {
                KeyCode::Enter => {
                    let search_text = draft.trim().to_string();
                    self.input_mode = InputMode::Normal;
                    self.update_filter(|filter| filter.search_text = search_text);
                }
                KeyCode::Esc => self.input_mode = InputMode::Normal,
                KeyCode::Backspace => {
                    draft.pop();
                }
                KeyCode::Char(c) => draft.push(c),
                _ => {}
            }
            return;
        }

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => self.exit(),
            KeyCode::Char('p') | KeyCode::Char('P') => {
                let command = if self.view.paused {
                    UserCommand::Resume
                } else {
                    UserCommand::Pause
                };
                self.send(command);
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                let command = if self.view.filter.streaming_enabled {
                    UserCommand::Unsubscribe
                } else {
                    UserCommand::Subscribe(self.view.filter.clone())
                };
                self.send(command);
            }
            KeyCode::Char('l') => self.update_filter(|f| f.level_threshold = f.level_threshold.stricter()),
            KeyCode::Char('L') => self.update_filter(|f| f.level_threshold = f.level_threshold.wider()),
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Search(self.view.filter.search_text.clone());
            }
            KeyCode::Char('c') | KeyCode::Char('C') => self.send(UserCommand::Clear),
            KeyCode::Char('r') | KeyCode::Char('R') => self.send(UserCommand::Reconnect),
            KeyCode::Char('x') | KeyCode::Char('X') => self.send(UserCommand::DismissBanner),
            KeyCode::Char('b') | KeyCode::Char('B') => self.send(UserCommand::RequestBufferInfo),
            KeyCode::Char(']') => self.request_page(1),
            KeyCode::Char('[') => self.request_page(-1),
            KeyCode::Char('w') | KeyCode::Char('W') => {
                let next = self.view.metrics.lookback().next();
                self.send(UserCommand::SelectLookBack(next));
            }
            KeyCode::Char('m') | KeyCode::Char('M') => self.toggle_metrics(),
            KeyCode::Char('i') | KeyCode::Char('I') => self.toggle_inspect(),
            KeyCode::Esc => self.close_inspect(),
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('H') => self.focus_logs(),
            KeyCode::Right => {
                if self.show_metrics && self.focus == Focus::Logs {
                    self.focus = Focus::Metrics;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Char('G') | KeyCode::End => self.follow_newest(),
            _ => {}
        }
    }

    fn send(&mut self, command: UserCommand) {
        if let Err(e) = self.handle.send(command) {
            warn!(error = %e, "session is gone, exiting");
            self.exit();
        }
    }

    fn update_filter(&mut self, change: impl FnOnce(&mut FilterState)) {
        let mut filter = self.view.filter.clone();
        change(&mut filter);
        if filter != self.view.filter {
            self.send(UserCommand::UpdateFilter(filter));
        }
    }

    fn request_page(&mut self, step: i64) {
        let current = self.view.page.map(|p| p.page as i64).unwrap_or(0);
        let page = (current + step).max(1) as u32;
        self.send(UserCommand::RequestPage(page));
    }

    fn select_previous(&mut self) {
        let count = self.view.records.len();
        if count == 0 {
            return;
        }
        self.follow = false;
        let i = match self.table_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => count - 1,
        };
        self.select(i);
    }

    fn select_next(&mut self) {
        let count = self.view.records.len();
        if count == 0 {
            return;
        }
        let i = match self.table_state.selected() {
            Some(i) => (i + 1).min(count - 1),
            None => 0,
        };
        if i == count - 1 && self.focus != Focus::Inspect {
            self.follow = true;
        }
        self.select(i);
    }

    fn select(&mut self, i: usize) {
        self.table_state.select(Some(i));
        // Update inspected record if the popup is open
        if self.focus == Focus::Inspect {
            if let Some(record) = self.view.records.get(i) {
                self.inspected = Some(record.clone());
            }
        }
    }

    fn follow_newest(&mut self) {
        self.follow = true;
        let count = self.view.records.len();
        if count > 0 {
            self.select(count - 1);
        }
    }

    fn toggle_metrics(&mut self) {
        self.show_metrics = !self.show_metrics;
        if !self.show_metrics && self.focus == Focus::Metrics {
            self.focus = Focus::Logs;
        }
    }

    fn toggle_inspect(&mut self) {
        if self.focus == Focus::Inspect {
            self.close_inspect();
            return;
        }
        if let Some(record) = self
            .table_state
            .selected()
            .and_then(|i| self.view.records.get(i))
        {
            // Freeze the selection while inspecting.
            self.inspected = Some(record.clone());
            self.follow = false;
            self.focus = Focus::Inspect;
        }
    }

    fn close_inspect(&mut self) {
        if self.focus == Focus::Inspect {
            self.inspected = None;
            self.focus = Focus::Logs;
        }
    }

    fn focus_logs(&mut self) {
        if self.focus == Focus::Inspect {
            self.close_inspect();
        } else {
            self.focus = Focus::Logs;
        }
    }

    fn exit(&mut self) {
        self.exit = true;
    }
}

impl App {
    fn render_ui(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let title = Line::from(" Proxy Console ".bold());
        let bottom_line = controls_line(self.focus, &self.input_mode);

        #[cfg(feature = "dev")]
        let block = {
            let render_time_ms = self.last_render_duration.as_millis();
            let render_time_text = if render_time_ms < 10 {
                format!("  {}ms ", render_time_ms)
            } else {
                format!(" {}ms ", render_time_ms)
            };

            Block::bordered()
                .title(title.centered())
                .title_bottom(bottom_line.centered())
                .title_bottom(Line::from(render_time_text).cyan().right_aligned())
                .border_set(border::THICK)
        };

        #[cfg(not(feature = "dev"))]
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(bottom_line.centered())
            .border_set(border::THICK);

        let inner_area = block.inner(area);
        frame.render_widget(block, area);

        let view = Arc::clone(&self.view);
        render_main_view(
            frame,
            inner_area,
            &view,
            &mut self.table_state,
            self.focus,
            self.show_metrics,
            self.follow,
            self.inspected.as_ref(),
        );
    }
}

/// Index in `next` for the row selected in `previous`. Follows the newest
/// record when `follow` is set; otherwise stays on the same record, or clamps
/// when that record is gone.
fn reanchor(
    previous: &[Record],
    selected: Option<usize>,
    next: &[Record],
    follow: bool,
) -> Option<usize> {
    let last = next.len().checked_sub(1)?;
    if follow {
        return Some(last);
    }
    let selected = selected?;
    let anchored = previous
        .get(selected)
        .and_then(|record| next.iter().position(|r| r.id == record.id));
    Some(anchored.unwrap_or(selected.min(last)))
}

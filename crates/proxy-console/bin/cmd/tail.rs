use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use colored::Colorize;
use eyre::{Context, Result};
use chrono::NaiveDateTime;
use proxy_console::logging::{self, LogTarget};
use proxy_console::snapshot::SnapshotState;
use proxy_console::{
    spawn_session, ConnectionState, DashboardView, Format, Record, RecordId, SessionSummary,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::warn;

use super::connect::ConnectArgs;
use super::palette::level_rgb;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryFormat {
    Table,
    Json,
    JsonPretty,
    None,
}

impl SummaryFormat {
    fn format(self) -> Option<Format> {
        match self {
            SummaryFormat::Table => Some(Format::Table),
            SummaryFormat::Json => Some(Format::Json),
            SummaryFormat::JsonPretty => Some(Format::JsonPretty),
            SummaryFormat::None => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct TailArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Exit after printing this many records
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Exit after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Session summary printed on exit
    #[arg(long, value_enum, default_value_t = SummaryFormat::Table)]
    pub summary: SummaryFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl TailArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.connect.config()?;
        logging::init(&LogTarget::Stderr, self.connect.verbose)?;
        if self.no_color {
            colored::control::set_override(false);
        }

        let stop = Arc::new(AtomicBool::new(false));
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&stop))
                .wrap_err("failed to register signal handler")?;
        }

        let started = Instant::now();
        let deadline = self.duration.map(|secs| started + Duration::from_secs(secs));
        let handle = spawn_session(config)?;

        let mut printer = Printer::default();
        let mut out = io::stdout().lock();
        let mut last_view = Arc::new(DashboardView::default());
        loop {
            let view = handle.view();
            if view.revision != last_view.revision || last_view.revision == 0 {
                printer.report_status(&last_view, &view);
                let remaining = self.count.map(|c| c.saturating_sub(printer.printed));
                printer.print_new(&view, remaining, &mut out)?;
                last_view = view;
            }

            if self.count.is_some_and(|c| printer.printed >= c) {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if stop.load(Ordering::Relaxed) || !handle.is_running() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let final_view = handle.view();
        handle.shutdown();

        if let Some(format) = self.summary.format() {
            let summary = SessionSummary::from_view(&final_view, started.elapsed());
            eprintln!("{}", summary.render(format));
        }
        Ok(())
    }
}

/// Tracks the newest record written so far.
#[derive(Default)]
struct Printer {
    last: Option<(NaiveDateTime, RecordId)>,
    printed: u64,
}

impl Printer {
    /// Writes visible records newer than the last one printed, oldest first.
    /// Nothing is written until the history snapshot has settled, since
    /// resolving it re-ingests the buffer under fresh ids.
    fn print_new(
        &mut self,
        view: &DashboardView,
        limit: Option<u64>,
        out: &mut impl Write,
    ) -> Result<()> {
        if matches!(view.snapshot, SnapshotState::NotStarted | SnapshotState::Pending) {
            return Ok(());
        }
        let mut budget = limit.unwrap_or(u64::MAX);
        for record in view.records.iter() {
            if budget == 0 {
                break;
            }
            let key = (record.timestamp, record.id);
            if self.last.is_some_and(|last| key <= last) {
                continue;
            }
            writeln!(out, "{}", format_record(record)).wrap_err("failed to write record")?;
            self.last = Some(key);
            self.printed += 1;
            budget -= 1;
        }
        out.flush().wrap_err("failed to flush stdout")?;
        Ok(())
    }

    fn report_status(&self, previous: &DashboardView, current: &DashboardView) {
        if previous.connection != current.connection
            || previous.next_retry != current.next_retry
        {
            let label = current.connection_label();
            let line = match current.connection {
                ConnectionState::Open => label.green(),
                ConnectionState::Failed => label.red().bold(),
                _ => label.yellow(),
            };
            eprintln!("-- {line}");
        }
        if let Some(banner) = &current.banner {
            if previous.banner.as_ref().map(|b| b.id) != Some(banner.id) {
                eprintln!("{} {}", "server error:".red().bold(), banner.message);
            }
        }
        if let Some(failure) = &current.failure {
            if previous.failure.as_ref() != Some(failure) {
                warn!(%failure, "stream gave up");
            }
        }
    }
}

fn format_record(record: &Record) -> String {
    let (r, g, b) = level_rgb(record.level);
    let pid = record
        .pid
        .map(|pid| format!("[{pid}]"))
        .unwrap_or_default();
    format!(
        "{} {:<8} {:>8} {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        record.level.as_str().truecolor(r, g, b).bold(),
        pid,
        record.message
    )
}

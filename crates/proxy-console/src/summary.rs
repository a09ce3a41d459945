use std::collections::BTreeMap;
use std::time::Duration;

use prettytable::{Cell, Row, Table};
use serde::Serialize;

use crate::supervisor::ConnectionState;
use crate::view::DashboardView;
use crate::Level;

/// Output format of a [`SessionSummary`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub runtime_secs: f64,
    pub connection: ConnectionState,
    pub received: BTreeMap<Level, u64>,
    pub total_received: u64,
    pub frames: u64,
    pub reconnects: u64,
    pub protocol_errors: u64,
    pub server_errors: u64,
    pub buffered: usize,
    pub evicted: u64,
    pub dropped_while_paused: u64,
}

impl SessionSummary {
    pub fn from_view(view: &DashboardView, runtime: Duration) -> Self {
        // Levels with no records still get a row.
        let received = Level::ALL
            .into_iter()
            .map(|level| (level, view.stats.received.get(&level).copied().unwrap_or(0)))
            .collect();
        Self {
            runtime_secs: runtime.as_secs_f64(),
            connection: view.connection,
            received,
            total_received: view.stats.total_received(),
            frames: view.stats.frames,
            reconnects: view.stats.reconnects,
            protocol_errors: view.stats.protocol_errors,
            server_errors: view.stats.server_errors,
            buffered: view.buffer.len,
            evicted: view.buffer.evicted,
            dropped_while_paused: view.buffer.dropped_while_paused,
        }
    }

    pub fn render(&self, format: Format) -> String {
        match format {
            Format::Table => self.render_table(),
            Format::Json => serde_json::to_string(self)
                .unwrap_or_else(|e| format!("Failed to serialize summary to JSON: {}", e)),
            Format::JsonPretty => serde_json::to_string_pretty(self)
                .unwrap_or_else(|e| format!("Failed to serialize summary to pretty JSON: {}", e)),
        }
    }

    fn render_table(&self) -> String {
        let mut levels = Table::new();
        levels.add_row(Row::new(vec![Cell::new("Level"), Cell::new("Received")]));
        for (level, count) in &self.received {
            levels.add_row(Row::new(vec![
                Cell::new(level.as_str()),
                Cell::new(&count.to_string()),
            ]));
        }
        levels.add_row(Row::new(vec![
            Cell::new("TOTAL"),
            Cell::new(&self.total_received.to_string()),
        ]));

        let mut session = Table::new();
        for (name, value) in [
            ("Final state", self.connection.to_string()),
            ("Frames", self.frames.to_string()),
            ("Reconnects", self.reconnects.to_string()),
            ("Protocol errors", self.protocol_errors.to_string()),
            ("Server errors", self.server_errors.to_string()),
            ("Buffered", self.buffered.to_string()),
            ("Evicted", self.evicted.to_string()),
            ("Dropped while paused", self.dropped_while_paused.to_string()),
        ] {
            session.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
        }

        format!(
            "\n=== Session summary (runtime: {:.2}s) ===\n\nRecords:\n{}\nSession:\n{}",
            self.runtime_secs, levels, session
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::SessionStats;

    fn view() -> DashboardView {
        DashboardView {
            connection: ConnectionState::Open,
            stats: SessionStats {
                received: BTreeMap::from([(Level::Error, 3), (Level::Connect, 7)]),
                frames: 4,
                reconnects: 1,
                ..SessionStats::default()
            },
            ..DashboardView::default()
        }
    }

    #[test]
    fn test_summary_lists_every_level() {
        let summary = SessionSummary::from_view(&view(), Duration::from_secs(2));
        assert_eq!(summary.received.len(), Level::ALL.len());
        assert_eq!(summary.received[&Level::Warning], 0);
        assert_eq!(summary.total_received, 10);
    }

    #[test]
    fn test_render_table() {
        let text = SessionSummary::from_view(&view(), Duration::from_secs(2)).render(Format::Table);
        assert!(text.contains("runtime: 2.00s"));
        assert!(text.contains("CONNECT"));
        assert!(text.contains("Reconnects"));
    }

    #[test]
    fn test_render_json() {
        let text = SessionSummary::from_view(&view(), Duration::from_secs(2)).render(Format::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["received"]["ERROR"], 3);
        assert_eq!(value["connection"], "OPEN");
        assert_eq!(value["reconnects"], 1);
    }
}

use proxy_console::{MetricSeries, MetricsHistory};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    symbols::border,
    text::Line,
    widgets::{Block, Paragraph, Sparkline},
    Frame,
};

/// Fields charted per series, with a display label.
const HEADLINES: [(MetricSeries, &str, &str); 7] = [
    (MetricSeries::System, "cpu.percent", "CPU %"),
    (MetricSeries::System, "memory.percent", "Memory %"),
    (MetricSeries::System, "disk.percent", "Disk %"),
    (MetricSeries::Performance, "throughput", "Requests/s"),
    (MetricSeries::Performance, "error_rate", "Error %"),
    (MetricSeries::Performance, "latency.p95", "Latency p95 ms"),
    (MetricSeries::Performance, "active_connections", "Connections"),
];

/// Renders one sparkline per headline field plus the look-back summary
pub(crate) fn render_metrics_panel(
    metrics: &MetricsHistory,
    area: Rect,
    frame: &mut Frame,
    is_focused: bool,
) {
    let lookback = metrics.lookback();
    let block = Block::bordered()
        .title(format!(" Metrics [{}] ", lookback.label()))
        .border_set(if is_focused {
            border::THICK
        } else {
            border::PLAIN
        });
    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let mut constraints = vec![Constraint::Length(3); HEADLINES.len()];
    constraints.push(Constraint::Min(2));
    let chunks = Layout::vertical(constraints).split(inner_area);

    for (i, (series, key, label)) in HEADLINES.iter().enumerate() {
        let window = metrics.window(*series);
        let values = window.values(key);
        let latest = values
            .last()
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "-".to_string());
        // Sparkline bars are integers; keep one decimal of resolution.
        let data: Vec<u64> = values.iter().map(|v| (v.max(0.0) * 10.0).round() as u64).collect();

        let sparkline = Sparkline::default()
            .block(Block::default().title(format!("{label}: {latest}")))
            .data(&data)
            .style(Style::default().fg(Color::Cyan));
        frame.render_widget(sparkline, chunks[i]);
    }

    let summary = match metrics.aggregate() {
        Some(buckets) if !buckets.is_empty() => {
            let throughput: Vec<f64> = buckets.iter().filter_map(|b| b.get("throughput")).collect();
            let avg = if throughput.is_empty() {
                "-".to_string()
            } else {
                format!("{:.2}", throughput.iter().sum::<f64>() / throughput.len() as f64)
            };
            format!(
                "{} buckets of {}m, avg requests/s {}",
                buckets.len(),
                lookback.interval_minutes(),
                avg
            )
        }
        Some(_) => "no aggregated data".to_string(),
        None => "loading aggregated data...".to_string(),
    };
    frame.render_widget(
        Paragraph::new(Line::from(summary)).style(Style::default().fg(Color::DarkGray)),
        chunks[HEADLINES.len()],
    );
}

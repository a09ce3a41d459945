use clap::Args;
use eyre::Result;
use proxy_console::{ConsoleConfig, FilterState, Level};

fn parse_level(s: &str) -> std::result::Result<Level, String> {
    Level::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Level::ALL.iter().map(|l| l.as_str()).collect();
        format!("unknown level `{s}`, expected one of {}", names.join(", "))
    })
}

/// Backend connection flags shared by every subcommand. Flags override the
/// `PROXY_CONSOLE_*` environment variables.
#[derive(Debug, Clone, Args)]
pub struct ConnectArgs {
    /// Backend base URL
    #[arg(long)]
    pub url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long)]
    pub token: Option<String>,

    /// Show records at this level or more severe
    #[arg(long, value_parser = parse_level)]
    pub level: Option<Level>,

    /// Only show records containing this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,

    /// Number of historical records loaded on start
    #[arg(long)]
    pub snapshot_lines: Option<usize>,

    /// Maximum number of records kept in memory
    #[arg(long)]
    pub buffer_capacity: Option<usize>,

    /// Start with live streaming turned off
    #[arg(long)]
    pub no_stream: bool,

    /// Verbose diagnostics
    #[arg(short, long)]
    pub verbose: bool,
}

impl ConnectArgs {
    pub fn config(&self) -> Result<ConsoleConfig> {
        let mut config = ConsoleConfig::from_env();
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut ConsoleConfig) {
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(lines) = self.snapshot_lines {
            config.snapshot_lines = lines;
        }
        if let Some(capacity) = self.buffer_capacity {
            config.buffer_capacity = capacity;
        }
        config.initial_filter = FilterState {
            level_threshold: self.level.unwrap_or(config.initial_filter.level_threshold),
            search_text: self
                .search
                .clone()
                .unwrap_or_else(|| config.initial_filter.search_text.clone()),
            streaming_enabled: !self.no_stream,
        };
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod snapshot;
pub mod subscription;
pub mod summary;
pub mod supervisor;
pub mod transport;
pub mod view;

pub use buffer::EventBuffer;
pub use config::ConsoleConfig;
pub use error::{ConsoleError, Result};
pub use filter::{visible, FilterState, FilteredView};
pub use metrics::{LookBack, MetricSample, MetricSeries, MetricsHistory};
pub use runtime::{spawn_session, spawn_session_with, SessionHandle};
pub use session::{Effect, Session, SessionEvent, UserCommand};
pub use summary::{Format, SessionSummary};
pub use supervisor::{ConnectionState, Supervisor};
pub use transport::{Connector, Link, TransportEvent, TransportEventKind, WsConnector};
pub use view::DashboardView;

/// Severity of a proxy log line.
///
/// Variants are declared from most to least severe, so the derived `Ord`
/// matches the numeric priority the backend uses (CRITICAL = 0 .. INFO = 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Critical,
    Error,
    Warning,
    Notice,
    #[default]
    Connect,
    Info,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Connect,
        Level::Info,
    ];

    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Critical => "CRITICAL",
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Notice => "NOTICE",
            Level::Connect => "CONNECT",
            Level::Info => "INFO",
        }
    }

    /// Parses a level name case-insensitively. Returns `None` for names the
    /// backend does not know about.
    pub fn parse(name: &str) -> Option<Self> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Next more severe level, saturating at CRITICAL.
    pub fn stricter(self) -> Self {
        Level::ALL[self.priority().saturating_sub(1) as usize]
    }

    /// Next less severe level, saturating at INFO.
    pub fn wider(self) -> Self {
        Level::ALL[(self.priority() as usize + 1).min(Level::ALL.len() - 1)]
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = ConsoleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Level::parse(s).ok_or_else(|| ConsoleError::InvalidConfig {
            details: format!("unknown log level: {s}"),
        })
    }
}

impl Serialize for Level {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // The backend ranks any level it does not recognise as INFO.
        let s = String::deserialize(deserializer)?;
        Ok(Level::parse(&s).unwrap_or(Level::Info))
    }
}

/// Client-assigned identity of a buffered record. Stable across re-renders,
/// never taken from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A log line as delivered by the backend, before ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub timestamp: NaiveDateTime,
    #[serde(default = "default_wire_level")]
    pub level: Level,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub message: String,
}

fn default_wire_level() -> Level {
    Level::Info
}

/// A single ingested log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    pub timestamp: NaiveDateTime,
    pub level: Level,
    pub pid: Option<u32>,
    pub message: String,
}

impl Record {
    pub(crate) fn from_wire(id: RecordId, wire: WireRecord) -> Self {
        Self {
            id,
            timestamp: wire.timestamp,
            level: wire.level,
            pid: wire.pid,
            message: wire.message,
        }
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::filter::FilterState;
use crate::metrics::MetricsHistory;
use crate::protocol::{BufferInfo, PageInfo};
use crate::snapshot::SnapshotState;
use crate::supervisor::ConnectionState;
use crate::{Level, Record};

/// A server `error` frame kept until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub id: u64,
    pub message: String,
}

/// Running counters for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    /// Records received from the stream per level, including ones dropped
    /// while paused.
    pub received: BTreeMap<Level, u64>,
    pub frames: u64,
    pub protocol_errors: u64,
    pub server_errors: u64,
    pub reconnects: u64,
}

impl SessionStats {
    pub fn total_received(&self) -> u64 {
        self.received.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferStats {
    pub len: usize,
    pub capacity: usize,
    pub evicted: u64,
    pub dropped_while_paused: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    /// Bumped on every publish.
    pub revision: u64,
    /// Bumped only when the buffer contents change; drives follow mode.
    pub buffer_revision: u64,
    pub connection: ConnectionState,
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_retry: Option<Duration>,
    pub failure: Option<String>,
    pub filter: FilterState,
    pub paused: bool,
    pub pending_changes: bool,
    pub records: Arc<Vec<Record>>,
    pub buffer: BufferStats,
    pub banner: Option<Banner>,
    pub snapshot: SnapshotState,
    pub server_buffer: Option<BufferInfo>,
    pub page: Option<PageInfo>,
    pub server_message: Option<String>,
    pub metrics: Arc<MetricsHistory>,
    pub stats: SessionStats,
}

impl DashboardView {
    /// One-line connection summary, e.g. `reconnecting in 4s (3/5)`.
    pub fn connection_label(&self) -> String {
        match self.connection {
            ConnectionState::Reconnecting => match self.next_retry {
                Some(delay) => format!(
                    "reconnecting in {}s ({}/{})",
                    delay.as_secs(),
                    self.attempt,
                    self.max_attempts
                ),
                None => "reconnecting".to_string(),
            },
            ConnectionState::Failed => format!("failed after {} attempts", self.attempt),
            state => state.as_str().to_string(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.connection == ConnectionState::Open && !self.paused
    }
}

use serde::Serialize;
use tracing::{info, warn};

use crate::buffer::EventBuffer;
use crate::error::Result;
use crate::WireRecord;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SnapshotState {
    #[default]
    NotStarted,
    Pending,
    Loaded {
        records: usize,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotReconciler {
    lines: usize,
    state: SnapshotState,
}

impl SnapshotReconciler {
    pub fn new(lines: usize) -> Self {
        Self {
            lines,
            state: SnapshotState::NotStarted,
        }
    }

    pub fn state(&self) -> &SnapshotState {
        &self.state
    }

    /// Marks the fetch as in flight and returns how many lines to request.
    /// Returns `None` if a fetch already ran or is running.
    pub fn begin(&mut self) -> Option<usize> {
        if self.state != SnapshotState::NotStarted {
            return None;
        }
        self.state = SnapshotState::Pending;
        Some(self.lines)
    }

    /// Applies the outcome of the fetch. Returns true if the buffer changed.
    pub fn resolve(
        &mut self,
        buffer: &mut EventBuffer,
        outcome: Result<Vec<WireRecord>>,
    ) -> bool {
        if self.state != SnapshotState::Pending {
            return false;
        }
        match outcome {
            Ok(records) => {
                let count = records.len();
                let live_before = buffer.len();
                buffer.replace_all(records);
                info!(snapshot = count, live_before, buffered = buffer.len(), "snapshot applied");
                self.state = SnapshotState::Loaded { records: count };
                true
            }
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed, continuing with live stream only");
                self.state = SnapshotState::Failed {
                    reason: e.to_string(),
                };
                false
            }
        }
    }
}

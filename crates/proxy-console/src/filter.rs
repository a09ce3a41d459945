use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::EventBuffer;
use crate::{Level, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub level_threshold: Level,
    pub search_text: String,
    pub streaming_enabled: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            level_threshold: Level::Connect,
            search_text: String::new(),
            streaming_enabled: true,
        }
    }
}

impl FilterState {
    /// Search text as sent upstream: `None` when empty.
    pub fn search(&self) -> Option<String> {
        let trimmed = self.search_text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn matcher(&self) -> Matcher {
        Matcher {
            threshold: self.level_threshold,
            needle: self.search_text.trim().to_lowercase(),
        }
    }

    pub fn admits(&self, record: &Record) -> bool {
        self.matcher().admits(record)
    }
}

struct Matcher {
    threshold: Level,
    needle: String,
}

impl Matcher {
    fn admits(&self, record: &Record) -> bool {
        if record.level.priority() > self.threshold.priority() {
            return false;
        }
        self.needle.is_empty() || record.message.to_lowercase().contains(&self.needle)
    }
}

/// Records from `buffer` that pass `filter`, in arrival order.
pub fn visible(buffer: &EventBuffer, filter: &FilterState) -> Vec<Record> {
    let matcher = filter.matcher();
    buffer
        .iter()
        .filter(|record| matcher.admits(record))
        .cloned()
        .collect()
}

/// Memo of the last computed view. Holds exactly one result; any change to the
/// buffer revision or the filter recomputes.
#[derive(Debug, Default)]
pub struct FilteredView {
    key: Option<(u64, FilterState)>,
    records: Arc<Vec<Record>>,
}

impl FilteredView {
    pub fn get(&mut self, buffer: &EventBuffer, filter: &FilterState) -> Arc<Vec<Record>> {
        let fresh = matches!(
            &self.key,
            Some((revision, cached)) if *revision == buffer.revision() && cached == filter
        );
        if !fresh {
            self.records = Arc::new(visible(buffer, filter));
            self.key = Some((buffer.revision(), filter.clone()));
        }
        Arc::clone(&self.records)
    }
}

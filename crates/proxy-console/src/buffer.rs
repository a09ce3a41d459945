use std::collections::VecDeque;

use crate::{Record, RecordId, WireRecord};

pub const MAX_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct EventBuffer {
    records: VecDeque<Record>,
    capacity: usize,
    paused: bool,
    next_id: u64,
    revision: u64,
    evicted: u64,
    dropped_while_paused: u64,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(MAX_CAPACITY)
    }
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(MAX_CAPACITY)),
            capacity: capacity.max(1),
            paused: false,
            next_id: 0,
            revision: 0,
            evicted: 0,
            dropped_while_paused: 0,
        }
    }

    /// Appends records in order, then truncates to the newest `capacity`.
    /// A no-op while paused.
    pub fn append(&mut self, records: impl IntoIterator<Item = WireRecord>) {
        if self.paused {
            self.dropped_while_paused += records.into_iter().count() as u64;
            return;
        }

        let mut appended = false;
        for wire in records {
            let record = self.ingest(wire);
            self.records.push_back(record);
            appended = true;
        }

        if appended {
            self.truncate_front();
            self.bump();
        }
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.records.clear();
        self.bump();
    }

    /// Replaces the contents with a snapshot.
    ///
    /// Records already buffered whose timestamp is strictly newer than the
    /// snapshot's latest are kept, after the snapshot contents, so live records
    /// that raced ahead of the snapshot are neither lost nor duplicated. An
    /// empty snapshot keeps everything currently buffered.
    pub fn replace_all(&mut self, snapshot: Vec<WireRecord>) {
        let latest = snapshot.iter().map(|r| r.timestamp).max();

        let survivors: Vec<Record> = match latest {
            Some(latest) => self
                .records
                .drain(..)
                .filter(|record| record.timestamp > latest)
                .collect(),
            None => self.records.drain(..).collect(),
        };

        for wire in snapshot {
            let record = self.ingest(wire);
            self.records.push_back(record);
        }
        self.records.extend(survivors);

        self.truncate_front();
        self.bump();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Record> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Monotonic counter bumped on every observable mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn dropped_while_paused(&self) -> u64 {
        self.dropped_while_paused
    }

    fn ingest(&mut self, wire: WireRecord) -> Record {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        Record::from_wire(id, wire)
    }

    fn truncate_front(&mut self) {
        let overflow = self.records.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.records.drain(..overflow);
            self.evicted += overflow as u64;
        }
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    fn at(secs: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0)
            .unwrap()
            .naive_utc()
    }

    fn wire(secs: i64, message: &str) -> WireRecord {
        WireRecord {
            timestamp: at(secs),
            level: Level::Info,
            pid: Some(100),
            message: message.to_string(),
        }
    }

    fn messages(buffer: &EventBuffer) -> Vec<String> {
        buffer.iter().map(|r| r.message.clone()).collect()
    }

    #[test]
    fn test_append_keeps_order_and_assigns_unique_ids() {
        let mut buffer = EventBuffer::new(10);
        buffer.append(vec![wire(1, "a"), wire(2, "b")]);
        buffer.append(vec![wire(0, "c")]);

        assert_eq!(messages(&buffer), ["a", "b", "c"]);
        let ids: Vec<RecordId> = buffer.iter().map(|r| r.id).collect();
        assert_eq!(ids, [RecordId(0), RecordId(1), RecordId(2)]);
    }

    #[test]
    fn test_append_evicts_oldest_on_overflow() {
        let mut buffer = EventBuffer::new(3);
        buffer.append((0..5).map(|i| wire(i, &i.to_string())));

        assert_eq!(messages(&buffer), ["2", "3", "4"]);
        assert_eq!(buffer.evicted(), 2);
    }

    #[test]
    fn test_large_capacity_does_not_preallocate() {
        let mut buffer = EventBuffer::new(usize::MAX);
        buffer.append(vec![wire(1, "only")]);
        assert_eq!(messages(&buffer), ["only"]);
    }

    #[test]
    fn test_paused_append_discards() {
        let mut buffer = EventBuffer::new(10);
        buffer.append(vec![wire(1, "before")]);
        buffer.set_paused(true);
        buffer.append(vec![wire(2, "during"), wire(3, "during")]);
        buffer.set_paused(false);
        buffer.append(vec![wire(4, "after")]);

        assert_eq!(messages(&buffer), ["before", "after"]);
        assert_eq!(buffer.dropped_while_paused(), 2);
    }

    #[test]
    fn test_clear_empties_and_bumps_revision() {
        let mut buffer = EventBuffer::new(10);
        buffer.append(vec![wire(1, "a")]);
        let revision = buffer.revision();
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.revision() > revision);
    }

    #[test]
    fn test_replace_all_keeps_newer_live_records() {
        let mut buffer = EventBuffer::new(100);
        // Live records that arrived before the snapshot resolved.
        buffer.append(vec![wire(10, "live-old"), wire(21, "t+1"), wire(22, "t+2")]);

        buffer.replace_all(vec![wire(18, "s1"), wire(19, "s2"), wire(20, "s3")]);

        assert_eq!(messages(&buffer), ["s1", "s2", "s3", "t+1", "t+2"]);
    }

    #[test]
    fn test_replace_all_with_empty_snapshot_keeps_live() {
        let mut buffer = EventBuffer::new(100);
        buffer.append(vec![wire(1, "live")]);
        buffer.replace_all(Vec::new());
        assert_eq!(messages(&buffer), ["live"]);
    }

    #[test]
    fn test_replace_all_respects_capacity() {
        let mut buffer = EventBuffer::new(3);
        buffer.append(vec![wire(100, "live")]);
        buffer.replace_all((0..5).map(|i| wire(i, &format!("s{i}"))).collect());
        assert_eq!(messages(&buffer), ["s3", "s4", "live"]);
    }

    proptest! {
        #[test]
        fn prop_buffer_is_bounded_suffix_of_arrivals(
            capacity in 1usize..50,
            batches in prop::collection::vec(0usize..20, 0..30),
        ) {
            let mut buffer = EventBuffer::new(capacity);
            let mut arrived: Vec<String> = Vec::new();

            for (batch_no, size) in batches.into_iter().enumerate() {
                let batch: Vec<WireRecord> = (0..size)
                    .map(|i| wire(batch_no as i64, &format!("{batch_no}-{i}")))
                    .collect();
                arrived.extend(batch.iter().map(|w| w.message.clone()));
                buffer.append(batch);

                prop_assert!(buffer.len() <= capacity);
            }

            let expected: Vec<String> = arrived
                .iter()
                .skip(arrived.len().saturating_sub(capacity))
                .cloned()
                .collect();
            prop_assert_eq!(messages(&buffer), expected);
        }
    }
}

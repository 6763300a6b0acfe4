//! Keyed store of unacknowledged segments, ordered by sequence number.
//!
//! The reference implementation keeps this in a C++ `unordered_map` and reads
//! `.begin()` expecting "the packet with the lowest sequence number" — that
//! only worked by the accident of hash-bucket layout. Since sequence numbers
//! are assigned in strictly increasing order (§3), smallest-key and
//! oldest-sent coincide, so a `BTreeMap` makes that coincidence an explicit,
//! checked property instead of a hopeful one.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::wire::Segment;

pub struct SendEntry {
    pub segment: Segment,
    pub sent_at: Instant,
}

#[derive(Default)]
pub struct SendBuffer {
    entries: BTreeMap<u16, SendEntry>,
}

impl SendBuffer {
    pub fn new() -> Self {
        SendBuffer {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, seq: u16, segment: Segment, now: Instant) {
        self.entries.insert(
            seq,
            SendEntry {
                segment,
                sent_at: now,
            },
        );
    }

    /// Remove every entry with a key strictly less than `ack_value`.
    pub fn ack_through(&mut self, ack_value: u16) {
        self.entries.retain(|&seq, _| seq >= ack_value);
    }

    /// The entry with the smallest sequence number, if any.
    pub fn oldest(&self) -> Option<(u16, &SendEntry)> {
        self.entries.iter().next().map(|(&seq, e)| (seq, e))
    }

    pub fn refresh_timestamp(&mut self, seq: u16, now: Instant) {
        if let Some(entry) = self.entries.get_mut(&seq) {
            entry.sent_at = now;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

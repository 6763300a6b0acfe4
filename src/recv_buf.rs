//! Ordered store of out-of-order segments awaiting a gap-fill.
//!
//! Mirrors the reference implementation's `map<uint16_t, packet> recv_buf`:
//! every key here is strictly greater than the session's `recv_next` (§3).

use std::collections::BTreeMap;

use crate::wire::Segment;

#[derive(Default)]
pub struct RecvBuffer {
    entries: BTreeMap<u16, Segment>,
}

impl RecvBuffer {
    pub fn new() -> Self {
        RecvBuffer {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, seq: u16, segment: Segment) {
        self.entries.insert(seq, segment);
    }

    /// Drain every segment that chains contiguously from `recv_next`,
    /// delivering each via `deliver` and advancing `recv_next` past it.
    /// Returns the final `recv_next`.
    pub fn drain_from(&mut self, mut recv_next: u16, mut deliver: impl FnMut(&[u8])) -> u16 {
        while let Some(segment) = self.entries.remove(&recv_next) {
            deliver(&segment.payload);
            recv_next = recv_next.wrapping_add(1);
        }
        recv_next
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, seq: u16) -> bool {
        self.entries.contains_key(&seq)
    }
}

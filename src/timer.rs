//! Fixed retransmission timeout and duplicate-ACK fast-retransmit trigger.
//!
//! No RTT estimation, no backoff: `rto` never adapts to measured round-trip
//! time and never doubles on retry. It is a constant (§4.6).

use std::time::{Duration, Instant};

/// Fixed retransmission timeout.
pub const RTO: Duration = Duration::from_micros(3000);

/// Consecutive duplicate ACKs required to trigger a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Has `RTO` elapsed since `sent_at`?
pub fn rto_expired(sent_at: Instant, now: Instant) -> bool {
    now.saturating_duration_since(sent_at) >= RTO
}

/// Tracks consecutive ACKs equal to the last-seen ACK value, firing a fast
/// retransmit once [`DUP_ACK_THRESHOLD`] is reached.
#[derive(Debug, Default)]
pub struct DupAckCounter {
    count: u32,
}

impl DupAckCounter {
    pub fn new() -> Self {
        DupAckCounter { count: 0 }
    }

    /// Record one more ACK equal to the last-seen value. Returns `true` when
    /// the threshold is reached (the caller should fast-retransmit and this
    /// counter resets itself).
    pub fn record_duplicate(&mut self) -> bool {
        self.count += 1;
        if self.count >= DUP_ACK_THRESHOLD {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

//! Per-event diagnostic line, written to stderr: one line per wire event.
//!
//! Format is part of the wire contract (§6), not a generality — hand
//! formatted rather than routed through a structured logging macro, since
//! the exact line shape is observable behavior.

use crate::wire::{FlagList, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Recv,
    Send,
    Rtos,
    Dups,
}

impl Tag {
    fn as_str(self) -> &'static str {
        match self {
            Tag::Recv => "RECV",
            Tag::Send => "SEND",
            Tag::Rtos => "RTOS",
            Tag::Dups => "DUPS",
        }
    }
}

pub fn log(tag: Tag, seg: &Segment) {
    eprintln!(
        "{} {} ACK {} LEN {} WIN {} FLAGS {}",
        tag.as_str(),
        seg.seq,
        seg.ack,
        seg.len(),
        seg.win,
        FlagList(seg.flags),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FLAG_ACK;

    #[test]
    fn tag_strings_match_spec() {
        assert_eq!(Tag::Recv.as_str(), "RECV");
        assert_eq!(Tag::Send.as_str(), "SEND");
        assert_eq!(Tag::Rtos.as_str(), "RTOS");
        assert_eq!(Tag::Dups.as_str(), "DUPS");
    }

    #[test]
    fn log_does_not_panic_on_any_segment() {
        let seg = Segment::new(1, 2, 1012, FLAG_ACK, b"hi".to_vec());
        log(Tag::Send, &seg);
    }
}

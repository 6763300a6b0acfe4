//! The cooperative session loop: receiver path, timer/recovery, sender path
//! (§4.5), all three driven from one single-threaded poll loop.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::os::unix::io::AsRawFd;
use std::time::Instant;

use nix::poll::{poll, PollFd, PollFlags};

use crate::diag::{self, Tag};
use crate::err::Error;
use crate::handshake::Handshaken;
use crate::recv_buf::RecvBuffer;
use crate::send_buf::SendBuffer;
use crate::timer::{self, DupAckCounter};
use crate::wire::{Segment, FLAG_ACK, MAX_PAYLOAD, MAX_SEGMENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// How long the loop waits for socket readiness on each iteration when there
/// is nothing else to do — the "implementations MAY insert a short sleep
/// (≤ 1 ms)" allowance in §4.5, realized as a kernel-side poll timeout
/// instead of a user-space spin.
const POLL_TIMEOUT_MS: i32 = 1;

pub struct Session {
    socket: UdpSocket,
    #[allow(dead_code)]
    role: Role,

    send_next: u16,
    recv_next: u16,
    peer_win: u16,
    last_ack_seen: u16,
    dup_ack: DupAckCounter,
    recv_gap_latch: bool,

    send_buf: SendBuffer,
    recv_buf: RecvBuffer,
}

impl Session {
    pub fn new(socket: UdpSocket, role: Role, handshaken: Handshaken) -> Result<Self, Error> {
        socket.set_nonblocking(true)?;
        Ok(Session {
            socket,
            role,
            send_next: handshaken.send_next,
            recv_next: handshaken.recv_next,
            // A pure echo of the peer's advertised window, not a locally
            // computed one (§3) — carried through verbatim, zero included.
            peer_win: handshaken.peer_win,
            last_ack_seen: handshaken.send_next,
            dup_ack: DupAckCounter::new(),
            recv_gap_latch: false,
            send_buf: SendBuffer::new(),
            recv_buf: RecvBuffer::new(),
        })
    }

    /// Run the session loop forever (until the process is killed or an I/O
    /// error other than would-block occurs).
    pub fn run(
        &mut self,
        mut read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
        mut write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
    ) -> Result<(), Error> {
        loop {
            self.wait_for_readiness()?;
            self.poll_inbound(&mut write_app)?;
            self.check_timer()?;
            self.try_send(&mut read_app)?;
        }
    }

    fn wait_for_readiness(&self) -> Result<(), Error> {
        let mut fds = [PollFd::new(self.socket.as_raw_fd(), PollFlags::POLLIN)];
        // A poll() error here is not meaningful to the transport; treat it
        // like "nothing ready" and let the next iteration retry.
        let _ = poll(&mut fds, POLL_TIMEOUT_MS);
        Ok(())
    }

    /// (a) Poll inbound: parse, validate parity, process ACK, deliver or buffer.
    fn poll_inbound(
        &mut self,
        write_app: &mut impl FnMut(&[u8]) -> std::io::Result<()>,
    ) -> Result<(), Error> {
        let mut buf = [0u8; MAX_SEGMENT];
        let n = match self.socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let seg = match Segment::decode(&buf[..n]) {
            Some(seg) => seg,
            None => return Ok(()), // parity-invalid or truncated: drop silently
        };
        diag::log(Tag::Recv, &seg);

        if seg.is_ack() {
            self.process_ack(seg.ack);
        }
        self.peer_win = seg.win;

        if seg.len() > 0 {
            self.process_data(seg, write_app)?;
        }

        Ok(())
    }

    fn process_ack(&mut self, ack: u16) {
        if ack > self.last_ack_seen {
            self.last_ack_seen = ack;
            self.dup_ack.reset();
            self.send_buf.ack_through(ack);
        } else if ack == self.last_ack_seen && self.dup_ack.record_duplicate() {
            self.retransmit_oldest(Tag::Dups);
        }
    }

    fn process_data(
        &mut self,
        seg: Segment,
        write_app: &mut impl FnMut(&[u8]) -> std::io::Result<()>,
    ) -> Result<(), Error> {
        if seg.seq == self.recv_next {
            write_app(&seg.payload)?;
            let next_after = self.recv_next.wrapping_add(1);

            let mut io_err = None;
            let drained = self.recv_buf.drain_from(next_after, |payload| {
                if io_err.is_none() {
                    if let Err(e) = write_app(payload) {
                        io_err = Some(e);
                    }
                }
            });
            if let Some(e) = io_err {
                return Err(e.into());
            }
            self.recv_next = drained;
            self.recv_gap_latch = false;
            self.send_cumulative_ack()?;
        } else if seg.seq > self.recv_next {
            self.recv_buf.insert(seg.seq, seg);
            if !self.recv_gap_latch {
                self.send_gap_ack()?;
                self.recv_gap_latch = true;
            }
        }
        // seq < recv_next: already delivered, ignore silently.
        Ok(())
    }

    fn send_cumulative_ack(&mut self) -> Result<(), Error> {
        let ack_seg = Segment::new(0, self.recv_next, self.peer_win, FLAG_ACK, vec![]);
        self.transmit(&ack_seg, Tag::Send)
    }

    fn send_gap_ack(&mut self) -> Result<(), Error> {
        let ack_seg = Segment::new(0, self.recv_next, self.peer_win, FLAG_ACK, vec![]);
        self.transmit(&ack_seg, Tag::Send)
    }

    /// (b) Timer check: retransmit the oldest unacked segment past RTO.
    fn check_timer(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        let expired = matches!(self.send_buf.oldest(), Some((_, entry)) if timer::rto_expired(entry.sent_at, now));
        if expired {
            self.retransmit_oldest(Tag::Rtos);
        }
        Ok(())
    }

    /// Retransmit the oldest unacknowledged segment, carrying the exact same
    /// header and payload it originally bore (§4.6 — parity is idempotent
    /// over identical content, so it is not recomputed).
    fn retransmit_oldest(&mut self, tag: Tag) {
        let Some((seq, entry)) = self.send_buf.oldest() else {
            return;
        };
        let mut buf = [0u8; MAX_SEGMENT];
        let n = entry.segment.encode(&mut buf);
        if self.socket.send(&buf[..n]).is_ok() {
            diag::log(tag, &entry.segment);
        }
        self.send_buf.refresh_timestamp(seq, Instant::now());
    }

    /// (c) Try to send new data if the peer's window allows it.
    fn try_send(&mut self, read_app: &mut impl FnMut(&mut [u8]) -> std::io::Result<usize>) -> Result<(), Error> {
        let in_flight = self.send_buf.len();
        let window_segments = self.peer_win as usize / MAX_PAYLOAD;
        if in_flight >= window_segments {
            return Ok(());
        }

        let mut payload = vec![0u8; MAX_PAYLOAD];
        let n = read_app(&mut payload)?;
        if n == 0 {
            return Ok(());
        }
        payload.truncate(n);

        let seg = Segment::new(self.send_next, self.recv_next, self.peer_win, 0, payload);
        self.send_buf.insert(self.send_next, seg.clone(), Instant::now());
        self.transmit(&seg, Tag::Send)?;
        self.send_next = self.send_next.wrapping_add(1);
        Ok(())
    }

    fn transmit(&mut self, seg: &Segment, tag: Tag) -> Result<(), Error> {
        let mut buf = [0u8; MAX_SEGMENT];
        let n = seg.encode(&mut buf);
        self.socket.send(&buf[..n])?;
        diag::log(tag, seg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    /// Build a connected loopback socket pair: `(a, b)`, `a` and `b` each
    /// `connect()`ed to the other, the way the handshake leaves the real
    /// socket once a peer is known.
    fn socket_pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        a.connect(b.local_addr().unwrap()).unwrap();
        b.connect(a.local_addr().unwrap()).unwrap();
        (a, b)
    }

    fn session_on(socket: UdpSocket, send_next: u16, recv_next: u16) -> Session {
        Session::new(
            socket,
            Role::Initiator,
            Handshaken {
                send_next,
                recv_next,
                peer_win: MAX_PAYLOAD as u16,
            },
        )
        .unwrap()
    }

    fn recv_one(socket: &UdpSocket) -> Segment {
        socket.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let mut buf = [0u8; MAX_SEGMENT];
        let n = socket.recv(&mut buf).expect("expected a datagram");
        Segment::decode(&buf[..n]).expect("parity-valid")
    }

    fn no_datagram_within(socket: &UdpSocket, timeout: Duration) -> bool {
        socket.set_read_timeout(Some(timeout)).unwrap();
        let mut buf = [0u8; MAX_SEGMENT];
        matches!(socket.recv(&mut buf), Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut)
    }

    fn noop_write() -> impl FnMut(&[u8]) -> std::io::Result<()> {
        |_: &[u8]| Ok(())
    }

    #[test]
    fn third_duplicate_ack_fires_fast_retransmit() {
        let (a, b) = socket_pair();
        let mut sess = session_on(a, 200, 50);
        let unacked = Segment::new(200, 0, MAX_PAYLOAD as u16, 0, b"payload".to_vec());
        sess.send_buf.insert(200, unacked.clone(), Instant::now());

        // last_ack_seen starts at send_next (200); three ACKs repeating that
        // value are duplicates of the same unmoved cumulative ack.
        sess.process_ack(200);
        sess.process_ack(200);
        assert!(
            no_datagram_within(&b, Duration::from_millis(20)),
            "must not retransmit before the third duplicate"
        );

        sess.process_ack(200);
        let retransmitted = recv_one(&b);
        assert_eq!(retransmitted.seq, 200);
        assert_eq!(retransmitted.payload, unacked.payload);
    }

    #[test]
    fn new_ack_advances_window_and_resets_duplicate_count() {
        let (a, _b) = socket_pair();
        let mut sess = session_on(a, 200, 50);
        sess.send_buf.insert(100, Segment::new(100, 0, 0, 0, vec![]), Instant::now());
        sess.send_buf.insert(101, Segment::new(101, 0, 0, 0, vec![]), Instant::now());

        sess.last_ack_seen = 100;
        sess.process_ack(101);

        assert_eq!(sess.last_ack_seen, 101);
        assert_eq!(sess.send_buf.len(), 1);
        assert_eq!(sess.send_buf.oldest().unwrap().0, 101);
    }

    #[test]
    fn rto_expiry_retransmits_oldest_unacked_segment() {
        let (a, b) = socket_pair();
        let mut sess = session_on(a, 200, 50);
        let stale = Instant::now() - (timer::RTO + Duration::from_millis(5));
        let seg = Segment::new(200, 0, MAX_PAYLOAD as u16, 0, b"late".to_vec());
        sess.send_buf.insert(200, seg.clone(), stale);

        sess.check_timer().unwrap();

        let retransmitted = recv_one(&b);
        assert_eq!(retransmitted.seq, 200);
        assert_eq!(retransmitted.payload, b"late".to_vec());
        // the retransmit refreshes the timestamp so it isn't re-sent again
        // on the very next timer check.
        assert!(!timer::rto_expired(sess.send_buf.oldest().unwrap().1.sent_at, Instant::now()));
    }

    #[test]
    fn timer_check_is_a_noop_with_nothing_in_flight() {
        let (a, b) = socket_pair();
        let mut sess = session_on(a, 200, 50);
        sess.check_timer().unwrap();
        assert!(no_datagram_within(&b, Duration::from_millis(20)));
    }

    #[test]
    fn gap_latches_one_ack_then_infill_clears_it_and_delivers_in_order() {
        let (a, b) = socket_pair();
        let mut sess = session_on(a, 10, 100);
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let mut write_app = {
            let delivered = delivered.clone();
            move |buf: &[u8]| {
                delivered.borrow_mut().extend_from_slice(buf);
                Ok(())
            }
        };

        // 101 arrives before 100 (the expected one): buffered, gap ack fires once.
        sess.process_data(Segment::new(101, 0, 0, 0, b"b".to_vec()), &mut write_app)
            .unwrap();
        assert!(sess.recv_gap_latch);
        assert_eq!(sess.recv_buf.len(), 1);
        let gap_ack = recv_one(&b);
        assert!(gap_ack.is_ack());
        assert_eq!(gap_ack.ack, 100);

        // a second out-of-order arrival does not re-fire the gap ack.
        sess.process_data(Segment::new(102, 0, 0, 0, b"c".to_vec()), &mut write_app)
            .unwrap();
        assert!(no_datagram_within(&b, Duration::from_millis(20)));

        // 100 fills the gap: the whole contiguous run delivers, in order,
        // the latch clears, and a fresh cumulative ack goes out.
        sess.process_data(Segment::new(100, 0, 0, 0, b"a".to_vec()), &mut write_app)
            .unwrap();
        assert_eq!(&*delivered.borrow(), b"abc");
        assert!(!sess.recv_gap_latch);
        assert_eq!(sess.recv_next, 103);
        assert!(sess.recv_buf.is_empty());

        let cumulative_ack = recv_one(&b);
        assert!(cumulative_ack.is_ack());
        assert_eq!(cumulative_ack.ack, 103);
    }

    #[test]
    fn duplicate_below_recv_next_is_ignored() {
        let (a, _b) = socket_pair();
        let mut sess = session_on(a, 10, 100);
        sess.process_data(Segment::new(99, 0, 0, 0, b"stale".to_vec()), &mut noop_write())
            .unwrap();
        assert_eq!(sess.recv_next, 100);
        assert!(sess.recv_buf.is_empty());
    }
}

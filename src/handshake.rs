//! Three-way handshake (§4.2). Runs with the socket in blocking mode; the
//! session loop switches to non-blocking only once this returns.

use std::net::UdpSocket;

use rand::Rng;

use crate::diag::{self, Tag};
use crate::err::Error;
use crate::wire::{Segment, FLAG_ACK, FLAG_SYN};

/// Sequence-number bookkeeping handed off to the session loop once the
/// handshake completes.
pub struct Handshaken {
    pub send_next: u16,
    pub recv_next: u16,
    /// The peer's window as last advertised during the handshake; the
    /// session loop continues echoing this value until a data-phase segment
    /// updates it.
    pub peer_win: u16,
}

fn recv_segment(socket: &UdpSocket) -> Result<Segment, Error> {
    let mut buf = [0u8; crate::wire::MAX_SEGMENT];
    let n = socket.recv(&mut buf)?;
    let seg = Segment::decode(&buf[..n])
        .ok_or_else(|| Error::Handshake("parity-invalid or truncated segment".into()))?;
    diag::log(Tag::Recv, &seg);
    Ok(seg)
}

/// Like [`recv_segment`], but for the responder's very first receive, before
/// the socket has a connected peer: captures the sender's address so the
/// socket can be `connect()`ed to it for the rest of the session.
fn recv_segment_from(socket: &UdpSocket) -> Result<(Segment, std::net::SocketAddr), Error> {
    let mut buf = [0u8; crate::wire::MAX_SEGMENT];
    let (n, from) = socket.recv_from(&mut buf)?;
    let seg = Segment::decode(&buf[..n])
        .ok_or_else(|| Error::Handshake("parity-invalid or truncated segment".into()))?;
    diag::log(Tag::Recv, &seg);
    Ok((seg, from))
}

fn send_segment(socket: &UdpSocket, seg: &Segment) -> Result<(), Error> {
    let mut buf = [0u8; crate::wire::MAX_SEGMENT];
    let n = seg.encode(&mut buf);
    socket.send(&buf[..n])?;
    diag::log(Tag::Send, seg);
    Ok(())
}

/// Pick an initial sequence number in `[1, 1000]`, as the reference
/// implementation's `(rand() % 1000) + 1` does.
fn initial_seq(rng: &mut impl Rng) -> u16 {
    rng.gen_range(1..=1000)
}

/// Initiator side: S0 (send SYN) -> S1 (await SYN-ACK) -> Established (send ACK).
pub fn initiate(
    socket: &UdpSocket,
    rng: &mut impl Rng,
    mut read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    mut write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> Result<Handshaken, Error> {
    let client_seq = initial_seq(rng);

    let mut payload = vec![0u8; crate::wire::MAX_PAYLOAD];
    let n = read_app(&mut payload)?;
    payload.truncate(n);

    let syn = Segment::new(client_seq, 0, crate::wire::MAX_PAYLOAD as u16, FLAG_SYN, payload);
    send_segment(socket, &syn)?;

    let reply = recv_segment(socket)?;
    if !reply.is_syn() || !reply.is_ack() {
        return Err(Error::Handshake(format!(
            "expected SYN-ACK, got flags={}",
            crate::wire::FlagList(reply.flags)
        )));
    }
    let server_seq = reply.seq;
    if !reply.is_empty() {
        write_app(&reply.payload)?;
    }

    let mut payload = vec![0u8; crate::wire::MAX_PAYLOAD];
    let n = read_app(&mut payload)?;
    payload.truncate(n);

    let final_ack = Segment::new(
        client_seq.wrapping_add(1),
        server_seq.wrapping_add(1),
        crate::wire::MAX_PAYLOAD as u16,
        FLAG_ACK,
        payload,
    );
    send_segment(socket, &final_ack)?;

    Ok(Handshaken {
        // the SYN and the final ACK both consumed a sequence slot on this side.
        send_next: client_seq.wrapping_add(2),
        recv_next: server_seq.wrapping_add(1),
        peer_win: reply.win,
    })
}

/// Responder side: S0 (await SYN) -> S1 (send SYN-ACK) -> Established.
///
/// Unlike the initiator, the responder does not block on a final ACK; the
/// first post-handshake segment from the initiator serves that role (§4.2).
pub fn accept(
    socket: &UdpSocket,
    rng: &mut impl Rng,
    mut read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    mut write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> Result<Handshaken, Error> {
    let (syn, peer) = recv_segment_from(socket)?;
    // The SYN's source is the only place the peer's address is learned;
    // connect now so the SYN-ACK below and the whole session after it can
    // use the ordinary connected send()/recv() path.
    socket.connect(peer)?;
    if !syn.is_syn() {
        return Err(Error::Handshake(format!(
            "expected SYN, got flags={}",
            crate::wire::FlagList(syn.flags)
        )));
    }
    let client_seq = syn.seq;
    if !syn.is_empty() {
        write_app(&syn.payload)?;
    }

    let server_seq = initial_seq(rng);

    let mut payload = vec![0u8; crate::wire::MAX_PAYLOAD];
    let n = read_app(&mut payload)?;
    payload.truncate(n);

    let synack = Segment::new(
        server_seq,
        client_seq.wrapping_add(1),
        crate::wire::MAX_PAYLOAD as u16,
        FLAG_SYN | FLAG_ACK,
        payload,
    );
    send_segment(socket, &synack)?;

    Ok(Handshaken {
        send_next: server_seq.wrapping_add(1),
        recv_next: client_seq.wrapping_add(1),
        peer_win: syn.win,
    })
}

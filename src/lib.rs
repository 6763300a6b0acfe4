//! A reliable, ordered, unicast byte-stream transport over UDP: a three-way
//! handshake, a sliding-window send/receive engine, duplicate-ACK fast
//! retransmit, a fixed RTO timer, and a single-bit parity check.
//!
//! One process, one socket, one peer, one session (§2). Flow control beyond
//! echoing the peer's advertised window, congestion control, and connection
//! teardown are explicitly out of scope (§1).

use std::net::{SocketAddr, UdpSocket};

use rand::Rng;

mod diag;
mod err;
mod handshake;
mod io;
mod recv_buf;
mod send_buf;
mod session;
mod timer;
mod wire;

pub use err::Error;
pub use io::{stdin_reader, stdout_writer};
pub use session::Role;

/// Run the initiator side end to end: connect to `peer`, complete the
/// handshake, then drive the session loop until the process is killed or an
/// I/O error occurs.
pub fn run_initiator(
    socket: UdpSocket,
    peer: SocketAddr,
    read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> Result<(), Error> {
    socket.connect(peer)?;
    run_initiator_on(socket, &mut rand::thread_rng(), read_app, write_app)
}

/// Run the responder side end to end. `socket` must already be bound but
/// unconnected; the handshake connects it to whichever peer's SYN arrives
/// first (§4.2).
pub fn run_responder(
    socket: UdpSocket,
    read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> Result<(), Error> {
    run_responder_on(socket, &mut rand::thread_rng(), read_app, write_app)
}

/// Same as [`run_initiator`] but with an explicit RNG, for deterministic
/// handshake sequence numbers in tests (§9 design note).
pub fn run_initiator_on(
    socket: UdpSocket,
    rng: &mut impl Rng,
    mut read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    mut write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> Result<(), Error> {
    let handshaken = handshake::initiate(&socket, rng, &mut read_app, &mut write_app)?;
    let mut sess = session::Session::new(socket, Role::Initiator, handshaken)?;
    sess.run(read_app, write_app)
}

/// Same as [`run_responder`] but with an explicit RNG.
pub fn run_responder_on(
    socket: UdpSocket,
    rng: &mut impl Rng,
    mut read_app: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    mut write_app: impl FnMut(&[u8]) -> std::io::Result<()>,
) -> Result<(), Error> {
    let handshaken = handshake::accept(&socket, rng, &mut read_app, &mut write_app)?;
    let mut sess = session::Session::new(socket, Role::Responder, handshaken)?;
    sess.run(read_app, write_app)
}

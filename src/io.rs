//! The application-I/O boundary: `read_app`/`write_app` as injected closures
//! bound to a session at construction (§9 design note), plus the default
//! stdin/stdout adapter used by the `client`/`server` binaries.

use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};

/// Put `fd` into non-blocking mode without disturbing its other flags.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let current = fcntl(fd, FcntlArg::F_GETFL).map_err(nix_to_io)?;
    let mut flags = OFlag::from_bits_truncate(current);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(nix_to_io)?;
    Ok(())
}

fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Build the default `read_app` closure: a non-blocking read from stdin.
/// `n = 0` means "nothing available right now", matching the application
/// I/O contract in §6 — `WouldBlock` is not an error here.
pub fn stdin_reader() -> io::Result<impl FnMut(&mut [u8]) -> io::Result<usize>> {
    set_nonblocking(io::stdin().as_raw_fd())?;
    Ok(move |buf: &mut [u8]| match io::stdin().read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    })
}

/// Build the default `write_app` closure: bytes are written to stdout in
/// order as they are delivered.
pub fn stdout_writer() -> impl FnMut(&[u8]) -> io::Result<()> {
    move |buf: &[u8]| {
        let mut out = io::stdout();
        out.write_all(buf)?;
        out.flush()
    }
}

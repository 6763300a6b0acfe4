use std::net::{SocketAddr, UdpSocket};
use std::process::ExitCode;

use rdgram::{run_initiator, stdin_reader, stdout_writer, Error};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("client: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: client <hostname> <port>");
        return Err(Error::Args("expected <hostname> <port>".into()));
    }

    // Only localhost and dotted-quad addresses are supported, same as the
    // reference client (`strcmp(argv[1], "localhost") == 0`).
    let hostname = if args[1] == "localhost" {
        "127.0.0.1"
    } else {
        &args[1]
    };
    let port: u16 = args[2]
        .parse()
        .map_err(|_| Error::Args(format!("invalid port: {}", args[2])))?;

    let peer: SocketAddr = format!("{hostname}:{port}")
        .parse()
        .map_err(|_| Error::Args(format!("invalid hostname: {hostname}")))?;

    let socket = UdpSocket::bind("0.0.0.0:0")?;

    let read_app = stdin_reader()?;
    let write_app = stdout_writer();

    run_initiator(socket, peer, read_app, write_app)
}

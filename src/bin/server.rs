use std::net::UdpSocket;
use std::process::ExitCode;

use rdgram::{run_responder, stdin_reader, stdout_writer, Error};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("server: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: server <port>");
        return Err(Error::Args("expected <port>".into()));
    }

    let port: u16 = args[1]
        .parse()
        .map_err(|_| Error::Args(format!("invalid port: {}", args[1])))?;

    let socket = UdpSocket::bind(("0.0.0.0", port))?;

    let read_app = stdin_reader()?;
    let write_app = stdout_writer();

    run_responder(socket, read_app, write_app)
}

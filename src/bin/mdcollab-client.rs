//! Client binary (spec.md §6): `mdcollab-client <server_pid> <username>`.
//!
//! Connects to the server's Unix domain socket, performs the handshake
//! of spec.md §4.D, prints the initial document, then forwards stdin
//! lines as commands while a background thread prints broadcasts and
//! replies as they arrive.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use anyhow::{bail, Context, Result};

use mdcollab::config::Config;

fn main() -> Result<()> {
    env_logger::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let server_pid: u32 = args
        .next()
        .context("usage: mdcollab-client <server_pid> <username>")?
        .parse()
        .context("server_pid must be a positive integer")?;
    let username = args.next().context("usage: mdcollab-client <server_pid> <username>")?;

    let config = Config::from_args(None);
    let socket_path = config.socket_path(server_pid);
    let mut stream = UnixStream::connect(&socket_path)
        .with_context(|| format!("failed to connect to {socket_path:?}"))?;

    writeln!(stream, "{username}")?;

    let mut reader = BufReader::new(stream.try_clone().context("cloning socket for reading")?);

    let mut first_line = String::new();
    if reader.read_line(&mut first_line)? == 0 {
        bail!("server closed the connection during handshake");
    }
    let first_line = first_line.trim_end_matches(['\r', '\n']);
    if first_line == "Reject UNAUTHORISED" {
        bail!("server rejected {username:?}: unknown user");
    }
    let role = first_line;

    let mut version_line = String::new();
    reader.read_line(&mut version_line)?;
    let version: u64 = version_line.trim().parse().context("malformed version in handshake")?;

    let mut len_line = String::new();
    reader.read_line(&mut len_line)?;
    let len: usize = len_line.trim().parse().context("malformed snapshot length in handshake")?;

    let mut snapshot = vec![0u8; len];
    std::io::Read::read_exact(&mut reader, &mut snapshot)?;
    let mut trailing_newline = [0u8; 1];
    let _ = std::io::Read::read_exact(&mut reader, &mut trailing_newline);

    println!("connected as {username} (role={role}, version={version})");
    println!("--- document ---");
    println!("{}", String::from_utf8_lossy(&snapshot));
    println!("----------------");

    let listener_handle = thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => print!("{line}"),
                Err(_) => break,
            }
        }
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        writeln!(stream, "{line}")?;
        if line.trim() == "DISCONNECT" {
            break;
        }
    }

    let _ = listener_handle.join();
    Ok(())
}

//! Prints every line read from stdin or from a TCP peer, through a bounded reader.
//!
//! Usage:
//! - `printf 'one\ntwo\n' | cargo run -p line_reader --example tail_lines`
//! - `cargo run -p line_reader --example tail_lines -- 127.0.0.1:7000 "HELLO"`
//!   (connects, sends the optional greeting line, then prints what the peer sends)
//!
//! Environment:
//! - `RUST_LOG` (optional): e.g. `RUST_LOG=line_reader=trace` to see chunk sizes.
//! - `TAIL_LINES_MAX_BYTES` (optional): byte ceiling of the reader buffer.

use std::{
    env,
    error::Error,
    io::{self, Write},
    net::TcpStream,
    os::fd::AsFd,
};

use line_reader::{
    BoundedAsyncReader, ClientError, FdSource, LineClient, ReadMode, ReaderConfig, ReaderError,
    SourceFailure,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut builder = ReaderConfig::builder().worker_name("tail-lines");
    if let Ok(raw) = env::var("TAIL_LINES_MAX_BYTES") {
        builder = builder.max_buffered_bytes(raw.parse()?);
    }
    let config = builder.build()?;

    let mut args = env::args().skip(1);
    match args.next() {
        Some(addr) => tail_tcp(&addr, args.next(), config),
        None => tail_stdin(config),
    }
}

fn tail_stdin(config: ReaderConfig) -> Result<(), Box<dyn Error>> {
    let reader = BoundedAsyncReader::new(config);
    reader.start(FdSource::duplicate(io::stdin().as_fd(), ReadMode::Stream)?)?;

    let mut stdout = io::stdout().lock();
    let mut count = 0usize;
    loop {
        match reader.get_line() {
            Ok(line) => {
                count += 1;
                writeln!(stdout, "{count:>6}  {}", String::from_utf8_lossy(&line))?;
            }
            Err(ReaderError::Source(SourceFailure::EndOfStream)) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let mut tail = Vec::with_capacity(reader.chars_ready());
    while reader.chars_ready() > 0 {
        tail.push(reader.get_char()?);
    }
    if !tail.is_empty() {
        writeln!(stdout, "  tail  {}", String::from_utf8_lossy(&tail))?;
    }
    reader.stop()?;
    Ok(())
}

fn tail_tcp(
    addr: &str,
    greeting: Option<String>,
    config: ReaderConfig,
) -> Result<(), Box<dyn Error>> {
    let stream = TcpStream::connect(addr)?;
    let mut client = LineClient::connected(stream, config)?;
    if let Some(greeting) = greeting {
        client.send_line(greeting.as_bytes())?;
    }

    loop {
        match client.get_line_string() {
            Ok(line) => println!("{line}"),
            Err(ClientError::Reader(ReaderError::Source(SourceFailure::EndOfStream))) => break,
            Err(err) => return Err(err.into()),
        }
    }
    client.disconnect()?;
    Ok(())
}

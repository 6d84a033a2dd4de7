//! Main entry point for the sigstream CLI application.
//!
//! Opens a local file or HTTP URL as a [`SignatureStream`] and either scans it
//! for a signature, hex dumps a range, or prints its size.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sigstream::{
    CancelToken, CancellableStream, Cli, HttpRangeStream, LocalFileStream, Progress,
    SignatureStream,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let stream: Box<dyn SignatureStream> = if cli.is_http_url() {
        let mut reader = HttpRangeStream::connect(cli.source.clone())
            .with_context(|| format!("cannot open {}", cli.source))?;
        if let Some(cache_size) = cli.cache_size {
            reader = reader.with_cache_size(cache_size);
        }
        Box::new(reader)
    } else {
        let mut reader = LocalFileStream::open(Path::new(&cli.source))
            .with_context(|| format!("cannot open {}", cli.source))?;
        if let Some(cache_size) = cli.cache_size {
            reader = reader.with_cache_size(cache_size);
        }
        Box::new(reader)
    };

    let token = CancelToken::new();
    let mut stream = CancellableStream::new(stream, token.clone());

    if let Some(signature) = cli.signature {
        scan(&mut stream, signature, &cli, &token)
    } else if let Some(offset) = cli.read {
        dump(&mut stream, offset, cli.count)
    } else {
        let size = stream.file_size()?;
        println!("size:       {} ({})", size, format_size(size));
        println!("cache hint: {}", format_size(stream.cache_size_hint() as u64));
        Ok(())
    }
}

/// Print the offset of the first (or, with `--all`, every) occurrence.
///
/// Between hits the stream is asked for permission to continue; `--limit`
/// cancels the token once enough hits were printed.
fn scan<S: SignatureStream>(
    stream: &mut S,
    signature: u32,
    cli: &Cli,
    token: &CancelToken,
) -> Result<()> {
    let total = stream.file_size()?;
    let mut from = cli.from;
    let mut hits = 0u64;

    while let Some(hit) = stream.scan_for_signature(from, signature)? {
        println!("{hit:#012x}  {hit}");
        hits += 1;

        if !cli.all {
            break;
        }
        if cli.limit.is_some_and(|limit| hits >= limit) {
            token.cancel();
        }
        if stream.report_progress(hit + 4, total) == Progress::Abort {
            debug!(hits, "scan stopped");
            break;
        }
        from = hit + 1;
    }

    if hits == 0 && !cli.quiet {
        eprintln!("signature {signature:08X} not found after offset {}", cli.from);
    }

    Ok(())
}

/// Hex dump `count` bytes at `offset`, 16 per line.
fn dump<S: SignatureStream>(stream: &mut S, offset: u64, count: usize) -> Result<()> {
    let mut buf = stream
        .allocate(count)
        .with_context(|| format!("cannot allocate {count} bytes"))?;
    let n = stream.read_at(offset, &mut buf)?;

    for (line, chunk) in buf[..n].chunks(16).enumerate() {
        println!("{}", format_line(offset + line as u64 * 16, chunk));
    }

    stream.release(Some(buf));
    Ok(())
}

/// Format one hex dump line: offset, hex bytes, printable ASCII.
fn format_line(offset: u64, chunk: &[u8]) -> String {
    let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
    let ascii: String = chunk
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();
    format!("{offset:08x}  {:<47}  |{ascii}|", hex.join(" "))
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

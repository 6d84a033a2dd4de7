use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sigstream")]
#[command(version)]
#[command(about = "Probe local files or HTTP URLs for byte signatures", long_about = None)]
#[command(after_help = "Examples:\n  \
  sigstream movie.mkv -s 1A45DFA3          find the EBML header\n  \
  sigstream dump.ts -s 0x47000000 -a      list every occurrence\n  \
  sigstream -r 0 -n 32 https://example.com/clip.mp4   hex dump a remote range")]
pub struct Cli {
    /// File path or HTTP URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Scan for a 4-byte big-endian signature given in hex
    #[arg(short = 's', long = "scan", value_name = "HEX", value_parser = parse_signature)]
    pub signature: Option<u32>,

    /// Offset the scan starts from
    #[arg(long = "from", value_name = "OFFSET", default_value_t = 0)]
    pub from: u64,

    /// Report every occurrence instead of the first
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Stop after this many occurrences (with --all)
    #[arg(
        long = "limit",
        value_name = "N",
        requires = "all",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub limit: Option<u64>,

    /// Hex dump bytes starting at OFFSET
    #[arg(short = 'r', long = "read", value_name = "OFFSET", conflicts_with = "signature")]
    pub read: Option<u64>,

    /// Number of bytes to dump
    #[arg(short = 'n', long = "count", value_name = "N", default_value_t = 16)]
    pub count: usize,

    /// Read-ahead size advertised to callers, also the scan chunk size
    #[arg(long = "cache-size", value_name = "BYTES")]
    pub cache_size: Option<usize>,

    /// Quiet mode
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Verbose logging (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Parse a signature such as `1A45DFA3` or `0x1a45dfa3`.
pub fn parse_signature(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("expected 1 to 8 hex digits, got {s:?}"));
    }
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid signature {s:?}: {e}"))
}

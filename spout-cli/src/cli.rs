//! Command-line argument definitions.

use clap::Parser;
use spout::DataKind;
use uuid::Uuid;

/// Receive a LimaCharlie output stream and print each message to stdout.
#[derive(Parser, Debug)]
#[command(name = "lc-spout", version, about)]
pub struct Args {
    /// The organization id (OID) to authenticate as.
    #[arg(value_parser = parse_oid)]
    pub oid: String,

    /// The type of data to receive: "event", "detect" or "audit".
    pub data_type: DataKind,

    /// Only receive events marked with this investigation id.
    #[arg(short = 'i', long = "investigation-id")]
    pub inv_id: Option<String>,

    /// Only receive events from sensors tagged with this tag.
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only receive detections from this category.
    #[arg(short, long = "category")]
    pub cat: Option<String>,

    /// Print raw lines without JSON decoding.
    #[arg(long)]
    pub raw: bool,

    /// Maximum number of messages buffered before drops occur.
    #[arg(long, default_value_t = spout::config::DEFAULT_MAX_BUFFER)]
    pub buffer: usize,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_oid(s: &str) -> Result<String, uuid::Error> {
    Ok(Uuid::parse_str(s)?.to_string())
}

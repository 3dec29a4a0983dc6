use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open capture file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown magic number {magic:#010x} (not a valid pcap/pcapng file)")]
    UnknownFormat { magic: u32 },

    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),

    #[error("cannot encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot truncate timestamp to interval: {0}")]
    Interval(#[from] chrono::RoundingError),
}

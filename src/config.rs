use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::parser::ClassifierKind;
use crate::tracker::TrackerLimits;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain live lines and an aligned table.
    #[default]
    Text,
    /// One JSON object per line: connections, then the report.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "table" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Width of each aggregation bucket.
    pub interval: Duration,
    pub limits: TrackerLimits,
    pub classifier: ClassifierKind,
    pub format: OutputFormat,
    /// Events buffered between the decoder thread and the correlator.
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interval: DEFAULT_INTERVAL,
            limits: TrackerLimits::default(),
            classifier: ClassifierKind::default(),
            format: OutputFormat::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "aggregation interval must be strictly positive".into(),
            ));
        }
        if self.limits.pending_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::InvalidConfig(
                "pending request TTL must be strictly positive".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

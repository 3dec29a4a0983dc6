use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use httplat::config::{Config, OutputFormat, DEFAULT_CHANNEL_CAPACITY};
use httplat::parser::ClassifierKind;
use httplat::tracker::TrackerLimits;
use httplat::{analyze_capture, Error, Result};

#[derive(Parser)]
#[command(name = "httplat")]
#[command(about = "Per-URL HTTP response latency from a pcap/pcapng capture")]
#[command(version)]
struct Cli {
    /// Capture file (pcap or pcapng)
    capture: PathBuf,

    /// Aggregation interval in seconds
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Keep at most this many unanswered requests (default: unbounded)
    #[arg(long)]
    max_pending: Option<usize>,

    /// Forget unanswered requests older than this many seconds of trace time
    #[arg(long)]
    pending_ttl: Option<u64>,

    /// Payload classifier: prefix (GET / 200 OK string match) or httparse
    #[arg(long, default_value = "prefix")]
    classifier: ClassifierKind,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let max_pending = match self.max_pending {
            Some(n) => Some(NonZeroUsize::new(n).ok_or_else(|| {
                Error::InvalidConfig("--max-pending must be at least 1".into())
            })?),
            None => None,
        };
        let config = Config {
            interval: Duration::from_secs(self.interval),
            limits: TrackerLimits {
                max_pending,
                pending_ttl: self.pending_ttl.map(Duration::from_secs),
            },
            classifier: self.classifier,
            format: self.format,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    }) {
        warn!("cannot install Ctrl-C handler: {}", e);
    }

    info!(
        capture = %cli.capture.display(),
        interval_secs = cli.interval,
        classifier = ?config.classifier,
        "analyzing capture"
    );

    let stdout = io::stdout();
    let report = analyze_capture(&cli.capture, &config, stdout.lock(), running.clone())?;
    if !running.load(Ordering::SeqCst) {
        warn!("interrupted, reporting partial results");
    }

    let stats = &report.stats;
    info!(
        packets = stats.decode.packets,
        events = stats.events,
        connections = stats.connections,
        misses = stats.misses,
        rejected = stats.rejected,
        dropped = stats.requests_dropped,
        clock_anomalies = stats.clock_anomalies,
        evicted = stats.evicted,
        still_pending = stats.still_pending,
        "summary"
    );

    let mut out = stdout.lock();
    match config.format {
        OutputFormat::Text => report.write_table(&mut out)?,
        OutputFormat::Json => report.write_json(&mut out)?,
    }
    out.flush()?;
    Ok(())
}

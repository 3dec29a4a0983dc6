use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::config::{Config, OutputFormat};
use crate::correlator::{Correlator, Outcome};
use crate::error::Result;
use crate::parser::HttpEvent;
use crate::report::{self, Report};
use crate::sniff::{self, DecodeStats};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events: u64,
    pub requests_tracked: u64,
    pub requests_dropped: u64,
    pub connections: u64,
    pub misses: u64,
    pub rejected: u64,
    pub clock_anomalies: u64,
    pub evicted: u64,
    pub still_pending: u64,
    pub decode: DecodeStats,
}

/// Owns all correlation and aggregation state for one trace.
///
/// Events must be fed from a single thread in capture order.
pub struct Pipeline<W: Write> {
    correlator: Correlator,
    aggregator: Aggregator,
    live: W,
    format: OutputFormat,
    stats: PipelineStats,
}

impl<W: Write> Pipeline<W> {
    pub fn new(config: &Config, live: W) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            correlator: Correlator::new(config.limits),
            aggregator: Aggregator::new(config.interval)?,
            live,
            format: config.format,
            stats: PipelineStats::default(),
        })
    }

    pub fn process(&mut self, event: HttpEvent) -> Result<()> {
        self.stats.events += 1;
        match self.correlator.handle(event) {
            Outcome::Tracked => self.stats.requests_tracked += 1,
            Outcome::Dropped => self.stats.requests_dropped += 1,
            Outcome::Rejected => self.stats.rejected += 1,
            Outcome::ClockAnomaly { .. } => self.stats.clock_anomalies += 1,
            Outcome::Miss { source } => {
                self.stats.misses += 1;
                match self.format {
                    OutputFormat::Text => writeln!(self.live, "{}", report::miss_line(source))?,
                    OutputFormat::Json => info!(%source, "request not found"),
                }
            }
            Outcome::Matched {
                sequence,
                connection,
            } => {
                self.stats.connections += 1;
                match self.format {
                    OutputFormat::Text => {
                        writeln!(self.live, "{}", report::live_line(sequence, &connection))?
                    }
                    OutputFormat::Json => {
                        writeln!(self.live, "{}", report::live_json(sequence, &connection)?)?
                    }
                }
                if let Err(e) = self.aggregator.fold(&connection) {
                    warn!(url = %connection.url, error = %e, "connection left out of aggregation");
                }
            }
        }
        Ok(())
    }

    pub fn run<I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = HttpEvent>,
    {
        for event in events {
            self.process(event)?;
        }
        Ok(())
    }

    /// Drains `rx` until every sender is gone.
    pub fn run_channel(&mut self, rx: Receiver<HttpEvent>) -> Result<()> {
        self.run(rx)
    }

    pub fn finalize(mut self) -> Result<Report> {
        self.live.flush()?;
        let mut stats = self.stats;
        stats.evicted = self.correlator.evicted();
        stats.still_pending = self.correlator.pending() as u64;
        Ok(Report {
            interval: self.aggregator.interval(),
            buckets: self.aggregator.into_buckets(),
            stats,
        })
    }
}

/// Analyzes a capture file end to end.
///
/// Decoding and classification run on a separate thread; events reach the
/// pipeline one at a time, in capture order, through a bounded channel.
/// Clearing `running` stops decoding early and reports what was seen so far.
pub fn analyze_capture<W: Write>(
    path: &Path,
    config: &Config,
    live: W,
    running: Arc<AtomicBool>,
) -> Result<Report> {
    let mut pipeline = Pipeline::new(config, live)?;
    sniff::CaptureFormat::sniff(path)?;

    let (tx, rx) = bounded(config.channel_capacity);
    let decoder = sniff::spawn_decoder(
        path.to_path_buf(),
        config.classifier.build(),
        tx,
        running,
    );

    let consumed = pipeline.run_channel(rx);
    let decoded = match decoder.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    };
    consumed?;
    let decode = decoded?;

    let mut report = pipeline.finalize()?;
    report.stats.decode = decode;
    info!(
        connections = report.stats.connections,
        misses = report.stats.misses,
        buckets = report.buckets.len(),
        "analysis complete"
    );
    Ok(report)
}

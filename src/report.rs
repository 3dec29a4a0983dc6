//! Live log lines and the final per-interval report.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::SecondsFormat;

use crate::error::Result;
use crate::models::domain::{AggregationBucket, Connection};
use crate::models::dto::{BucketDTO, ConnectionDTO, ReportDTO};
use crate::pipeline::PipelineStats;

const TIMESTAMP_WIDTH: usize = 20;
const URL_WIDTH: usize = 40;
const COUNT_WIDTH: usize = 15;
const RULE_WIDTH: usize = 105;

/// `<seq> [<rfc3339>] <src> -> <dst> | <latency> | <url>`
pub fn live_line(sequence: u64, conn: &Connection) -> String {
    format!(
        "{} [{}] {} -> {} | {:?} | {}",
        sequence,
        conn.connected_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        conn.source,
        conn.destination,
        conn.latency,
        conn.url
    )
}

pub fn miss_line(source: SocketAddr) -> String {
    format!("Request not found for source {source}")
}

pub fn live_json(sequence: u64, conn: &Connection) -> Result<String> {
    Ok(serde_json::to_string(&ConnectionDTO::new(sequence, conn))?)
}

/// Final state of a run: buckets in creation order plus counters.
#[derive(Debug, Clone)]
pub struct Report {
    pub interval: Duration,
    pub buckets: Vec<AggregationBucket>,
    pub stats: PipelineStats,
}

impl Report {
    pub fn to_dto(&self) -> ReportDTO {
        ReportDTO {
            interval_seconds: self.interval.as_secs_f64(),
            buckets: self.buckets.iter().map(BucketDTO::from).collect(),
            stats: self.stats.clone(),
        }
    }

    /// Renders the table, one heading row per distinct interval label.
    pub fn render_table(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let label_format = if self.interval.as_secs() % 60 == 0 && self.interval.subsec_nanos() == 0 {
            "%Y-%m-%d %H:%M"
        } else {
            "%Y-%m-%d %H:%M:%S"
        };

        lines.push(String::new());
        lines.push("Aggregated Connections by URL:".to_string());
        lines.push(row("Timestamp", "URL", "Connections No.", "Average Response Time"));
        lines.push("-".repeat(RULE_WIDTH));

        let mut last_label: Option<String> = None;
        for bucket in &self.buckets {
            let label = bucket.interval_start().format(label_format).to_string();
            if last_label.as_deref() != Some(label.as_str()) {
                lines.push(row(&label, "", "", ""));
                last_label = Some(label);
            }
            lines.push(row(
                "",
                bucket.url(),
                &bucket.count().to_string(),
                &format!("{:?}", bucket.mean_latency()),
            ));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_dto())?)
    }

    pub fn write_table<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(self.render_table().as_bytes())?;
        Ok(())
    }

    pub fn write_json<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{}", self.render_json()?)?;
        Ok(())
    }
}

fn row(timestamp: &str, url: &str, count: &str, mean: &str) -> String {
    let line = format!(
        "{:<tw$} | {:<uw$} | {:<cw$} | {}",
        timestamp,
        url,
        count,
        mean,
        tw = TIMESTAMP_WIDTH,
        uw = URL_WIDTH,
        cw = COUNT_WIDTH
    );
    line.trim_end().to_string()
}

pub mod domain {
    use std::net::SocketAddr;
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use crate::flow::FlowKey;

    /// A GET seen on a flow, waiting for its response.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PendingRequest {
        pub flow: FlowKey,
        pub source: SocketAddr,
        pub destination: SocketAddr,
        pub requested_at: DateTime<Utc>,
        pub url: String,
    }

    /// A request matched with its successful response.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Connection {
        pub source: SocketAddr,
        pub destination: SocketAddr,
        pub connected_at: DateTime<Utc>,
        pub latency: Duration,
        pub url: String,
    }

    /// Latency statistics for one (interval, URL) pair.
    #[derive(Debug, Clone, PartialEq)]
    pub struct AggregationBucket {
        pub(crate) interval_start: DateTime<Utc>,
        pub(crate) url: String,
        pub(crate) mean_nanos: f64,
        pub(crate) count: u64,
    }

    impl AggregationBucket {
        pub(crate) fn open(interval_start: DateTime<Utc>, connection: &Connection) -> Self {
            AggregationBucket {
                interval_start,
                url: connection.url.clone(),
                mean_nanos: connection.latency.as_nanos() as f64,
                count: 1,
            }
        }

        pub(crate) fn add(&mut self, latency: Duration) {
            self.count += 1;
            let sample = latency.as_nanos() as f64;
            self.mean_nanos += (sample - self.mean_nanos) / self.count as f64;
        }

        pub fn interval_start(&self) -> DateTime<Utc> {
            self.interval_start
        }

        pub fn url(&self) -> &str {
            &self.url
        }

        pub fn count(&self) -> u64 {
            self.count
        }

        pub fn mean_latency(&self) -> Duration {
            Duration::from_nanos(self.mean_nanos.round().max(0.0) as u64)
        }

        /// Unrounded running mean, in nanoseconds.
        pub fn mean_nanos(&self) -> f64 {
            self.mean_nanos
        }
    }
}

pub mod dto {
    use serde::Serialize;

    use super::domain::{AggregationBucket, Connection};
    use crate::pipeline::PipelineStats;

    #[derive(Debug, Serialize, Clone)]
    pub struct ConnectionDTO {
        pub sequence: u64,
        pub timestamp: String,
        pub source: String,
        pub destination: String,
        pub latency_ms: f64,
        pub url: String,
    }

    impl ConnectionDTO {
        pub fn new(sequence: u64, conn: &Connection) -> Self {
            ConnectionDTO {
                sequence,
                timestamp: conn.connected_at.to_rfc3339(),
                source: conn.source.to_string(),
                destination: conn.destination.to_string(),
                latency_ms: conn.latency.as_secs_f64() * 1000.0,
                url: conn.url.clone(),
            }
        }
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct BucketDTO {
        pub interval_start: String,
        pub url: String,
        pub connections: u64,
        pub mean_latency_ms: f64,
    }

    impl From<&AggregationBucket> for BucketDTO {
        fn from(bucket: &AggregationBucket) -> Self {
            BucketDTO {
                interval_start: bucket.interval_start().to_rfc3339(),
                url: bucket.url().to_string(),
                connections: bucket.count(),
                mean_latency_ms: bucket.mean_nanos() / 1_000_000.0,
            }
        }
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct ReportDTO {
        pub interval_seconds: f64,
        pub buckets: Vec<BucketDTO>,
        pub stats: PipelineStats,
    }
}

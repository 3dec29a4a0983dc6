use std::time::Duration;

use chrono::{DateTime, RoundingError, TimeDelta, Utc};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::models::domain::{AggregationBucket, Connection};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    interval_start: DateTime<Utc>,
    url: String,
}

/// Folds connections into fixed-width, epoch-aligned (interval, URL) buckets.
///
/// Buckets are kept in creation order; the key map only indexes into that
/// sequence and never reorders it.
pub struct Aggregator {
    interval: TimeDelta,
    index: FxHashMap<BucketKey, usize>,
    buckets: Vec<AggregationBucket>,
}

impl Aggregator {
    pub fn new(interval: Duration) -> Result<Self> {
        let interval = TimeDelta::from_std(interval)
            .ok()
            .filter(|d| *d > TimeDelta::zero())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("interval must be positive, got {interval:?}"))
            })?;
        Ok(Aggregator {
            interval,
            index: FxHashMap::default(),
            buckets: Vec::new(),
        })
    }

    pub fn interval(&self) -> Duration {
        // Validated positive in `new`.
        self.interval.to_std().unwrap_or_default()
    }

    /// Start of the interval containing `ts`: the nearest lower multiple of
    /// the interval since the Unix epoch.
    pub fn interval_start(&self, ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let span = self
            .interval
            .num_nanoseconds()
            .ok_or(RoundingError::DurationExceedsLimit)?;
        let stamp = ts
            .timestamp_nanos_opt()
            .ok_or(RoundingError::TimestampExceedsLimit)?;
        Ok(DateTime::from_timestamp_nanos(stamp - stamp.rem_euclid(span)))
    }

    pub fn fold(&mut self, connection: &Connection) -> Result<()> {
        let key = BucketKey {
            interval_start: self.interval_start(connection.connected_at)?,
            url: connection.url.clone(),
        };

        match self.index.get(&key) {
            Some(&slot) => self.buckets[slot].add(connection.latency),
            None => {
                self.buckets
                    .push(AggregationBucket::open(key.interval_start, connection));
                self.index.insert(key, self.buckets.len() - 1);
            }
        }
        Ok(())
    }

    pub fn buckets(&self) -> &[AggregationBucket] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<AggregationBucket> {
        self.buckets
    }
}

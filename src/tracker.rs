use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::flow::FlowKey;
use crate::models::domain::PendingRequest;

/// Optional bounds on how many unanswered requests are retained.
///
/// Both default to `None`: unanswered requests stay until overwritten by a
/// newer request on the same flow or until the trace ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerLimits {
    pub max_pending: Option<NonZeroUsize>,
    pub pending_ttl: Option<Duration>,
}

impl TrackerLimits {
    fn is_bounded(&self) -> bool {
        self.max_pending.is_some() || self.pending_ttl.is_some()
    }
}

struct Slot {
    generation: u64,
    request: PendingRequest,
}

/// Last-request-wins store of pending requests, one per flow.
///
/// Owned by a single writer; every mutation goes through `put`,
/// `take_and_remove` or `expire`.
pub struct RequestTracker {
    pending: FxHashMap<FlowKey, Slot>,
    // Insertion order for eviction; entries whose generation no longer
    // matches the live slot are stale and skipped.
    order: VecDeque<(u64, DateTime<Utc>, FlowKey)>,
    next_generation: u64,
    limits: TrackerLimits,
    evicted: u64,
}

impl RequestTracker {
    pub fn new(limits: TrackerLimits) -> Self {
        RequestTracker {
            pending: FxHashMap::default(),
            order: VecDeque::new(),
            next_generation: 0,
            limits,
            evicted: 0,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(TrackerLimits::default())
    }

    /// Stores `request` for `key`, replacing any request already pending there.
    pub fn put(&mut self, key: FlowKey, request: PendingRequest) {
        let generation = self.next_generation;
        self.next_generation += 1;

        if self.limits.is_bounded() {
            self.order
                .push_back((generation, request.requested_at, key));
        }
        if let Some(previous) = self.pending.insert(key, Slot { generation, request }) {
            debug!(flow = %key, url = %previous.request.url, "pending request superseded");
        }

        if let Some(max) = self.limits.max_pending {
            while self.pending.len() > max.get() {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        self.compact();
    }

    /// Removes and returns the request pending for `key`, if any.
    pub fn take_and_remove(&mut self, key: &FlowKey) -> Option<PendingRequest> {
        self.pending.remove(key).map(|slot| slot.request)
    }

    /// Evicts requests issued before `now - pending_ttl`. No-op without a TTL.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let Some(ttl) = self.limits.pending_ttl else {
            return;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return;
        };
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return;
        };

        while let Some(&(_, requested_at, _)) = self.order.front() {
            if requested_at >= cutoff {
                break;
            }
            self.evict_oldest();
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of requests dropped by the configured limits so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    // Pops the front of the order queue, evicting it if still live.
    // Returns false once the queue is exhausted.
    fn evict_oldest(&mut self) -> bool {
        let Some((generation, _, key)) = self.order.pop_front() else {
            return false;
        };
        let live = self
            .pending
            .get(&key)
            .is_some_and(|slot| slot.generation == generation);
        if live {
            if let Some(slot) = self.pending.remove(&key) {
                self.evicted += 1;
                debug!(flow = %key, url = %slot.request.url, "evicted unanswered request");
            }
        }
        true
    }

    fn compact(&mut self) {
        if self.order.len() <= 2 * self.pending.len() + 64 {
            return;
        }
        let pending = &self.pending;
        self.order.retain(|(generation, _, key)| {
            pending
                .get(key)
                .is_some_and(|slot| slot.generation == *generation)
        });
    }
}

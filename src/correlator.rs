//! Request/response correlation.
//!
//! Each flow is either idle or awaiting a response. A request moves the
//! flow to awaiting (replacing any older request); a response on the
//! mirrored flow consumes the pending request and, when successful and
//! causally ordered, yields a [`Connection`].

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::flow::FlowKey;
use crate::models::domain::{Connection, PendingRequest};
use crate::parser::{extract_url, HttpEvent, RequestEvent, ResponseEvent};
use crate::tracker::{RequestTracker, TrackerLimits};

/// What a single event did to the correlator's state.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Request stored as pending for its flow.
    Tracked,
    /// Request without a usable path or Host header; ignored.
    Dropped,
    /// Response matched a pending request.
    Matched { sequence: u64, connection: Connection },
    /// Response with nothing pending on its flow.
    Miss { source: SocketAddr },
    /// Pending request consumed by a non-success response.
    Rejected,
    /// Response timestamped before its request; request consumed, nothing emitted.
    ClockAnomaly {
        flow: FlowKey,
        requested_at: DateTime<Utc>,
        responded_at: DateTime<Utc>,
    },
}

pub struct Correlator {
    tracker: RequestTracker,
    next_sequence: u64,
}

impl Correlator {
    pub fn new(limits: TrackerLimits) -> Self {
        Correlator {
            tracker: RequestTracker::new(limits),
            next_sequence: 1,
        }
    }

    /// Events must arrive in capture order; nothing is reordered here.
    pub fn handle(&mut self, event: HttpEvent) -> Outcome {
        self.tracker.expire(event.timestamp());
        match event {
            HttpEvent::Request(req) => self.on_request(req),
            HttpEvent::Response(resp) => self.on_response(resp),
        }
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn evicted(&self) -> u64 {
        self.tracker.evicted()
    }

    fn on_request(&mut self, req: RequestEvent) -> Outcome {
        let Some(url) = extract_url(&req.request_line, &req.header_lines) else {
            debug!(src = %req.source, line = %req.request_line, "request without path or host");
            return Outcome::Dropped;
        };

        let flow = FlowKey::of_request(req.source, req.destination);
        self.tracker.put(
            flow,
            PendingRequest {
                flow,
                source: req.source,
                destination: req.destination,
                requested_at: req.timestamp,
                url,
            },
        );
        Outcome::Tracked
    }

    fn on_response(&mut self, resp: ResponseEvent) -> Outcome {
        let flow = FlowKey::of_response(resp.source, resp.destination);
        let Some(pending) = self.tracker.take_and_remove(&flow) else {
            return Outcome::Miss {
                source: resp.source,
            };
        };

        if !resp.is_success {
            debug!(%flow, status = %resp.status_line, "request answered without success");
            return Outcome::Rejected;
        }

        let latency = match (resp.timestamp - pending.requested_at).to_std() {
            Ok(latency) => latency,
            Err(_) => {
                warn!(
                    %flow,
                    requested_at = %pending.requested_at,
                    responded_at = %resp.timestamp,
                    "response precedes its request, latency discarded"
                );
                return Outcome::ClockAnomaly {
                    flow,
                    requested_at: pending.requested_at,
                    responded_at: resp.timestamp,
                };
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Outcome::Matched {
            sequence,
            connection: Connection {
                source: pending.source,
                destination: pending.destination,
                connected_at: pending.requested_at,
                latency,
                url: pending.url,
            },
        }
    }
}

//! Single consumer of upstream replies.
//!
//! Each inbound frame is resolved against the correlation store. A match is
//! claimed by deleting it before delivery, so a reply racing the caller's
//! timeout is delivered at most once.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use wsrelay_core::CorrelationStore;
use wsrelay_core::message::{correlation_id_of, parse_object, restore_id};

use crate::metrics::{PENDING_REQUESTS, UPSTREAM_FRAMES_TOTAL};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Claimed and handed to the waiting caller.
    Delivered,
    /// No id, unknown id, or another path claimed the request first.
    Unmatched,
    /// Not a JSON object.
    Malformed,
    /// Claimed, but the caller had already stopped waiting.
    Abandoned,
}

impl DispatchOutcome {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Unmatched => "unmatched",
            Self::Malformed => "malformed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Per-outcome counts for one dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames delivered to a waiting caller.
    pub delivered: u64,
    /// Frames with no matching request.
    pub unmatched: u64,
    /// Frames that were not JSON objects.
    pub malformed: u64,
    /// Frames claimed after their caller left.
    pub abandoned: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Delivered => &mut self.delivered,
            DispatchOutcome::Unmatched => &mut self.unmatched,
            DispatchOutcome::Malformed => &mut self.malformed,
            DispatchOutcome::Abandoned => &mut self.abandoned,
        };
        *counter += 1;
    }

    /// Frames processed.
    pub fn total(&self) -> u64 {
        self.delivered + self.unmatched + self.malformed + self.abandoned
    }
}

/// Routes upstream replies to waiting callers.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<CorrelationStore>,
}

impl Dispatcher {
    /// Create a dispatcher over `store`.
    pub fn new(store: Arc<CorrelationStore>) -> Self {
        Self { store }
    }

    /// Resolve one upstream frame. Never blocks.
    pub fn handle_message(&self, text: &str) -> DispatchOutcome {
        let mut frame = match parse_object(text.as_bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed upstream frame");
                return DispatchOutcome::Malformed;
            }
        };

        let Some(cid) = correlation_id_of(&frame) else {
            debug!("upstream frame without correlation id");
            return DispatchOutcome::Unmatched;
        };

        if self.store.get(cid.as_str()).is_none() {
            debug!(correlation_id = %cid, "no pending request for upstream frame");
            return DispatchOutcome::Unmatched;
        }

        // Claim before delivering; losing the claim means the caller timed out.
        let Some(pending) = self.store.delete(cid.as_str()) else {
            debug!(correlation_id = %cid, "pending request claimed elsewhere");
            return DispatchOutcome::Unmatched;
        };

        restore_id(&mut frame, pending.original_id());
        if pending.complete(Value::Object(frame)) {
            trace!(correlation_id = %cid, "reply delivered");
            DispatchOutcome::Delivered
        } else {
            debug!(correlation_id = %cid, "caller gone before reply arrived");
            DispatchOutcome::Abandoned
        }
    }

    /// Consume `inbound` until it ends.
    pub async fn run<S>(&self, mut inbound: S) -> DispatchStats
    where
        S: Stream<Item = String> + Unpin,
    {
        let mut stats = DispatchStats::default();
        while let Some(text) = inbound.next().await {
            let outcome = self.handle_message(&text);
            stats.record(outcome);
            metrics::counter!(UPSTREAM_FRAMES_TOTAL, "outcome" => outcome.as_str()).increment(1);
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(PENDING_REQUESTS).set(self.store.len() as f64);
        }
        info!(
            delivered = stats.delivered,
            unmatched = stats.unmatched,
            malformed = stats.malformed,
            abandoned = stats.abandoned,
            "upstream message stream ended"
        );
        stats
    }
}

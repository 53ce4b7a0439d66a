//! Durable completion marks.
//!
//! A persisted per-content flag recording "this visitor has already
//! completed this content", independent of the in-memory per-page-view
//! completion flag. Host hooks outside the engine (e.g. a recommendation
//! rail) consult it so re-visits don't re-run completion analytics.
//!
//! Marks live in the persistent scope alongside the visitor id, with no
//! expiry: they last exactly as long as the identity they qualify.

use std::sync::Arc;

use tracing::debug;

use crate::consent::ConsentGate;
use crate::storage::KeyValue;

const MARKED: &str = "1";

pub struct CompletionMarks {
    persistent: Arc<dyn KeyValue>,
    consent: Arc<ConsentGate>,
}

impl CompletionMarks {
    pub fn new(persistent: Arc<dyn KeyValue>, consent: Arc<ConsentGate>) -> Self {
        Self {
            persistent,
            consent,
        }
    }

    /// Whether this visitor has already completed the content. Storage
    /// failure reads as "not completed".
    pub fn is_complete(&self, content_id: &str) -> bool {
        match self.persistent.get(&key(content_id)) {
            Ok(value) => value.as_deref() == Some(MARKED),
            Err(err) => {
                debug!(content_id, "completion mark unreadable: {err}");
                false
            }
        }
    }

    /// Record completion. A no-op when consent is blocked; storage
    /// failures are swallowed.
    pub fn mark_complete(&self, content_id: &str) {
        if self.consent.is_blocked() {
            return;
        }
        if let Err(err) = self.persistent.set(&key(content_id), MARKED, None) {
            debug!(content_id, "completion mark not persisted: {err}");
        }
    }
}

fn key(content_id: &str) -> String {
    format!("read:{content_id}")
}

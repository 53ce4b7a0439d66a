//! Event transport.
//!
//! Ships envelopes to the collection endpoint. Strictly fire-and-forget:
//! the send never blocks the caller, never retries, and discards the
//! response entirely. Telemetry loss is an accepted degradation; a broken
//! page is not.

use std::sync::Mutex;

use tracing::debug;

use crate::model::EventEnvelope;

pub trait Transport: Send + Sync {
    /// Dispatch an envelope. Infallible from the caller's perspective.
    fn send(&self, envelope: EventEnvelope);
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// POSTs envelopes as JSON to `{base}/analytics/collect`, with cookies
/// included. Sends are spawned on the ambient tokio runtime; without one
/// the event is dropped with a debug log.
pub struct HttpTransport {
    client: reqwest::Client,
    collect_url: String,
}

impl HttpTransport {
    pub fn new(base: &str) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap_or_else(|err| {
                debug!("cookie-enabled client unavailable, using default: {err}");
                reqwest::Client::new()
            });
        Self {
            client,
            collect_url: format!("{}/analytics/collect", base.trim_end_matches('/')),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, envelope: EventEnvelope) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(
                event_type = %envelope.event_type,
                "no async runtime, dropping event"
            );
            return;
        };
        let request = self.client.post(&self.collect_url).json(&envelope);
        runtime.spawn(async move {
            // Status code, body, and errors are all ignored.
            if let Err(err) = request.send().await {
                debug!("collect request failed: {err}");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Memory transport
// ---------------------------------------------------------------------------

/// Records envelopes instead of sending them (for testing).
#[derive(Default)]
pub struct MemoryTransport {
    events: Mutex<Vec<EventEnvelope>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded envelopes, in emission order.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded envelopes of one event type.
    pub fn of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: EventEnvelope) {
        self.events.lock().unwrap().push(envelope);
    }
}

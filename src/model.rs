//! Core data model.
//!
//! The event envelope is the unit of transmission: identity, navigation
//! context, and a type-specific payload, built once per emission and
//! immutable after that. Constants here define the engine's fixed
//! measurement behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Seconds between heartbeat ticks.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Accumulated read seconds at which the time-based completion fires.
pub const READ_COMPLETE_SECS: u64 = 60;

/// Coverage percentage at which the depth-based completion fires.
pub const DEPTH_COMPLETE_PCT: u8 = 70;

/// Scroll depth thresholds, each reported at most once per page view.
pub const SCROLL_THRESHOLDS: [u8; 4] = [25, 50, 75, 90];

/// Window within which a repeated notification for the same path+query
/// is treated as router noise, not a new page view.
pub const PAGE_VIEW_DEDUPE_MS: i64 = 400;

/// Scroll notifications are coalesced to one computation per frame.
pub const SCROLL_FRAME_MS: u64 = 16;

/// How long a persisted opt-out stays in force.
pub const OPT_OUT_EXPIRY_DAYS: i64 = 730;

// Event types the engine originates. The tag is open-ended: `track()`
// callers may emit any type through the same pipeline.
pub const EVENT_PAGE_VIEW: &str = "page_view";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_SCROLL: &str = "scroll";
pub const EVENT_READ_COMPLETE: &str = "read_complete";

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// A fully-composed telemetry event, ready for transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// What kind of event this is (e.g. "page_view", "heartbeat").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When this event was emitted.
    pub timestamp: DateTime<Utc>,

    /// Long-lived pseudo-anonymous id for this browser profile.
    #[serde(rename = "visitorId")]
    pub visitor_id: String,

    /// Id stable for one browsing session.
    #[serde(rename = "sessionId")]
    pub session_id: String,

    /// Route path plus query string of the current page view.
    pub path: String,

    /// Document referrer at initial load, if any.
    pub referrer: Option<String>,

    /// Campaign parameters present in the URL at initial load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm: Option<UtmParams>,

    /// Type-specific payload. Opaque to the transport.
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Campaign parameters
// ---------------------------------------------------------------------------

/// The five standard campaign parameters. Parsed once from the query
/// string at load; absent fields are omitted from the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl UtmParams {
    /// Extract campaign parameters from a query string (with or without a
    /// leading `?`). Returns `None` when none of the five are present.
    pub fn from_query(query: &str) -> Option<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut utm = Self {
            source: None,
            medium: None,
            campaign: None,
            term: None,
            content: None,
        };
        let mut any = false;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "utm_source" => &mut utm.source,
                "utm_medium" => &mut utm.medium,
                "utm_campaign" => &mut utm.campaign,
                "utm_term" => &mut utm.term,
                "utm_content" => &mut utm.content,
                _ => continue,
            };
            *slot = Some(value.into_owned());
            any = true;
        }
        any.then_some(utm)
    }
}

// ---------------------------------------------------------------------------
// Scroll metrics
// ---------------------------------------------------------------------------

/// A snapshot of the host viewport, as pushed by the platform binding on
/// each scroll notification or probed once at page-view start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Scroll offset from the top of the content, in pixels.
    pub offset: f64,
    /// Visible viewport height, in pixels.
    pub viewport: f64,
    /// Total content height, in pixels.
    pub content: f64,
}

impl ScrollMetrics {
    /// Coverage as an integer percentage in [0, 100].
    ///
    /// Content that fits entirely in the viewport counts as fully covered;
    /// degenerate metrics (zero or negative content height) count as zero.
    pub fn coverage_pct(&self) -> u8 {
        if self.content <= 0.0 {
            return 0;
        }
        if self.content <= self.viewport {
            return 100;
        }
        let ratio = ((self.offset + self.viewport) / self.content).clamp(0.0, 1.0);
        (ratio * 100.0).round() as u8
    }
}

/// Combine a route path and query string into the envelope `path` field.
pub fn page_key(path: &str, query: &str) -> String {
    let query = query.strip_prefix('?').unwrap_or(query);
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

//! Scroll progress tracking.
//!
//! Per-page-view threshold state plus the frame-coalescing throttle.
//! The host binding pushes [`ScrollMetrics`](crate::model::ScrollMetrics)
//! notifications; the engine coalesces bursts to one coverage computation
//! per frame and fires each depth threshold at most once per page view.

use crate::model::{ScrollMetrics, SCROLL_THRESHOLDS};

/// Probes the current viewport at page-view start, so pages whose content
/// already fits the viewport can complete without a single scroll
/// notification ever arriving.
pub trait ViewportProbe: Send + Sync {
    /// Current metrics, or `None` when the host can't provide them
    /// (treated as zero coverage).
    fn metrics(&self) -> Option<ScrollMetrics>;
}

/// Probe for hosts that only push scroll notifications.
#[derive(Debug, Default)]
pub struct NoViewport;

impl ViewportProbe for NoViewport {
    fn metrics(&self) -> Option<ScrollMetrics> {
        None
    }
}

/// Per-page-view scroll state. Reset wholesale on every navigation.
#[derive(Default)]
pub struct ScrollState {
    fired: [bool; SCROLL_THRESHOLDS.len()],
    /// Latest metrics awaiting the next frame flush. Later notifications
    /// in the same frame overwrite earlier ones.
    pub(crate) pending: Option<ScrollMetrics>,
    pub(crate) flush_scheduled: bool,
}

impl ScrollState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Thresholds newly reached at this coverage, in ascending order.
    /// Each is recorded so it never fires again this page view.
    pub fn crossings(&mut self, coverage_pct: u8) -> Vec<u8> {
        let mut newly = Vec::new();
        for (i, threshold) in SCROLL_THRESHOLDS.iter().enumerate() {
            if coverage_pct >= *threshold && !self.fired[i] {
                self.fired[i] = true;
                newly.push(*threshold);
            }
        }
        newly
    }
}

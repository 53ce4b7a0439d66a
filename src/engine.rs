//! Core engine. The public API the host application calls.
//!
//! One [`Telemetry`] controller owns all engine state and enforces all
//! invariants: page-view de-duplication, at most one live heartbeat task,
//! one `read_complete` per page view with first-trigger-wins, and consent
//! checked before any state is created or any byte is transmitted. Every
//! public entry point is infallible from the caller's perspective —
//! failures inside degrade to silently missing analytics, never a broken
//! page.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::consent::{ConsentGate, DoNotTrack, NoDnt};
use crate::identity::IdentityStore;
use crate::marks::CompletionMarks;
use crate::model::{
    DEPTH_COMPLETE_PCT, EVENT_HEARTBEAT, EVENT_PAGE_VIEW, EVENT_READ_COMPLETE, EVENT_SCROLL,
    EventEnvelope, HEARTBEAT_INTERVAL_SECS, PAGE_VIEW_DEDUPE_MS, READ_COMPLETE_SECS,
    SCROLL_FRAME_MS, ScrollMetrics, UtmParams, page_key,
};
use crate::schedule::{Scheduler, TaskHandle, TokioScheduler};
use crate::scroll::{NoViewport, ScrollState, ViewportProbe};
use crate::storage::{KeyValue, MemoryStore, SqliteStore};
use crate::transport::{HttpTransport, Transport};

/// Per-page-view mutable state. Reset by the navigation notifier, fed by
/// the heartbeat and scroll paths.
#[derive(Default)]
struct EngineState {
    /// Init idempotence guard.
    started: bool,
    /// At most one live heartbeat task.
    heartbeat: Option<TaskHandle>,
    /// Accumulated dwell seconds for the current page view.
    read_seconds: u64,
    /// True once a `read_complete` went out for the current page view.
    completion_sent: bool,
    /// Most recent page view, for de-duplication of router noise.
    last_page_view: Option<(String, DateTime<Utc>)>,
    /// Path+query stamped on outgoing envelopes.
    current_page: String,
    /// Campaign parameters from the initial URL, captured once at init.
    utm: Option<UtmParams>,
    scroll: ScrollState,
}

struct Inner {
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    transport: Arc<dyn Transport>,
    consent: Arc<ConsentGate>,
    identity: IdentityStore,
    viewport: Arc<dyn ViewportProbe>,
    persistent: Arc<dyn KeyValue>,
    referrer: Option<String>,
    state: Mutex<EngineState>,
}

/// The telemetry engine handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl Telemetry {
    pub fn builder(config: Config) -> TelemetryBuilder {
        TelemetryBuilder::new(config)
    }

    /// One-time startup: captures campaign parameters from the initial
    /// query string and records the current location as the first page
    /// view. A second call is a no-op.
    pub fn init(&self, path: &str, query: &str) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.started {
                return;
            }
            state.started = true;
            state.utm = UtmParams::from_query(query);
        }
        self.notify(path, query);
    }

    /// Notification that the visible route changed. The sole entry point
    /// the host router calls, including for the initial load.
    pub fn notify(&self, path: &str, query: &str) {
        self.inner.notify(path, query);
    }

    /// Scroll notification from the host binding. Coalesced to one
    /// coverage computation per frame.
    pub fn scroll(&self, metrics: ScrollMetrics) {
        self.inner.on_scroll(metrics);
    }

    /// Generic escape hatch: emit an ad hoc event through the same
    /// consent gate and transport as the core events.
    pub fn track(&self, event_type: &str, data: serde_json::Value) {
        self.inner.emit(event_type, data);
    }

    /// Persist or clear the opt-out flag. Enabling also stops the
    /// heartbeat immediately; disabling starts nothing — the next
    /// `notify` re-initializes normally.
    pub fn set_opt_out(&self, enabled: bool) {
        self.inner.consent.set_opt_out(enabled);
        if enabled {
            self.inner.stop_heartbeat();
        }
    }

    /// State of the persisted opt-out flag, for a privacy toggle.
    pub fn is_opted_out(&self) -> bool {
        self.inner.consent.opted_out()
    }

    /// Durable per-content completion marks, sharing this engine's
    /// persistent scope and consent gate.
    pub fn completion_marks(&self) -> CompletionMarks {
        CompletionMarks::new(
            Arc::clone(&self.inner.persistent),
            Arc::clone(&self.inner.consent),
        )
    }
}

impl Inner {
    fn notify(self: &Arc<Self>, path: &str, query: &str) {
        if self.consent.is_blocked() {
            self.stop_heartbeat();
            return;
        }

        let page = page_key(path, query);
        let now = self.clock.now();
        {
            let mut state = self.state.lock().unwrap();
            if let Some((last, at)) = &state.last_page_view {
                let elapsed = now - *at;
                if *last == page
                    && elapsed < chrono::Duration::milliseconds(PAGE_VIEW_DEDUPE_MS)
                {
                    debug!(%page, "duplicate navigation ignored");
                    return;
                }
            }
            state.last_page_view = Some((page.clone(), now));
            state.current_page = page;
            state.completion_sent = false;
            state.read_seconds = 0;
            state.scroll.reset();
        }

        self.emit(EVENT_PAGE_VIEW, json!({}));
        self.start_heartbeat();

        // Short pages may never produce a scroll notification, so coverage
        // is evaluated once eagerly for the new page.
        if let Some(metrics) = self.viewport.metrics() {
            self.process_coverage(metrics.coverage_pct());
        }
    }

    fn start_heartbeat(self: &Arc<Self>) {
        self.stop_heartbeat();
        let inner = Arc::clone(self);
        let handle = self.scheduler.every(
            Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            Box::new(move || inner.heartbeat_tick()),
        );
        self.state.lock().unwrap().heartbeat = Some(handle);
    }

    fn stop_heartbeat(&self) {
        let handle = self.state.lock().unwrap().heartbeat.take();
        if let Some(handle) = handle {
            self.scheduler.cancel(handle);
        }
    }

    fn heartbeat_tick(self: &Arc<Self>) {
        // Consent may have been revoked mid-page; stop future ticks.
        if self.consent.is_blocked() {
            self.stop_heartbeat();
            return;
        }

        let seconds = {
            let mut state = self.state.lock().unwrap();
            state.read_seconds += HEARTBEAT_INTERVAL_SECS;
            state.read_seconds
        };

        self.emit(EVENT_HEARTBEAT, json!({"read": {"seconds": seconds}}));

        if seconds >= READ_COMPLETE_SECS {
            self.complete_read("time");
        }
    }

    fn on_scroll(self: &Arc<Self>, metrics: ScrollMetrics) {
        if self.consent.is_blocked() {
            return;
        }

        let schedule_flush = {
            let mut state = self.state.lock().unwrap();
            state.scroll.pending = Some(metrics);
            !std::mem::replace(&mut state.scroll.flush_scheduled, true)
        };

        if schedule_flush {
            let inner = Arc::clone(self);
            self.scheduler.once(
                Duration::from_millis(SCROLL_FRAME_MS),
                Box::new(move || inner.flush_scroll()),
            );
        }
    }

    fn flush_scroll(self: &Arc<Self>) {
        let metrics = {
            let mut state = self.state.lock().unwrap();
            state.scroll.flush_scheduled = false;
            state.scroll.pending.take()
        };
        if let Some(metrics) = metrics {
            self.process_coverage(metrics.coverage_pct());
        }
    }

    fn process_coverage(self: &Arc<Self>, coverage_pct: u8) {
        if self.consent.is_blocked() {
            return;
        }

        let newly_fired = {
            let mut state = self.state.lock().unwrap();
            state.scroll.crossings(coverage_pct)
        };
        for threshold in newly_fired {
            self.emit(EVENT_SCROLL, json!({"scroll": {"p": threshold}}));
        }

        if coverage_pct >= DEPTH_COMPLETE_PCT {
            self.complete_read("depth");
        }
    }

    /// The read-complete coordinator: first trigger wins, exactly one
    /// `read_complete` per page view.
    fn complete_read(self: &Arc<Self>, reason: &str) {
        let seconds = {
            let mut state = self.state.lock().unwrap();
            if state.completion_sent {
                return;
            }
            state.completion_sent = true;
            state.read_seconds
        };
        self.emit(
            EVENT_READ_COMPLETE,
            json!({"read": {"reason": reason, "seconds": seconds}}),
        );
    }

    /// The single emission choke point: gate, compose, ship.
    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.consent.is_blocked() {
            return;
        }
        let (path, utm) = {
            let state = self.state.lock().unwrap();
            (state.current_page.clone(), state.utm.clone())
        };
        let envelope = EventEnvelope {
            event_type: event_type.to_string(),
            timestamp: self.clock.now(),
            visitor_id: self.identity.visitor_id(),
            session_id: self.identity.session_id(),
            path,
            referrer: self.referrer.clone(),
            utm,
            data,
        };
        self.transport.send(envelope);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`Telemetry`] engine. Production defaults throughout;
/// every dependency can be injected for tests or platform bindings.
pub struct TelemetryBuilder {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    transport: Option<Arc<dyn Transport>>,
    persistent: Option<Arc<dyn KeyValue>>,
    session: Option<Arc<dyn KeyValue>>,
    dnt: Option<Arc<dyn DoNotTrack>>,
    viewport: Option<Arc<dyn ViewportProbe>>,
    referrer: Option<String>,
}

impl TelemetryBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: None,
            scheduler: None,
            transport: None,
            persistent: None,
            session: None,
            dnt: None,
            viewport: None,
            referrer: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn persistent_scope(mut self, scope: Arc<dyn KeyValue>) -> Self {
        self.persistent = Some(scope);
        self
    }

    pub fn session_scope(mut self, scope: Arc<dyn KeyValue>) -> Self {
        self.session = Some(scope);
        self
    }

    pub fn do_not_track(mut self, dnt: Arc<dyn DoNotTrack>) -> Self {
        self.dnt = Some(dnt);
        self
    }

    pub fn viewport(mut self, probe: Arc<dyn ViewportProbe>) -> Self {
        self.viewport = Some(probe);
        self
    }

    /// Document referrer at initial load, captured once.
    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn build(self) -> Telemetry {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let persistent = self.persistent.unwrap_or_else(|| {
            match &self.config.state_path {
                Some(path) => match SqliteStore::open(path, Arc::clone(&clock)) {
                    Ok(store) => Arc::new(store) as Arc<dyn KeyValue>,
                    Err(err) => {
                        // Storage trouble never breaks the engine; identity
                        // just won't survive restarts.
                        warn!("persistent scope unavailable, using memory: {err}");
                        Arc::new(MemoryStore::new(Arc::clone(&clock)))
                    }
                },
                None => Arc::new(MemoryStore::new(Arc::clone(&clock))),
            }
        });
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(MemoryStore::new(Arc::clone(&clock))) as Arc<dyn KeyValue>);

        let dnt = self.dnt.unwrap_or_else(|| Arc::new(NoDnt) as Arc<dyn DoNotTrack>);
        let consent = Arc::new(ConsentGate::new(
            Arc::clone(&persistent),
            dnt,
            Arc::clone(&clock),
        ));

        let inner = Inner {
            identity: IdentityStore::new(Arc::clone(&persistent), Arc::clone(&session)),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TokioScheduler::new()) as Arc<dyn Scheduler>),
            transport: self
                .transport
                .unwrap_or_else(|| {
                    Arc::new(HttpTransport::new(&self.config.endpoint)) as Arc<dyn Transport>
                }),
            viewport: self
                .viewport
                .unwrap_or_else(|| Arc::new(NoViewport) as Arc<dyn ViewportProbe>),
            referrer: self.referrer,
            consent,
            persistent,
            clock,
            state: Mutex::new(EngineState::default()),
        };

        Telemetry {
            inner: Arc::new(inner),
        }
    }
}

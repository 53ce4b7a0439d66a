//! Consent gate.
//!
//! Every component checks this gate before creating state, scheduling
//! timers, or transmitting. Blocking comes from either a persisted opt-out
//! flag or the platform's do-not-track signal. Storage failure defaults to
//! "tracking allowed" — an unreadable flag never widens collection into an
//! error and never narrows a working page into a broken one.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::model::OPT_OUT_EXPIRY_DAYS;
use crate::storage::KeyValue;

/// Persistent-scope key holding the opt-out flag.
pub const OPT_OUT_KEY: &str = "optout";

/// Value meaning "blocked". Absence means "allowed".
const OPT_OUT_VALUE: &str = "1";

/// Platform do-not-track signal. Supplied by the host binding; the engine
/// treats an enabled signal identically to a persisted opt-out.
pub trait DoNotTrack: Send + Sync {
    fn enabled(&self) -> bool;
}

/// Default signal for hosts with no DNT source.
#[derive(Debug, Default)]
pub struct NoDnt;

impl DoNotTrack for NoDnt {
    fn enabled(&self) -> bool {
        false
    }
}

pub struct ConsentGate {
    persistent: Arc<dyn KeyValue>,
    dnt: Arc<dyn DoNotTrack>,
    clock: Arc<dyn Clock>,
}

impl ConsentGate {
    pub fn new(
        persistent: Arc<dyn KeyValue>,
        dnt: Arc<dyn DoNotTrack>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistent,
            dnt,
            clock,
        }
    }

    /// True if any telemetry activity is forbidden right now.
    pub fn is_blocked(&self) -> bool {
        self.dnt.enabled() || self.opted_out()
    }

    /// True if the persisted opt-out flag is present and unexpired.
    /// This is the value a user-facing privacy toggle reflects; DNT is
    /// not included since the user can't flip it from the page.
    pub fn opted_out(&self) -> bool {
        match self.persistent.get(OPT_OUT_KEY) {
            Ok(value) => value.as_deref() == Some(OPT_OUT_VALUE),
            Err(err) => {
                debug!("consent flag unreadable, defaulting to allowed: {err}");
                false
            }
        }
    }

    /// Persist or clear the opt-out flag. Storage failures are swallowed.
    pub fn set_opt_out(&self, enabled: bool) {
        let result = if enabled {
            let expires = self.clock.now() + Duration::days(OPT_OUT_EXPIRY_DAYS);
            self.persistent.set(OPT_OUT_KEY, OPT_OUT_VALUE, Some(expires))
        } else {
            self.persistent.remove(OPT_OUT_KEY)
        };
        if let Err(err) = result {
            debug!(enabled, "opt-out flag not persisted: {err}");
        }
    }
}

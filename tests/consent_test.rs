//! Tests for the consent gate: opt-out flag, expiry, DNT, failure fallback.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use readership::clock::{Clock, ManualClock};
use readership::consent::{ConsentGate, DoNotTrack, NoDnt, OPT_OUT_KEY};
use readership::error::{Error, Result};
use readership::storage::{KeyValue, MemoryStore};

struct DntOn;

impl DoNotTrack for DntOn {
    fn enabled(&self) -> bool {
        true
    }
}

struct BrokenStore;

impl KeyValue for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Other("storage unavailable".to_string()))
    }

    fn set(&self, _key: &str, _value: &str, _expires: Option<DateTime<Utc>>) -> Result<()> {
        Err(Error::Other("storage unavailable".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::Other("storage unavailable".to_string()))
    }
}

fn gate() -> (ConsentGate, Arc<MemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let gate = ConsentGate::new(store.clone(), Arc::new(NoDnt), clock.clone());
    (gate, store, clock)
}

#[test]
fn default_is_allowed() {
    let (gate, _, _) = gate();
    assert!(!gate.is_blocked());
    assert!(!gate.opted_out());
}

#[test]
fn opt_out_round_trip() {
    let (gate, _, _) = gate();

    gate.set_opt_out(true);
    assert!(gate.is_blocked());
    assert!(gate.opted_out());

    gate.set_opt_out(false);
    assert!(!gate.is_blocked());
}

#[test]
fn opt_out_flag_expires() {
    let (gate, _, clock) = gate();
    gate.set_opt_out(true);
    assert!(gate.is_blocked());

    clock.advance(Duration::days(731));
    assert!(!gate.is_blocked());
}

#[test]
fn opt_out_flag_uses_documented_convention() {
    let (gate, store, _) = gate();
    gate.set_opt_out(true);
    assert_eq!(store.get(OPT_OUT_KEY).unwrap().as_deref(), Some("1"));

    gate.set_opt_out(false);
    assert_eq!(store.get(OPT_OUT_KEY).unwrap(), None);
}

#[test]
fn dnt_blocks_but_is_not_the_toggle_state() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let gate = ConsentGate::new(store, Arc::new(DntOn), clock);

    assert!(gate.is_blocked());
    assert!(!gate.opted_out());
}

#[test]
fn broken_storage_defaults_to_allowed() {
    let clock = Arc::new(ManualClock::default());
    let gate = ConsentGate::new(Arc::new(BrokenStore), Arc::new(NoDnt), clock);

    assert!(!gate.is_blocked());
    // Writes are swallowed too; the gate stays usable.
    gate.set_opt_out(true);
    assert!(!gate.is_blocked());
}

#[test]
fn foreign_flag_value_is_not_an_opt_out() {
    let (gate, store, _) = gate();
    store.set(OPT_OUT_KEY, "yes", None).unwrap();
    assert!(!gate.is_blocked());
}

#[test]
fn manual_clock_advances() {
    let clock = ManualClock::default();
    let before = clock.now();
    clock.advance(Duration::seconds(5));
    assert_eq!(clock.now() - before, Duration::seconds(5));
}

//! Visitor and session identity.
//!
//! Each identifier is created lazily on first read and persisted in its
//! scope: the visitor id in the durable scope, the session id in the
//! session scope. When persistence is unavailable a fresh id is still
//! returned — identity just won't survive a reload.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::storage::KeyValue;

const VISITOR_KEY: &str = "vid";
const SESSION_KEY: &str = "sid";

pub struct IdentityStore {
    persistent: Arc<dyn KeyValue>,
    session: Arc<dyn KeyValue>,
}

impl IdentityStore {
    pub fn new(persistent: Arc<dyn KeyValue>, session: Arc<dyn KeyValue>) -> Self {
        Self {
            persistent,
            session,
        }
    }

    /// Long-lived identifier for this browser profile.
    pub fn visitor_id(&self) -> String {
        get_or_create(self.persistent.as_ref(), VISITOR_KEY)
    }

    /// Identifier stable for one browsing session.
    pub fn session_id(&self) -> String {
        get_or_create(self.session.as_ref(), SESSION_KEY)
    }
}

fn get_or_create(scope: &dyn KeyValue, key: &str) -> String {
    match scope.get(key) {
        Ok(Some(id)) => return id,
        Ok(None) => {}
        Err(err) => debug!(key, "identity scope unreadable: {err}"),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(err) = scope.set(key, &id, None) {
        debug!(key, "identity not persisted, id is ephemeral: {err}");
    }
    id
}

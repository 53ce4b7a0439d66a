//! Key-value storage scopes.
//!
//! The engine persists three small things: the visitor identifier, the
//! consent opt-out flag, and per-content completion marks. Each lives in a
//! storage *scope* with its own lifetime: the persistent scope survives
//! restarts (SQLite), the session scope lives as long as the process
//! (in-memory). Values may carry an expiry; expired values read as absent.
//!
//! Callers treat storage as unreliable: every operation can fail (privacy
//! mode, quota, disk) and the engine swallows those failures with a safe
//! fallback rather than propagating them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::clock::Clock;
use crate::error::Result;

/// A single storage scope.
pub trait KeyValue: Send + Sync {
    /// Read a value. Expired values read as `None`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, optionally with an expiry instant.
    fn set(&self, key: &str, value: &str, expires: Option<DateTime<Utc>>) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory scope
// ---------------------------------------------------------------------------

/// Process-lifetime scope. Backs the session scope in production and both
/// scopes in tests.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Option<DateTime<Utc>>)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop all entries. Models the host clearing session storage
    /// (tab restart) in tests.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl KeyValue for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).and_then(|(value, expires)| {
            match expires {
                Some(at) if *at <= self.clock.now() => None,
                _ => Some(value.clone()),
            }
        }))
    }

    fn set(&self, key: &str, value: &str, expires: Option<DateTime<Utc>>) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite scope
// ---------------------------------------------------------------------------

/// Durable scope backed by SQLite. One table, one row per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                expires_at  TEXT
            );
            ",
        )?;
        Ok(())
    }
}

impl KeyValue for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        if let Some(raw) = expires_at {
            let expired = DateTime::parse_from_rfc3339(&raw)
                .map(|at| at.with_timezone(&Utc) <= self.clock.now())
                .unwrap_or(true);
            if expired {
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str, expires: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, value, expires.map(|at| at.to_rfc3339())],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

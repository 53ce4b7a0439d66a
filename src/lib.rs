//! # readership
//!
//! Client-side readership telemetry engine for a news site: page views,
//! read-time heartbeats, scroll depth, and one-shot read-complete signals,
//! behind a consent gate and a fire-and-forget transport.
//!
//! The host application calls [`Telemetry::init`] once at startup,
//! [`Telemetry::notify`] on every route change, and pushes scroll
//! notifications through [`Telemetry::scroll`]. Everything else — identity,
//! consent, scheduling, de-duplication, transmission — happens inside.
//! No engine failure ever reaches the host: the worst case is silently
//! missing analytics.

pub mod clock;
pub mod config;
pub mod consent;
pub mod engine;
pub mod error;
pub mod identity;
pub mod marks;
pub mod model;
pub mod schedule;
pub mod scroll;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use engine::{Telemetry, TelemetryBuilder};
pub use model::{EventEnvelope, ScrollMetrics, UtmParams};

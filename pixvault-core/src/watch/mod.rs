//! Live filesystem watching.
//!
//! ```text
//! notify / worker process ──WatchMessage──▶ consumer ──▶ Debouncer ──CanonicalEvent──▶ ingest | retire | scan
//! ```
//!
//! A [`WatchSupervisor`] owns one consumer task and one monitor per started
//! root. Monitors either run in this process or, with
//! [`WatchIsolation::Subprocess`](crate::config::WatchIsolation), in a child
//! running [`run_watch_worker`] so a crashing platform backend cannot take
//! the server down.

mod convert;
mod debounce;
mod monitor;
mod supervisor;
mod worker;

pub use convert::raw_events_from_notify;
pub use debounce::{Debouncer, resolve_window};
pub use monitor::WatchMessage;
pub use supervisor::WatchSupervisor;
pub use worker::run_watch_worker;

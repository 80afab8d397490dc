//! Lens Research
//!
//! Runs long-lived research jobs against an analysis backend and keeps the
//! caller informed while they run.
//!
//! Architecture:
//! - Configuration: backend selection, credentials and polling limits
//! - Store: pluggable key-value persistence (memory or filesystem)
//! - Services: fingerprint-keyed result cache, multi-lens fan-out
//! - Scheduler: status polling with backoff, timeout and cancellation
//! - Controller: one in-flight job, observable state, cooperative cancel

pub mod config;
pub mod controller;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{BackendKind, Config, ConfigError};
pub use controller::{ResearchController, ResearchState};
pub use error::{ResearchError, Result};
pub use scheduler::PollPolicy;
pub use service::{MultiLensReport, ResultCache, run_multi_lens};

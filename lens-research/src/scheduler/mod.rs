//! Scheduler layer
//!
//! Drives submitted jobs to a terminal state: timed status queries,
//! retry with backoff and cooperative cancellation.

pub mod poller;

pub use poller::{PollPolicy, poll_until_terminal};

//! Command execution engine for sandboxed workspaces.
//!
//! Spawns OS processes rooted at a workspace directory, captures their
//! output as an append-only log, and exposes the same underlying state to
//! several kinds of observer: one-shot log fetch, live log streaming, and
//! a blocking-style wait. Submission is the only non-blocking entry point;
//! everything after it reacts to process events delivered over a
//! per-command channel.

pub mod engine;
pub mod error;
pub mod spawn;
pub mod types;

pub use {
    engine::{CommandEngine, GRACE_PERIOD, POLL_INTERVAL},
    error::{Error, Result},
    types::{CommandInfo, CommandStatus, LogLine, LogStream, SubmitOptions, WaitResult},
};

//! PyLogChop - tails log files, groups multi-line records, ships JSON to syslog
//!
//! PyLogChop tails plain-text log files, groups multi-line records using a
//! user-supplied anchor pattern, extracts structured fields from each record
//! by regular-expression capture, composes a JSON payload from a per-source
//! template, and emits the payload to syslog with configurable
//! facility/severity/tag. Many sources run concurrently in one process;
//! configuration may be reloaded at runtime.
//!
//! # Architecture
//!
//! - **Follower**: tails a single file across truncation, rotation, and
//!   device changes, yielding raw lines.
//! - **Assembler**: groups lines into records using an anchor regex plus a
//!   starvation timer.
//! - **Renderer**: materializes a JSON payload from a template and a record.
//! - **Worker**: owns one Follower + Assembler + Renderer for a source.
//! - **Dispatcher**: the single consumer that drains the shared queue and
//!   writes to syslog.
//! - **Supervisor**: loads configuration, starts/reconfigures/stops workers.

pub mod applog;
pub mod assembler;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod follower;
pub mod renderer;
pub mod supervisor;
pub mod worker;

pub use error::PyLogChopError;

/// Result type used throughout PyLogChop
pub type Result<T> = anyhow::Result<T>;

//! `robocmd-runtime` – host-side plumbing around the scheduler
//!
//! # Modules
//!
//! - [`config`] – [`RuntimeConfig`] loaded from `robocmd.toml` with
//!   `ROBOCMD_*` environment overrides.
//! - [`telemetry`] – global `tracing` subscriber with optional OTLP export.
//! - [`tick_loop`] – [`TickLoop`], which ticks a
//!   [`Scheduler`][robocmd_core::Scheduler] at a fixed period on tokio until
//!   shut down.

pub mod config;
pub mod telemetry;
pub mod tick_loop;

pub use config::{ConfigError, LogFormat, RuntimeConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use tick_loop::{LoopStats, TickLoop};

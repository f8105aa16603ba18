//! `robocmd-core` – command-based cooperative scheduling
//!
//! Sequences robot actions while arbitrating exclusive access to shared
//! hardware.  Everything runs cooperatively inside
//! [`Scheduler::tick`][scheduler::Scheduler::tick]; nothing here blocks or
//! spawns threads.
//!
//! # Modules
//!
//! - [`command`] – [`Command`][command::Command] definitions and the
//!   [`Behavior`][command::Behavior] hooks driven through a five-step
//!   lifecycle.
//! - `group` – composite commands built with
//!   [`Scheduler::add_sequential`][scheduler::Scheduler::add_sequential] and
//!   friends: sequential entries, background children and independently
//!   started peers.
//! - [`subsystem`] – the [`Subsystem`][subsystem::Subsystem] trait for
//!   exclusive hardware resources and their default commands.
//! - [`trigger`] – edge-detecting bindings between predicates and commands,
//!   plus a manually driven [`Button`][trigger::Button].
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: admission,
//!   eviction and per-tick execution.
//! - [`builtins`] – instant, timed, wait, print, start and conditional
//!   commands.
//! - [`clock`], [`host`], [`telemetry`] – the seams to time, robot enable
//!   state and dashboards.

pub mod builtins;
pub mod clock;
pub mod command;
mod group;
pub mod host;
pub mod scheduler;
pub mod subsystem;
pub mod telemetry;
pub mod trigger;

pub use builtins::{
    ConditionalCommand, InstantCommand, PrintCommand, StartCommand, TimedCommand, WaitCommand,
    WaitForChildren, WaitUntilCommand,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use command::{Behavior, Command, CommandContext};
pub use host::{AlwaysEnabled, HostState, SharedHostState};
pub use robocmd_types::{
    BindingMode, CommandId, EntryMode, SchedulerError, SchedulerSnapshot, SubsystemId, TriggerId,
};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerHandle};
pub use subsystem::{Passive, Subsystem};
pub use telemetry::{MemorySink, NullSink, TelemetrySink, TelemetryValue, TracingSink};
pub use trigger::Button;

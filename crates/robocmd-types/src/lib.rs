use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a command registered with a scheduler.
///
/// Handles are only meaningful for the scheduler that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CommandId(usize);

/// Handle to a subsystem (an exclusive hardware resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct SubsystemId(usize);

/// Handle to a registered trigger predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct TriggerId(usize);

macro_rules! arena_handle {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            /// Wrap an arena slot index.
            pub const fn from_index(index: usize) -> Self {
                Self(index)
            }

            /// The arena slot index behind this handle.
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_handle!(CommandId, "cmd");
arena_handle!(SubsystemId, "subsystem");
arena_handle!(TriggerId, "trigger");

// ─────────────────────────────────────────────────────────────────────────────
// Modes
// ─────────────────────────────────────────────────────────────────────────────

/// How a command group treats one of its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Blocks the group's cursor until the command finishes.
    InSequence,
    /// Started as an independent top-level command; the cursor moves on
    /// immediately.
    BranchPeer,
    /// Runs in the background inside the group; the cursor moves on
    /// immediately.
    BranchChild,
}

/// What a trigger binding does with its command on each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    /// Start on the rising edge.
    WhenActive,
    /// Start every tick while active, cancel on the falling edge.
    WhileActive,
    /// Start on the falling edge.
    WhenInactive,
    /// On the rising edge cancel if running, otherwise start.
    ToggleWhenActive,
    /// Cancel on the rising edge.
    CancelWhenActive,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Observable state of one admitted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandSnapshot {
    pub id: CommandId,
    pub name: String,
    pub running: bool,
    pub canceled: bool,
    pub interruptible: bool,
    /// Seconds since the command's first run; 0 before it has run.
    pub elapsed_secs: f64,
    pub requirements: Vec<String>,
}

/// Observable state of one subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubsystemSnapshot {
    pub id: SubsystemId,
    pub name: String,
    /// Name of the current occupant, if any.
    pub current_command: Option<String>,
    /// Name of the default command, if one has been set.
    pub default_command: Option<String>,
}

/// Point-in-time view of a scheduler, suitable for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchedulerSnapshot {
    /// Number of enabled ticks executed so far.
    pub tick: u64,
    /// Clock reading (seconds) when the snapshot was taken.
    pub timestamp: f64,
    pub disabled: bool,
    /// Admitted top-level commands in admission order.
    pub commands: Vec<CommandSnapshot>,
    pub subsystems: Vec<SubsystemSnapshot>,
    /// Commands waiting for admission at the next tick.
    pub pending: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration and usage errors reported synchronously by the scheduler.
///
/// Admission conflicts are not errors: a command blocked by an
/// uninterruptible occupant is simply not admitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Can not add new requirement to locked command '{0}'")]
    RequirementsLocked(String),

    #[error("Timeout must not be negative (got {0})")]
    NegativeTimeout(f64),

    #[error("Default command '{command}' must require subsystem '{subsystem}'")]
    DefaultMissingRequirement { subsystem: String, command: String },

    #[error("Command '{0}' already belongs to a command group")]
    AlreadyParented(String),

    #[error("Command '{0}' is part of a command group and can not be started or canceled on its own")]
    Parented(String),

    #[error("Command '{0}' is already queued for admission")]
    AlreadyQueued(String),

    #[error("Can not add new command to locked command group '{0}'")]
    GroupLocked(String),

    #[error("Command '{0}' is not a command group")]
    NotAGroup(String),

    #[error("Command group '{0}' can not contain itself")]
    SelfReference(String),

    #[error("Can not start '{0}' from inside an eviction callback")]
    ReentrantAdmission(String),

    #[error("Unknown command {0}")]
    UnknownCommand(CommandId),

    #[error("Unknown subsystem {0}")]
    UnknownSubsystem(SubsystemId),

    #[error("Unknown trigger {0}")]
    UnknownTrigger(TriggerId),

    #[error("Scheduler has been dropped")]
    SchedulerClosed,
}

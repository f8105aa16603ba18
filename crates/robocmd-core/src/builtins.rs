//! Ready-made commands for common sequencing needs.
//!
//! Each type here is a [`Behavior`]; the associated `command` constructors
//! wrap it in a named [`Command`] ready for
//! [`Scheduler::add_command`][crate::scheduler::Scheduler::add_command].

use robocmd_types::{CommandId, SchedulerError};
use tracing::{info, warn};

use crate::command::{Behavior, Command, CommandContext};

type Action = Box<dyn FnMut() + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// InstantCommand
// ─────────────────────────────────────────────────────────────────────────────

/// Runs an optional action once, then finishes on its first tick.
#[derive(Default)]
pub struct InstantCommand {
    action: Option<Action>,
}

impl InstantCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(action: impl FnMut() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    pub fn command(name: impl Into<String>, action: impl FnMut() + Send + 'static) -> Command {
        Command::new(name, Self::with_action(action))
    }
}

impl Behavior for InstantCommand {
    fn initialize(&mut self, _ctx: &mut CommandContext<'_>) {
        if let Some(action) = self.action.as_mut() {
            action();
        }
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Finishes once the command's own timeout has elapsed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimedCommand;

impl TimedCommand {
    pub fn command(name: impl Into<String>, secs: f64) -> Result<Command, SchedulerError> {
        Command::new(name, Self).with_timeout(secs)
    }
}

impl Behavior for TimedCommand {
    fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        ctx.is_timed_out()
    }
}

/// A [`TimedCommand`] named `Wait(<secs>)`.
pub struct WaitCommand;

impl WaitCommand {
    pub fn command(secs: f64) -> Result<Command, SchedulerError> {
        TimedCommand::command(format!("Wait({secs})"), secs)
    }
}

/// Finishes once the clock reads at least `until` seconds.
#[derive(Debug, Clone, Copy)]
pub struct WaitUntilCommand {
    until: f64,
}

impl WaitUntilCommand {
    pub fn new(until: f64) -> Self {
        Self { until }
    }

    pub fn command(until: f64) -> Command {
        Command::new(format!("WaitUntil({until})"), Self::new(until))
    }
}

impl Behavior for WaitUntilCommand {
    fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        ctx.now() >= self.until
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PrintCommand / StartCommand
// ─────────────────────────────────────────────────────────────────────────────

/// Logs a message at `info` and finishes.
#[derive(Debug, Clone)]
pub struct PrintCommand {
    message: String,
}

impl PrintCommand {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn command(message: impl Into<String>) -> Command {
        let behavior = Self::new(message);
        Command::new(format!("Print(\"{}\")", behavior.message), behavior)
    }
}

impl Behavior for PrintCommand {
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        info!(command = %ctx.name(), "{}", self.message);
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        true
    }
}

/// Starts another top-level command and finishes.
#[derive(Debug, Clone, Copy)]
pub struct StartCommand {
    target: CommandId,
}

impl StartCommand {
    pub fn new(target: CommandId) -> Self {
        Self { target }
    }

    pub fn command(target: CommandId) -> Command {
        Command::new(format!("Start({target})"), Self::new(target))
    }
}

impl Behavior for StartCommand {
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        if let Err(err) = ctx.start(self.target) {
            warn!(command = %ctx.name(), error = %err, "could not start target");
        }
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Group helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Blocks a command group's sequence until all of its background children
/// have finished.  Outside a group it finishes immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitForChildren;

impl WaitForChildren {
    pub fn command() -> Command {
        Command::new("WaitForChildren", Self)
    }
}

impl Behavior for WaitForChildren {
    fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        !ctx.group_has_active_branches()
    }
}

/// Chooses between two commands when it initializes.
///
/// Registered through
/// [`Scheduler::add_conditional`][crate::scheduler::Scheduler::add_conditional],
/// which makes the conditional require the union of both branches.  The
/// chosen branch runs without its own requirements, so it does not evict
/// the conditional, and gets them back once it is removed.
pub struct ConditionalCommand {
    on_true: CommandId,
    on_false: CommandId,
    condition: Box<dyn FnMut() -> bool + Send>,
    chosen: Option<CommandId>,
}

impl ConditionalCommand {
    pub fn new(
        on_true: CommandId,
        on_false: CommandId,
        condition: impl FnMut() -> bool + Send + 'static,
    ) -> Self {
        Self {
            on_true,
            on_false,
            condition: Box::new(condition),
            chosen: None,
        }
    }
}

impl Behavior for ConditionalCommand {
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        let chosen = if (self.condition)() {
            self.on_true
        } else {
            self.on_false
        };
        ctx.lend_requirements(chosen);
        self.chosen = match ctx.start(chosen) {
            Ok(()) => Some(chosen),
            Err(SchedulerError::AlreadyQueued(_)) => Some(chosen),
            Err(err) => {
                warn!(command = %ctx.name(), error = %err, "could not start branch");
                ctx.reclaim_requirements(chosen);
                None
            }
        };
    }

    fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        self.chosen.is_none_or(|chosen| ctx.is_completed(chosen))
    }

    fn interrupted(&mut self, ctx: &mut CommandContext<'_>) {
        if let Some(chosen) = self.chosen
            && ctx.is_running(chosen)
            && let Err(err) = ctx.cancel(chosen)
        {
            warn!(command = %ctx.name(), error = %err, "could not cancel branch");
        }
    }
}

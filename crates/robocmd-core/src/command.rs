//! Command lifecycle.
//!
//! A command is the smallest schedulable task.  Once admitted by the
//! [`Scheduler`][crate::scheduler::Scheduler] it is driven through:
//!
//! 1. `start_running` – marks it running and clears its start time.
//! 2. `run` – once per tick.  The first call fires
//!    [`Behavior::initialize`]; every call fires [`Behavior::execute`] and
//!    then asks [`Behavior::is_finished`].
//! 3. `removed` – exactly once per admission.  Fires
//!    [`Behavior::interrupted`] if the command was canceled, otherwise
//!    [`Behavior::end`], then resets the lifecycle flags so the same command
//!    may be started again later.
//!
//! Commands are either leaves carrying user [`Behavior`] hooks, or command
//! groups whose execution step lives in the private `group` module.

use std::collections::{BTreeSet, VecDeque};

use robocmd_types::{CommandId, SchedulerError, SubsystemId};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::group::Group;
use crate::host::HostState;

// ─────────────────────────────────────────────────────────────────────────────
// Behavior hooks
// ─────────────────────────────────────────────────────────────────────────────

/// User-supplied hooks of a leaf command.
///
/// Every hook has a default body.  A command that overrides nothing runs
/// until it is canceled.
///
/// Hooks must return promptly: long-running work is expressed as state
/// carried across ticks, with [`is_finished`][Behavior::is_finished]
/// reporting `false` until it is done.
pub trait Behavior: Send {
    /// Called on the first tick after the command was admitted.
    fn initialize(&mut self, _ctx: &mut CommandContext<'_>) {}

    /// Called every tick while the command runs.
    fn execute(&mut self, _ctx: &mut CommandContext<'_>) {}

    /// Whether the command is done.  The default never finishes on its own.
    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        false
    }

    /// Called once when the command finished normally.
    fn end(&mut self, _ctx: &mut CommandContext<'_>) {}

    /// Called once when the command was canceled or evicted.  Defaults to
    /// [`end`][Behavior::end].
    fn interrupted(&mut self, ctx: &mut CommandContext<'_>) {
        self.end(ctx);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command definition
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) enum CommandKind {
    /// `None` only while one of the hooks is executing.
    Leaf(Option<Box<dyn Behavior>>),
    Group(Group),
}

/// A command definition, registered with
/// [`Scheduler::add_command`][crate::scheduler::Scheduler::add_command].
///
/// ```
/// use robocmd_core::{Behavior, Command, CommandContext, Scheduler};
///
/// struct Spin;
/// impl Behavior for Spin {
///     fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool {
///         ctx.is_timed_out()
///     }
/// }
///
/// let mut scheduler = Scheduler::new();
/// let turret = scheduler.register_subsystem("Turret", robocmd_core::Passive);
/// let spin = Command::new("Spin", Spin)
///     .requiring(turret)
///     .with_timeout(1.5)
///     .unwrap();
/// let id = scheduler.add_command(spin).unwrap();
/// assert!(scheduler.does_require(id, turret));
/// ```
pub struct Command {
    pub(crate) name: String,
    pub(crate) timeout: Option<f64>,
    pub(crate) requirements: BTreeSet<SubsystemId>,
    pub(crate) interruptible: bool,
    pub(crate) run_when_disabled: bool,
    pub(crate) kind: CommandKind,
}

impl Command {
    /// A leaf command driven by `behavior`.
    pub fn new(name: impl Into<String>, behavior: impl Behavior + 'static) -> Self {
        Self::with_kind(name, CommandKind::Leaf(Some(Box::new(behavior))))
    }

    /// An empty command group.  Add entries with
    /// [`Scheduler::add_sequential`][crate::scheduler::Scheduler::add_sequential]
    /// and friends before starting it.
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, CommandKind::Group(Group::default()))
    }

    fn with_kind(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            requirements: BTreeSet::new(),
            interruptible: true,
            run_when_disabled: false,
            kind,
        }
    }

    /// Declare exclusive use of `subsystem`.
    pub fn requiring(mut self, subsystem: SubsystemId) -> Self {
        self.requirements.insert(subsystem);
        self
    }

    /// Set the timeout consulted by [`CommandContext::is_timed_out`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NegativeTimeout`] when `secs < 0`.
    pub fn with_timeout(mut self, secs: f64) -> Result<Self, SchedulerError> {
        if secs < 0.0 {
            return Err(SchedulerError::NegativeTimeout(secs));
        }
        self.timeout = Some(secs);
        Ok(self)
    }

    pub fn interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    /// Keep running while the host is disabled instead of self-canceling.
    pub fn run_when_disabled(mut self, run: bool) -> Self {
        self.run_when_disabled = run;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime node
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct CommandNode {
    pub(crate) name: String,
    pub(crate) timeout: Option<f64>,
    pub(crate) requirements: BTreeSet<SubsystemId>,
    pub(crate) interruptible: bool,
    pub(crate) run_when_disabled: bool,
    pub(crate) kind: CommandKind,

    pub(crate) initialized: bool,
    pub(crate) running: bool,
    pub(crate) completed: bool,
    pub(crate) canceled: bool,
    pub(crate) locked: bool,
    pub(crate) queued: bool,
    pub(crate) parent: Option<CommandId>,
    pub(crate) start_time: Option<f64>,
    /// Requirements set aside while another command runs this one on its
    /// behalf.  Put back when this command is removed.
    pub(crate) lent_requirements: Option<BTreeSet<SubsystemId>>,
}

impl From<Command> for CommandNode {
    fn from(command: Command) -> Self {
        Self {
            name: command.name,
            timeout: command.timeout,
            requirements: command.requirements,
            interruptible: command.interruptible,
            run_when_disabled: command.run_when_disabled,
            kind: command.kind,
            initialized: false,
            running: false,
            completed: true,
            canceled: false,
            locked: false,
            queued: false,
            parent: None,
            start_time: None,
            lent_requirements: None,
        }
    }
}

impl CommandNode {
    pub(crate) fn is_group(&self) -> bool {
        matches!(self.kind, CommandKind::Group(_))
    }

    pub(crate) fn shares_requirement(&self, other: &BTreeSet<SubsystemId>) -> bool {
        self.requirements.intersection(other).next().is_some()
    }

    pub(crate) fn reclaim_requirements(&mut self) {
        if let Some(requirements) = self.lent_requirements.take() {
            self.requirements = requirements;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Hook {
    Initialize,
    Execute,
    End,
    Interrupted,
}

/// Command arena plus the collaborators every lifecycle step needs.
///
/// The [`Scheduler`][crate::scheduler::Scheduler] owns exactly one engine
/// and layers subsystem occupancy and triggers on top of it.
pub(crate) struct Engine {
    pub(crate) nodes: Vec<CommandNode>,
    /// Commands waiting for admission, in `start()` order.
    pub(crate) pending: VecDeque<CommandId>,
    /// Set while the scheduler evicts occupants during an admission.
    pub(crate) admitting: bool,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) host: Box<dyn HostState>,
}

impl Engine {
    pub(crate) fn new(clock: Box<dyn Clock>, host: Box<dyn HostState>) -> Self {
        Self {
            nodes: Vec::new(),
            pending: VecDeque::new(),
            admitting: false,
            clock,
            host,
        }
    }

    pub(crate) fn insert(&mut self, command: Command) -> CommandId {
        let id = CommandId::from_index(self.nodes.len());
        self.nodes.push(command.into());
        id
    }

    pub(crate) fn node(&self, id: CommandId) -> Result<&CommandNode, SchedulerError> {
        self.nodes
            .get(id.index())
            .ok_or(SchedulerError::UnknownCommand(id))
    }

    pub(crate) fn node_mut(&mut self, id: CommandId) -> Result<&mut CommandNode, SchedulerError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(SchedulerError::UnknownCommand(id))
    }

    pub(crate) fn name(&self, id: CommandId) -> &str {
        self.nodes
            .get(id.index())
            .map(|n| n.name.as_str())
            .unwrap_or("")
    }

    pub(crate) fn now(&self) -> f64 {
        self.clock.now()
    }

    // ── configuration ───────────────────────────────────────────────────────

    pub(crate) fn requires(
        &mut self,
        id: CommandId,
        subsystem: SubsystemId,
    ) -> Result<(), SchedulerError> {
        let node = self.node_mut(id)?;
        if node.locked {
            return Err(SchedulerError::RequirementsLocked(node.name.clone()));
        }
        node.requirements.insert(subsystem);
        Ok(())
    }

    pub(crate) fn set_timeout(&mut self, id: CommandId, secs: f64) -> Result<(), SchedulerError> {
        if secs < 0.0 {
            return Err(SchedulerError::NegativeTimeout(secs));
        }
        self.node_mut(id)?.timeout = Some(secs);
        Ok(())
    }

    // ── external lifecycle entry points ─────────────────────────────────────

    /// Queue `id` for admission at the next admission step.
    pub(crate) fn start(&mut self, id: CommandId) -> Result<(), SchedulerError> {
        let admitting = self.admitting;
        let node = self.node_mut(id)?;
        node.locked = true;
        if node.parent.is_some() {
            return Err(SchedulerError::Parented(node.name.clone()));
        }
        if admitting {
            warn!(
                command = %node.name,
                "can not start a command from an eviction callback; ignoring"
            );
            return Err(SchedulerError::ReentrantAdmission(node.name.clone()));
        }
        if node.queued {
            return Err(SchedulerError::AlreadyQueued(node.name.clone()));
        }
        node.queued = true;
        node.completed = false;
        self.pending.push_back(id);
        Ok(())
    }

    /// Cancel a top-level command.
    pub(crate) fn cancel(&mut self, id: CommandId) -> Result<(), SchedulerError> {
        let node = self.node(id)?;
        if node.parent.is_some() {
            return Err(SchedulerError::Parented(node.name.clone()));
        }
        self.force_cancel(id);
        Ok(())
    }

    /// Flag `id` as canceled regardless of parentage.  No-op unless running.
    pub(crate) fn force_cancel(&mut self, id: CommandId) {
        if let Some(node) = self.nodes.get_mut(id.index())
            && node.running
        {
            node.canceled = true;
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    pub(crate) fn start_running(&mut self, id: CommandId) {
        let node = &mut self.nodes[id.index()];
        node.running = true;
        node.start_time = None;
    }

    /// One tick of `id`.  Returns whether it should stay scheduled.
    pub(crate) fn run(&mut self, id: CommandId) -> bool {
        let disabled = self.host.is_disabled();
        let now = self.now();
        let newly_initialized = {
            let node = &mut self.nodes[id.index()];
            if disabled && !node.run_when_disabled && node.parent.is_none() && node.running {
                debug!(command = %node.name, "host disabled; canceling");
                node.canceled = true;
            }
            if node.canceled {
                return false;
            }
            let fresh = !node.initialized;
            if fresh {
                node.initialized = true;
                node.start_time = Some(now);
            }
            fresh
        };

        let is_group = self.nodes[id.index()].is_group();
        if newly_initialized {
            if is_group {
                self.group_initialize(id);
            }
            self.call_hook(id, Hook::Initialize);
        }
        if is_group {
            self.group_execute(id);
        }
        self.call_hook(id, Hook::Execute);
        !self.is_finished(id)
    }

    pub(crate) fn is_finished(&mut self, id: CommandId) -> bool {
        if self.nodes[id.index()].is_group() {
            return self.group_finished(id);
        }
        self.with_behavior(id, false, |behavior, ctx| behavior.is_finished(ctx))
    }

    /// Dispatch to `interrupted` or `end`, then reset the lifecycle flags.
    ///
    /// Hooks only fire if the command got as far as initializing, so calling
    /// this twice fires them at most once.
    pub(crate) fn removed(&mut self, id: CommandId) {
        let (initialized, canceled, is_group) = {
            let node = &self.nodes[id.index()];
            (node.initialized, node.canceled, node.is_group())
        };
        if initialized {
            if canceled {
                self.call_hook(id, Hook::Interrupted);
            } else {
                self.call_hook(id, Hook::End);
            }
            if is_group {
                self.group_end(id);
            }
        }
        let node = &mut self.nodes[id.index()];
        node.initialized = false;
        node.canceled = false;
        node.running = false;
        node.completed = true;
        node.reclaim_requirements();
    }

    // ── queries ─────────────────────────────────────────────────────────────

    pub(crate) fn time_since_initialized(&self, id: CommandId) -> f64 {
        match self.nodes.get(id.index()).and_then(|n| n.start_time) {
            Some(start) => self.now() - start,
            None => 0.0,
        }
    }

    pub(crate) fn is_timed_out(&self, id: CommandId) -> bool {
        match self.nodes.get(id.index()).and_then(|n| n.timeout) {
            Some(timeout) => self.time_since_initialized(id) >= timeout,
            None => false,
        }
    }

    pub(crate) fn is_interruptible(&self, id: CommandId) -> bool {
        let Some(node) = self.nodes.get(id.index()) else {
            return true;
        };
        if !node.interruptible {
            return false;
        }
        if node.is_group() {
            return self.group_interruptible(id);
        }
        true
    }

    pub(crate) fn is_running(&self, id: CommandId) -> bool {
        self.nodes.get(id.index()).is_some_and(|n| n.running)
    }

    pub(crate) fn is_completed(&self, id: CommandId) -> bool {
        self.nodes.get(id.index()).is_some_and(|n| n.completed)
    }

    // ── hook plumbing ───────────────────────────────────────────────────────

    fn call_hook(&mut self, id: CommandId, hook: Hook) {
        self.with_behavior(id, (), |behavior, ctx| match hook {
            Hook::Initialize => behavior.initialize(ctx),
            Hook::Execute => behavior.execute(ctx),
            Hook::End => behavior.end(ctx),
            Hook::Interrupted => behavior.interrupted(ctx),
        });
    }

    /// Lend `id`'s behavior out of the arena for the duration of `f`, so the
    /// hook can reach the rest of the engine through its context.
    ///
    /// Groups have no behavior; a behavior already on loan (a hook querying
    /// its own command) yields `default`.
    fn with_behavior<R>(
        &mut self,
        id: CommandId,
        default: R,
        f: impl FnOnce(&mut Box<dyn Behavior>, &mut CommandContext<'_>) -> R,
    ) -> R {
        let taken = match &mut self.nodes[id.index()].kind {
            CommandKind::Leaf(slot) => slot.take(),
            CommandKind::Group(_) => None,
        };
        let Some(mut behavior) = taken else {
            return default;
        };
        let result = {
            let mut ctx = CommandContext { id, engine: self };
            f(&mut behavior, &mut ctx)
        };
        if let CommandKind::Leaf(slot) = &mut self.nodes[id.index()].kind {
            *slot = Some(behavior);
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandContext
// ─────────────────────────────────────────────────────────────────────────────

/// What a [`Behavior`] hook can see and do.
///
/// Starting a command from a hook only queues it; it is admitted at the
/// scheduler's next admission step.  Starting from an `interrupted`/`end`
/// hook that runs because the command is being evicted is refused with
/// [`SchedulerError::ReentrantAdmission`].
pub struct CommandContext<'a> {
    id: CommandId,
    engine: &'a mut Engine,
}

impl CommandContext<'_> {
    /// The command whose hook is running.
    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.engine.name(self.id)
    }

    /// Current clock reading in seconds.
    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    /// Seconds since this command's first run.
    pub fn time_since_initialized(&self) -> f64 {
        self.engine.time_since_initialized(self.id)
    }

    /// Whether this command's own timeout has elapsed.  Always `false`
    /// without a timeout.
    pub fn is_timed_out(&self) -> bool {
        self.engine.is_timed_out(self.id)
    }

    pub fn is_host_disabled(&self) -> bool {
        self.engine.host.is_disabled()
    }

    /// The command group this command belongs to, if any.
    pub fn group(&self) -> Option<CommandId> {
        self.engine.nodes[self.id.index()].parent
    }

    /// Whether this command's group has background branches still running.
    /// `false` for commands outside a group.
    pub fn group_has_active_branches(&self) -> bool {
        self.group()
            .is_some_and(|parent| self.engine.group_has_branches(parent))
    }

    /// Queue another command for admission.
    pub fn start(&mut self, command: CommandId) -> Result<(), SchedulerError> {
        self.engine.start(command)
    }

    /// Cancel another top-level command.
    pub fn cancel(&mut self, command: CommandId) -> Result<(), SchedulerError> {
        self.engine.cancel(command)
    }

    pub fn is_running(&self, command: CommandId) -> bool {
        self.engine.is_running(command)
    }

    pub fn is_completed(&self, command: CommandId) -> bool {
        self.engine.is_completed(command)
    }

    /// Set aside the requirements of a command that is neither running nor
    /// queued, so that starting it does not evict the caller.  They come
    /// back when that command is removed, or on
    /// [`reclaim_requirements`](Self::reclaim_requirements).
    pub(crate) fn lend_requirements(&mut self, command: CommandId) {
        if let Some(node) = self.engine.nodes.get_mut(command.index())
            && !node.running
            && !node.queued
            && node.lent_requirements.is_none()
        {
            node.lent_requirements = Some(std::mem::take(&mut node.requirements));
        }
    }

    pub(crate) fn reclaim_requirements(&mut self, command: CommandId) {
        if let Some(node) = self.engine.nodes.get_mut(command.index()) {
            node.reclaim_requirements();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::SharedHostState;
    use crate::test_support::{Journal, Probe};

    fn engine() -> (Engine, ManualClock, SharedHostState) {
        let clock = ManualClock::new();
        let host = SharedHostState::new();
        let engine = Engine::new(Box::new(clock.clone()), Box::new(host.clone()));
        (engine, clock, host)
    }

    #[test]
    fn new_command_defaults() {
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("Percival", Probe::idle()));
        let node = engine.node(id).unwrap();
        assert_eq!(node.name, "Percival");
        assert_eq!(node.timeout, None);
        assert!(node.requirements.is_empty());
        assert!(node.interruptible);
        assert!(!node.running);
        assert!(node.completed);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let err = Command::new("c", Probe::idle()).with_timeout(-1.0).err();
        assert_eq!(err, Some(SchedulerError::NegativeTimeout(-1.0)));

        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()));
        assert!(engine.set_timeout(id, -0.5).is_err());
        assert!(engine.set_timeout(id, 2.0).is_ok());
        assert_eq!(engine.node(id).unwrap().timeout, Some(2.0));
    }

    #[test]
    fn requires_after_lock_fails() {
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()));
        engine.requires(id, SubsystemId::from_index(0)).unwrap();
        engine.start(id).unwrap();
        let err = engine.requires(id, SubsystemId::from_index(1));
        assert_eq!(err, Err(SchedulerError::RequirementsLocked("c".into())));
    }

    #[test]
    fn start_twice_reports_already_queued() {
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()));
        engine.start(id).unwrap();
        assert_eq!(engine.start(id), Err(SchedulerError::AlreadyQueued("c".into())));
        assert_eq!(engine.pending.len(), 1);
        assert!(!engine.is_completed(id));
    }

    #[test]
    fn first_run_initializes_then_executes() {
        let journal = Journal::default();
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::new("c", &journal).0));
        engine.start_running(id);
        assert!(engine.run(id));
        assert!(engine.run(id));
        assert!(engine.run(id));
        assert_eq!(
            journal.entries(),
            ["c:initialize", "c:execute", "c:execute", "c:execute"]
        );
    }

    #[test]
    fn canceled_command_does_not_run() {
        let journal = Journal::default();
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::new("c", &journal).0));
        engine.start_running(id);
        engine.cancel(id).unwrap();
        assert!(!engine.run(id));
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn cancel_is_noop_when_not_running() {
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()));
        engine.cancel(id).unwrap();
        assert!(!engine.nodes[id.index()].canceled);
    }

    #[test]
    fn finished_command_reports_false_from_run() {
        let journal = Journal::default();
        let (mut engine, _, _) = engine();
        let (probe, done) = Probe::new("c", &journal);
        let id = engine.insert(Command::new("c", probe));
        engine.start_running(id);
        assert!(engine.run(id));
        done.set();
        assert!(!engine.run(id));
    }

    #[test]
    fn removed_without_initialize_fires_nothing() {
        let journal = Journal::default();
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::new("c", &journal).0));
        engine.removed(id);
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn removed_fires_end_once() {
        let journal = Journal::default();
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::new("c", &journal).0));
        engine.start_running(id);
        engine.run(id);
        engine.removed(id);
        engine.removed(id);
        assert_eq!(journal.count("c:end"), 1);
        assert_eq!(journal.count("c:interrupted"), 0);
        assert!(!engine.is_running(id));
        assert!(engine.is_completed(id));
    }

    #[test]
    fn removed_after_cancel_fires_interrupted_once() {
        let journal = Journal::default();
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::new("c", &journal).0));
        engine.start_running(id);
        engine.run(id);
        engine.cancel(id).unwrap();
        engine.removed(id);
        engine.removed(id);
        assert_eq!(journal.count("c:interrupted"), 1);
        assert_eq!(journal.count("c:end"), 0);
        assert!(!engine.nodes[id.index()].canceled);
    }

    #[test]
    fn disabled_host_cancels_top_level_command() {
        let journal = Journal::default();
        let (mut engine, _, host) = engine();
        let id = engine.insert(Command::new("c", Probe::new("c", &journal).0));
        engine.start_running(id);
        host.set_disabled(true);
        assert!(!engine.run(id));
        assert!(engine.nodes[id.index()].canceled);
    }

    #[test]
    fn run_when_disabled_keeps_running() {
        let (mut engine, _, host) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()).run_when_disabled(true));
        engine.start_running(id);
        host.set_disabled(true);
        assert!(engine.run(id));
        assert!(!engine.nodes[id.index()].canceled);
    }

    #[test]
    fn time_since_initialized_tracks_first_run() {
        let (mut engine, clock, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()).with_timeout(2.0).unwrap());
        assert_eq!(engine.time_since_initialized(id), 0.0);

        clock.set(2.0);
        engine.start_running(id);
        engine.run(id);
        clock.set(3.9);
        assert!((engine.time_since_initialized(id) - 1.9).abs() < 1e-9);
        assert!(!engine.is_timed_out(id));
        clock.set(4.0);
        assert!(engine.is_timed_out(id));
    }

    #[test]
    fn no_timeout_never_times_out() {
        let (mut engine, clock, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()));
        engine.start_running(id);
        engine.run(id);
        clock.set(500_000.0);
        assert!(!engine.is_timed_out(id));
    }

    #[test]
    fn interruptible_flag_is_reported() {
        let (mut engine, _, _) = engine();
        let id = engine.insert(Command::new("c", Probe::idle()).interruptible(false));
        assert!(!engine.is_interruptible(id));
    }

    #[test]
    fn lent_requirements_return_on_removal() {
        let (mut engine, _, _) = engine();
        let arm = SubsystemId::from_index(0);
        let owner = engine.insert(Command::new("Owner", Probe::idle()));
        let branch = engine.insert(Command::new("Branch", Probe::idle()).requiring(arm));

        let mut ctx = CommandContext { id: owner, engine: &mut engine };
        ctx.lend_requirements(branch);
        assert!(engine.nodes[branch.index()].requirements.is_empty());

        engine.start_running(branch);
        engine.run(branch);
        engine.removed(branch);
        assert!(engine.nodes[branch.index()].requirements.contains(&arm));
        assert!(engine.nodes[branch.index()].lent_requirements.is_none());
    }

    #[test]
    fn running_command_keeps_its_requirements() {
        let (mut engine, _, _) = engine();
        let arm = SubsystemId::from_index(0);
        let owner = engine.insert(Command::new("Owner", Probe::idle()));
        let branch = engine.insert(Command::new("Branch", Probe::idle()).requiring(arm));
        engine.start_running(branch);

        let mut ctx = CommandContext { id: owner, engine: &mut engine };
        ctx.lend_requirements(branch);
        ctx.reclaim_requirements(branch);
        assert!(engine.nodes[branch.index()].requirements.contains(&arm));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let (mut engine, _, _) = engine();
        let ghost = CommandId::from_index(99);
        assert_eq!(engine.start(ghost), Err(SchedulerError::UnknownCommand(ghost)));
        assert!(!engine.is_running(ghost));
    }
}

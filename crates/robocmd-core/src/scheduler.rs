//! [`Scheduler`] – the tick-driven coordinator.
//!
//! The scheduler owns every command, subsystem and trigger, and is the only
//! place where subsystem occupancy changes.  Each call to
//! [`Scheduler::tick`] performs, in order:
//!
//! 1. Drain requests sent through [`SchedulerHandle`]s.
//! 2. Poll trigger bindings, newest first.
//! 3. Call [`Subsystem::periodic`] on every subsystem.
//! 4. Run every admitted command in admission order, removing the ones that
//!    report they are done.
//! 5. Admit the commands queued by `start()` since the last admission step.
//! 6. Admit the default command of every idle subsystem, then publish
//!    occupancy changes to the telemetry sink.
//!
//! Admission is all-or-nothing: if any required subsystem is held by an
//! uninterruptible command the new command is dropped for this tick.
//! Otherwise every occupant is evicted and the new command takes over all
//! of its requirements at once.

use robocmd_types::{
    BindingMode, CommandId, CommandSnapshot, EntryMode, SchedulerError, SchedulerSnapshot,
    SubsystemId, SubsystemSnapshot, TriggerId,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, debug_span, warn};

use crate::builtins::ConditionalCommand;
use crate::clock::{Clock, MonotonicClock};
use crate::command::{Command, Engine};
use crate::host::{AlwaysEnabled, HostState};
use crate::subsystem::{Subsystem, SubsystemSlot};
use crate::telemetry::{NullSink, TelemetrySink};
use crate::trigger::TriggerRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Cross-thread handle
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Start(CommandId),
    Cancel(CommandId),
}

/// Cloneable, `Send` handle for starting and canceling commands from other
/// threads or tasks.
///
/// Requests are queued and applied at the beginning of the scheduler's next
/// enabled tick, before triggers are polled.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: UnboundedSender<Request>,
}

impl SchedulerHandle {
    pub fn start(&self, command: CommandId) -> Result<(), SchedulerError> {
        self.send(Request::Start(command))
    }

    pub fn cancel(&self, command: CommandId) -> Result<(), SchedulerError> {
        self.send(Request::Cancel(command))
    }

    fn send(&self, request: Request) -> Result<(), SchedulerError> {
        self.tx
            .send(request)
            .map_err(|_| SchedulerError::SchedulerClosed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Configures the collaborators a [`Scheduler`] consults.
///
/// Anything left unset falls back to [`MonotonicClock`], [`AlwaysEnabled`]
/// and [`NullSink`].
#[derive(Default)]
pub struct SchedulerBuilder {
    clock: Option<Box<dyn Clock>>,
    host: Option<Box<dyn HostState>>,
    telemetry: Option<Box<dyn TelemetrySink>>,
}

impl SchedulerBuilder {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn host_state(mut self, host: impl HostState + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    pub fn telemetry(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.telemetry = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> Scheduler {
        let clock = self
            .clock
            .unwrap_or_else(|| Box::new(MonotonicClock::new()));
        let host = self.host.unwrap_or_else(|| Box::new(AlwaysEnabled));
        let telemetry = self.telemetry.unwrap_or_else(|| Box::new(NullSink));
        let (outbox, inbox) = mpsc::unbounded_channel();
        Scheduler {
            engine: Engine::new(clock, host),
            subsystems: Vec::new(),
            triggers: TriggerRegistry::default(),
            admitted: Vec::new(),
            disabled: false,
            running_changed: false,
            ticks: 0,
            telemetry,
            inbox,
            outbox,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Owns commands, subsystems and triggers, and drives them once per tick.
pub struct Scheduler {
    engine: Engine,
    subsystems: Vec<SubsystemSlot>,
    triggers: TriggerRegistry,
    /// Admitted top-level commands in admission order.
    admitted: Vec<CommandId>,
    disabled: bool,
    running_changed: bool,
    ticks: u64,
    telemetry: Box<dyn TelemetrySink>,
    inbox: UnboundedReceiver<Request>,
    outbox: UnboundedSender<Request>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// A scheduler on a monotonic clock with an always-enabled host and no
    /// telemetry.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// A handle that can submit requests from other threads.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.outbox.clone(),
        }
    }

    // ── commands ────────────────────────────────────────────────────────────

    /// Register a command definition.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownSubsystem`] if the command requires a
    /// subsystem this scheduler does not know.
    pub fn add_command(&mut self, command: Command) -> Result<CommandId, SchedulerError> {
        if let Some(unknown) = command
            .requirements
            .iter()
            .find(|sid| sid.index() >= self.subsystems.len())
        {
            return Err(SchedulerError::UnknownSubsystem(*unknown));
        }
        Ok(self.engine.insert(command))
    }

    /// Register an empty command group.
    pub fn add_group(&mut self, name: impl Into<String>) -> CommandId {
        self.engine.insert(Command::group(name))
    }

    /// Append a sequential entry to `group`.  The group's cursor waits for it
    /// to finish, or for `timeout` seconds to pass since it started.
    pub fn add_sequential(
        &mut self,
        group: CommandId,
        command: CommandId,
        timeout: Option<f64>,
    ) -> Result<(), SchedulerError> {
        self.engine
            .add_entry(group, command, EntryMode::InSequence, timeout)
    }

    /// Append a background child to `group`.
    pub fn add_parallel(
        &mut self,
        group: CommandId,
        command: CommandId,
        timeout: Option<f64>,
    ) -> Result<(), SchedulerError> {
        self.engine
            .add_entry(group, command, EntryMode::BranchChild, timeout)
    }

    /// Append an entry that `group` starts as an independent top-level
    /// command.
    pub fn add_peer(&mut self, group: CommandId, command: CommandId) -> Result<(), SchedulerError> {
        self.engine
            .add_entry(group, command, EntryMode::BranchPeer, None)
    }

    /// Entries of `group` in order.  Empty for leaf commands.
    pub fn group_entries(&self, group: CommandId) -> Result<Vec<(CommandId, EntryMode)>, SchedulerError> {
        self.engine.node(group)?;
        Ok(self.engine.group_entries(group))
    }

    /// Register a [`ConditionalCommand`] choosing between `on_true` and
    /// `on_false`.  It requires every subsystem either branch requires.
    pub fn add_conditional(
        &mut self,
        name: impl Into<String>,
        on_true: CommandId,
        on_false: CommandId,
        condition: impl FnMut() -> bool + Send + 'static,
    ) -> Result<CommandId, SchedulerError> {
        let mut command = Command::new(name, ConditionalCommand::new(on_true, on_false, condition));
        for branch in [on_true, on_false] {
            let node = self.engine.node(branch)?;
            command.requirements.extend(node.requirements.iter().copied());
        }
        self.add_command(command)
    }

    pub fn requires(&mut self, command: CommandId, subsystem: SubsystemId) -> Result<(), SchedulerError> {
        self.subsystem(subsystem)?;
        self.engine.requires(command, subsystem)
    }

    pub fn set_timeout(&mut self, command: CommandId, secs: f64) -> Result<(), SchedulerError> {
        self.engine.set_timeout(command, secs)
    }

    pub fn set_interruptible(&mut self, command: CommandId, interruptible: bool) -> Result<(), SchedulerError> {
        self.engine.node_mut(command)?.interruptible = interruptible;
        Ok(())
    }

    pub fn set_run_when_disabled(&mut self, command: CommandId, run: bool) -> Result<(), SchedulerError> {
        self.engine.node_mut(command)?.run_when_disabled = run;
        Ok(())
    }

    // ── command lifecycle ───────────────────────────────────────────────────

    /// Queue `command` for admission at the next tick's admission step.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Parented`] if the command belongs to a group.
    /// - [`SchedulerError::AlreadyQueued`] if it is already waiting for
    ///   admission.
    pub fn start(&mut self, command: CommandId) -> Result<(), SchedulerError> {
        self.engine.start(command)
    }

    /// Same as [`start`][Scheduler::start].
    pub fn add(&mut self, command: CommandId) -> Result<(), SchedulerError> {
        self.start(command)
    }

    /// Flag a running top-level command as canceled.  Its `interrupted` hook
    /// fires on the next tick.
    pub fn cancel(&mut self, command: CommandId) -> Result<(), SchedulerError> {
        self.engine.cancel(command)
    }

    pub fn is_running(&self, command: CommandId) -> bool {
        self.engine.is_running(command)
    }

    pub fn is_completed(&self, command: CommandId) -> bool {
        self.engine.is_completed(command)
    }

    pub fn is_canceled(&self, command: CommandId) -> bool {
        self.engine.node(command).is_ok_and(|n| n.canceled)
    }

    pub fn is_interruptible(&self, command: CommandId) -> bool {
        self.engine.is_interruptible(command)
    }

    pub fn is_parented(&self, command: CommandId) -> bool {
        self.group_of(command).is_some()
    }

    /// The group `command` is a sequential entry or child of.
    pub fn group_of(&self, command: CommandId) -> Option<CommandId> {
        self.engine.node(command).ok().and_then(|n| n.parent)
    }

    pub fn does_require(&self, command: CommandId, subsystem: SubsystemId) -> bool {
        self.engine
            .node(command)
            .is_ok_and(|n| n.requirements.contains(&subsystem))
    }

    pub fn command_name(&self, command: CommandId) -> Option<&str> {
        self.engine.node(command).ok().map(|n| n.name.as_str())
    }

    pub fn time_since_initialized(&self, command: CommandId) -> f64 {
        self.engine.time_since_initialized(command)
    }

    /// Whether `command` has a timeout that has elapsed since its first run.
    pub fn is_timed_out(&self, command: CommandId) -> bool {
        self.engine.is_timed_out(command)
    }

    /// Admitted top-level commands in admission order.
    pub fn admitted(&self) -> &[CommandId] {
        &self.admitted
    }

    // ── subsystems ──────────────────────────────────────────────────────────

    pub fn register_subsystem(
        &mut self,
        name: impl Into<String>,
        hardware: impl Subsystem + 'static,
    ) -> SubsystemId {
        let id = SubsystemId::from_index(self.subsystems.len());
        self.subsystems
            .push(SubsystemSlot::new(name.into(), Box::new(hardware)));
        id
    }

    fn subsystem(&self, id: SubsystemId) -> Result<&SubsystemSlot, SchedulerError> {
        self.subsystems
            .get(id.index())
            .ok_or(SchedulerError::UnknownSubsystem(id))
    }

    fn subsystem_mut(&mut self, id: SubsystemId) -> Result<&mut SubsystemSlot, SchedulerError> {
        self.subsystems
            .get_mut(id.index())
            .ok_or(SchedulerError::UnknownSubsystem(id))
    }

    pub fn subsystem_name(&self, subsystem: SubsystemId) -> Option<&str> {
        self.subsystem(subsystem).ok().map(|s| s.name.as_str())
    }

    /// Set or clear the command admitted whenever `subsystem` is idle.
    ///
    /// An explicit call wins over [`Subsystem::init_default_command`].
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::DefaultMissingRequirement`] if `command` does not
    ///   require `subsystem`.
    /// - [`SchedulerError::Parented`] if `command` belongs to a group.
    pub fn set_default_command(
        &mut self,
        subsystem: SubsystemId,
        command: Option<CommandId>,
    ) -> Result<(), SchedulerError> {
        let slot_name = self.subsystem(subsystem)?.name.clone();
        if let Some(command) = command {
            let node = self.engine.node(command)?;
            if node.parent.is_some() {
                return Err(SchedulerError::Parented(node.name.clone()));
            }
            if !node.requirements.contains(&subsystem) {
                return Err(SchedulerError::DefaultMissingRequirement {
                    subsystem: slot_name,
                    command: node.name.clone(),
                });
            }
        }
        let slot = self.subsystem_mut(subsystem)?;
        slot.default = command;
        slot.default_initialized = true;
        slot.dirty = true;
        Ok(())
    }

    /// The default command of `subsystem`, asking the hardware for one the
    /// first time.
    pub fn default_command(&mut self, subsystem: SubsystemId) -> Result<Option<CommandId>, SchedulerError> {
        let slot = self.subsystem_mut(subsystem)?;
        if slot.default_initialized {
            return Ok(slot.default);
        }
        slot.default_initialized = true;
        let Some(command) = slot.hardware.init_default_command(subsystem) else {
            return Ok(None);
        };
        let id = self.add_command(command)?;
        self.set_default_command(subsystem, Some(id))?;
        Ok(Some(id))
    }

    pub fn default_command_name(&mut self, subsystem: SubsystemId) -> String {
        match self.default_command(subsystem) {
            Ok(Some(id)) => self.engine.name(id).to_string(),
            _ => String::new(),
        }
    }

    /// The command currently occupying `subsystem`.
    pub fn current_command(&self, subsystem: SubsystemId) -> Option<CommandId> {
        self.subsystem(subsystem).ok().and_then(|s| s.current)
    }

    /// Name of the current occupant, or an empty string when idle.
    pub fn current_command_name(&self, subsystem: SubsystemId) -> String {
        self.current_command(subsystem)
            .map(|id| self.engine.name(id).to_string())
            .unwrap_or_default()
    }

    // ── triggers ────────────────────────────────────────────────────────────

    /// Register a predicate sampled once per tick.
    pub fn register_trigger(&mut self, predicate: impl FnMut() -> bool + Send + 'static) -> TriggerId {
        self.triggers.register(Box::new(predicate))
    }

    /// Bind `command` to `trigger`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Parented`] if `command` belongs to a group.
    pub fn bind(&mut self, trigger: TriggerId, command: CommandId, mode: BindingMode) -> Result<(), SchedulerError> {
        self.triggers.bind(&self.engine, trigger, command, mode)
    }

    pub fn when_active(&mut self, trigger: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.bind(trigger, command, BindingMode::WhenActive)
    }

    pub fn while_active(&mut self, trigger: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.bind(trigger, command, BindingMode::WhileActive)
    }

    pub fn when_inactive(&mut self, trigger: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.bind(trigger, command, BindingMode::WhenInactive)
    }

    pub fn toggle_when_active(&mut self, trigger: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.bind(trigger, command, BindingMode::ToggleWhenActive)
    }

    pub fn cancel_when_active(&mut self, trigger: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.bind(trigger, command, BindingMode::CancelWhenActive)
    }

    pub fn when_pressed(&mut self, button: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.when_active(button, command)
    }

    pub fn while_held(&mut self, button: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.while_active(button, command)
    }

    pub fn when_released(&mut self, button: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.when_inactive(button, command)
    }

    pub fn toggle_when_pressed(&mut self, button: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.toggle_when_active(button, command)
    }

    pub fn cancel_when_pressed(&mut self, button: TriggerId, command: CommandId) -> Result<(), SchedulerError> {
        self.cancel_when_active(button, command)
    }

    // ── control ─────────────────────────────────────────────────────────────

    /// Turn [`tick`][Scheduler::tick] into a no-op.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Number of enabled ticks executed.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Run one scheduling cycle.
    ///
    /// # Errors
    ///
    /// Only configuration errors from a subsystem's lazily supplied default
    /// command are reported.  The rest of the tick still completes.
    pub fn tick(&mut self) -> Result<(), SchedulerError> {
        self.running_changed = false;
        if self.disabled {
            return Ok(());
        }
        self.ticks += 1;
        let span = debug_span!("tick", n = self.ticks);
        let _enter = span.enter();

        self.drain_requests();
        self.triggers.poll(&mut self.engine);

        for slot in &mut self.subsystems {
            slot.hardware.periodic();
        }

        for id in self.admitted.clone() {
            if !self.engine.run(id) {
                self.remove(id);
                self.running_changed = true;
            }
        }

        let pending = std::mem::take(&mut self.engine.pending);
        for id in pending {
            self.engine.nodes[id.index()].queued = false;
            self.admit(id);
        }

        let mut first_error = None;
        for index in 0..self.subsystems.len() {
            let subsystem = SubsystemId::from_index(index);
            if self.subsystems[index].current.is_none() {
                match self.default_command(subsystem) {
                    Ok(Some(default)) => self.admit(default),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(subsystem = %self.subsystems[index].name, error = %err, "default command rejected");
                        first_error.get_or_insert(err);
                    }
                }
            }
            self.confirm_command(index);
        }

        if self.running_changed {
            self.publish_running();
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Remove an admitted command: release its subsystems and fire its
    /// `removed` step.  Does nothing if the command is not admitted.
    pub fn remove(&mut self, command: CommandId) {
        let Some(position) = self.admitted.iter().position(|id| *id == command) else {
            return;
        };
        self.admitted.remove(position);
        self.release(command);
        self.engine.removed(command);
        debug!(command = %self.engine.name(command), "removed");
    }

    /// Remove every admitted command.  Registrations are kept.
    pub fn remove_all(&mut self) {
        for command in std::mem::take(&mut self.admitted) {
            self.release(command);
            self.engine.removed(command);
        }
        self.running_changed = true;
    }

    /// Return to a freshly constructed state, keeping registered commands
    /// and subsystems: every admitted command is removed, and pending
    /// admissions, handle requests, trigger bindings and occupancy are
    /// dropped.
    pub fn reset(&mut self) {
        self.remove_all();
        for id in std::mem::take(&mut self.engine.pending) {
            let node = &mut self.engine.nodes[id.index()];
            node.queued = false;
            node.completed = true;
            node.reclaim_requirements();
        }
        while self.inbox.try_recv().is_ok() {}
        self.triggers.clear();
        for slot in &mut self.subsystems {
            slot.set_current(None);
        }
        self.engine.admitting = false;
        self.disabled = false;
        self.running_changed = false;
        self.ticks = 0;
    }

    /// Point-in-time view for dashboards and tests.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let name = |id: CommandId| self.engine.name(id).to_string();
        let commands = self
            .admitted
            .iter()
            .filter_map(|id| {
                let node = self.engine.node(*id).ok()?;
                Some(CommandSnapshot {
                    id: *id,
                    name: node.name.clone(),
                    running: node.running,
                    canceled: node.canceled,
                    interruptible: self.engine.is_interruptible(*id),
                    elapsed_secs: self.engine.time_since_initialized(*id),
                    requirements: node
                        .requirements
                        .iter()
                        .filter_map(|sid| self.subsystem_name(*sid).map(str::to_string))
                        .collect(),
                })
            })
            .collect();
        let subsystems = self
            .subsystems
            .iter()
            .enumerate()
            .map(|(index, slot)| SubsystemSnapshot {
                id: SubsystemId::from_index(index),
                name: slot.name.clone(),
                current_command: slot.current.map(name),
                default_command: slot.default.map(name),
            })
            .collect();
        SchedulerSnapshot {
            tick: self.ticks,
            timestamp: self.engine.now(),
            disabled: self.disabled,
            commands,
            subsystems,
            pending: self.engine.pending.len(),
        }
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn drain_requests(&mut self) {
        while let Ok(request) = self.inbox.try_recv() {
            let (command, result) = match request {
                Request::Start(id) => (id, self.engine.start(id)),
                Request::Cancel(id) => (id, self.engine.cancel(id)),
            };
            match result {
                Ok(()) | Err(SchedulerError::AlreadyQueued(_)) => {}
                Err(err) => warn!(%command, error = %err, "handle request rejected"),
            }
        }
    }

    fn admit(&mut self, command: CommandId) {
        let name = self.engine.name(command).to_string();
        if self.admitted.contains(&command) {
            return;
        }
        let requirements: Vec<SubsystemId> = match self.engine.node(command) {
            Ok(node) => node.requirements.iter().copied().collect(),
            Err(_) => return,
        };

        for subsystem in &requirements {
            let occupant = self.subsystems.get(subsystem.index()).and_then(|s| s.current);
            if let Some(occupant) = occupant
                && !self.engine.is_interruptible(occupant)
            {
                debug!(
                    command = %name,
                    blocked_by = %self.engine.name(occupant),
                    "admission rejected by uninterruptible occupant"
                );
                return;
            }
        }

        self.engine.admitting = true;
        for subsystem in &requirements {
            let occupant = self.subsystems.get(subsystem.index()).and_then(|s| s.current);
            if let Some(occupant) = occupant {
                debug!(command = %name, evicted = %self.engine.name(occupant), "evicting occupant");
                self.engine.force_cancel(occupant);
                self.remove(occupant);
            }
            if let Some(slot) = self.subsystems.get_mut(subsystem.index()) {
                slot.set_current(Some(command));
            }
        }
        self.engine.admitting = false;

        let node = &mut self.engine.nodes[command.index()];
        node.locked = true;
        node.completed = false;
        self.admitted.push(command);
        self.running_changed = true;
        self.engine.start_running(command);
        debug!(command = %name, "admitted");
    }

    /// Clear every subsystem `command` requires.  The clear is unconditional,
    /// so releasing a subsystem the command never held is harmless.
    fn release(&mut self, command: CommandId) {
        let requirements: Vec<SubsystemId> = self.engine.nodes[command.index()]
            .requirements
            .iter()
            .copied()
            .collect();
        for subsystem in requirements {
            if let Some(slot) = self.subsystems.get_mut(subsystem.index()) {
                slot.set_current(None);
            }
        }
    }

    fn confirm_command(&mut self, index: usize) {
        let slot = &mut self.subsystems[index];
        if !slot.dirty {
            return;
        }
        slot.dirty = false;
        let current = slot.current.map(|id| self.engine.name(id)).unwrap_or("");
        let default = slot.default.map(|id| self.engine.name(id)).unwrap_or("");
        let sink = &mut self.telemetry;
        sink.put_string(&format!("{}/.command", slot.name), current);
        sink.put_bool(&format!("{}/.hasCommand", slot.name), slot.current.is_some());
        sink.put_bool(&format!("{}/.hasDefault", slot.name), slot.default.is_some());
        sink.put_string(&format!("{}/.default", slot.name), default);
    }

    fn publish_running(&mut self) {
        let names: Vec<String> = self
            .admitted
            .iter()
            .map(|id| self.engine.name(*id).to_string())
            .collect();
        let ids: Vec<f64> = self.admitted.iter().map(|id| id.index() as f64).collect();
        self.telemetry.put_string_array("Scheduler/Names", &names);
        self.telemetry.put_number_array("Scheduler/Ids", &ids);
    }
}

//! Edge-triggered command bindings.
//!
//! A trigger is a boolean predicate registered with the scheduler.  Each
//! binding pairs a trigger with a command and a [`BindingMode`], and keeps
//! the level it saw last so it can react to rising and falling edges.
//! Every trigger is sampled at most once per tick, no matter how many
//! bindings use it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use robocmd_types::{BindingMode, CommandId, SchedulerError, TriggerId};
use tracing::{trace, warn};

use crate::command::Engine;

type Predicate = Box<dyn FnMut() -> bool + Send>;

struct Binding {
    trigger: TriggerId,
    command: CommandId,
    mode: BindingMode,
    pressed_last: bool,
}

#[derive(Default)]
pub(crate) struct TriggerRegistry {
    predicates: Vec<Predicate>,
    bindings: Vec<Binding>,
}

#[derive(Clone, Copy)]
enum Action {
    Start,
    Cancel,
    Toggle,
}

impl TriggerRegistry {
    pub(crate) fn register(&mut self, predicate: Predicate) -> TriggerId {
        let id = TriggerId::from_index(self.predicates.len());
        self.predicates.push(predicate);
        id
    }

    /// Bind `command` to `trigger`.  The trigger is sampled once here so a
    /// button already held at bind time does not count as a fresh press.
    pub(crate) fn bind(
        &mut self,
        engine: &Engine,
        trigger: TriggerId,
        command: CommandId,
        mode: BindingMode,
    ) -> Result<(), SchedulerError> {
        let node = engine.node(command)?;
        if node.parent.is_some() {
            return Err(SchedulerError::Parented(node.name.clone()));
        }
        let predicate = self
            .predicates
            .get_mut(trigger.index())
            .ok_or(SchedulerError::UnknownTrigger(trigger))?;
        let pressed_last = predicate();
        self.bindings.push(Binding {
            trigger,
            command,
            mode,
            pressed_last,
        });
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.predicates.clear();
        self.bindings.clear();
    }

    /// Sample every trigger and fire the bindings, newest binding first.
    pub(crate) fn poll(&mut self, engine: &mut Engine) {
        let mut samples: Vec<Option<bool>> = vec![None; self.predicates.len()];
        for binding in self.bindings.iter_mut().rev() {
            let slot = &mut samples[binding.trigger.index()];
            let active = match *slot {
                Some(level) => level,
                None => {
                    let level = (self.predicates[binding.trigger.index()])();
                    *slot = Some(level);
                    level
                }
            };
            if let Some(action) = binding.edge(active) {
                trace!(
                    trigger = %binding.trigger,
                    command = %engine.name(binding.command),
                    mode = ?binding.mode,
                    "binding fired"
                );
                fire(engine, binding.command, action);
            }
        }
    }
}

impl Binding {
    /// Update the remembered level and report what to do this tick.
    fn edge(&mut self, active: bool) -> Option<Action> {
        let rising = active && !self.pressed_last;
        let falling = !active && self.pressed_last;
        self.pressed_last = active;
        match self.mode {
            BindingMode::WhenActive => rising.then_some(Action::Start),
            BindingMode::WhileActive if active => Some(Action::Start),
            BindingMode::WhileActive => falling.then_some(Action::Cancel),
            BindingMode::WhenInactive => falling.then_some(Action::Start),
            BindingMode::ToggleWhenActive => rising.then_some(Action::Toggle),
            BindingMode::CancelWhenActive => rising.then_some(Action::Cancel),
        }
    }
}

fn fire(engine: &mut Engine, command: CommandId, action: Action) {
    let action = match action {
        Action::Toggle if engine.is_running(command) => Action::Cancel,
        Action::Toggle => Action::Start,
        other => other,
    };
    let result = match action {
        Action::Cancel => engine.cancel(command),
        _ => engine.start(command),
    };
    match result {
        Ok(()) | Err(SchedulerError::AlreadyQueued(_)) => {}
        Err(err) => warn!(command = %engine.name(command), error = %err, "binding failed"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Button
// ─────────────────────────────────────────────────────────────────────────────

/// A manually driven trigger source, optionally inverted.
///
/// Clones share state, so the code that presses the button and the
/// predicate registered with the scheduler see the same level.
///
/// ```
/// use robocmd_core::Button;
///
/// let button = Button::new();
/// let mut predicate = button.predicate();
/// assert!(!predicate());
/// button.set_pressed(true);
/// assert!(predicate());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Button {
    pressed: Arc<AtomicBool>,
    inverted: Arc<AtomicBool>,
}

impl Button {
    pub fn new() -> Self {
        Self::default()
    }

    /// A button reporting the opposite of its pressed level.  It starts
    /// inactive either way.
    pub fn inverted(inverted: bool) -> Self {
        Self {
            pressed: Arc::new(AtomicBool::new(inverted)),
            inverted: Arc::new(AtomicBool::new(inverted)),
        }
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::SeqCst);
    }

    pub fn set_inverted(&self, inverted: bool) {
        self.inverted.store(inverted, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.pressed.load(Ordering::SeqCst) ^ self.inverted.load(Ordering::SeqCst)
    }

    /// A predicate suitable for
    /// [`Scheduler::register_trigger`][crate::scheduler::Scheduler::register_trigger].
    pub fn predicate(&self) -> impl FnMut() -> bool + Send + 'static {
        let button = self.clone();
        move || button.get()
    }
}

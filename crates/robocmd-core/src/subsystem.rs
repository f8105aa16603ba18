//! Subsystems: exclusive hardware resources arbitrated by the scheduler.
//!
//! A subsystem is occupied by at most one admitted command at a time.  When
//! it is idle the scheduler admits its default command, if it has one.

use robocmd_types::{CommandId, SubsystemId};

use crate::command::Command;

/// Hardware-facing side of a subsystem.
pub trait Subsystem: Send {
    /// Called once per enabled tick, before commands run.
    fn periodic(&mut self) {}

    /// Supplies the default command the first time the scheduler asks for
    /// one.  `id` is this subsystem's handle, for use in
    /// [`Command::requiring`].
    fn init_default_command(&mut self, _id: SubsystemId) -> Option<Command> {
        None
    }
}

/// A subsystem with no hardware behavior of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passive;

impl Subsystem for Passive {}

pub(crate) struct SubsystemSlot {
    pub(crate) name: String,
    pub(crate) hardware: Box<dyn Subsystem>,
    pub(crate) current: Option<CommandId>,
    pub(crate) default: Option<CommandId>,
    pub(crate) default_initialized: bool,
    /// Set whenever the occupant changes; cleared when published.
    pub(crate) dirty: bool,
}

impl SubsystemSlot {
    pub(crate) fn new(name: String, hardware: Box<dyn Subsystem>) -> Self {
        Self {
            name,
            hardware,
            current: None,
            default: None,
            default_initialized: false,
            dirty: true,
        }
    }

    pub(crate) fn set_current(&mut self, command: Option<CommandId>) {
        self.current = command;
        self.dirty = true;
    }
}

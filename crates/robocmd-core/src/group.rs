//! [`Group`] – composite command execution.
//!
//! A command group owns an ordered list of entries.  Each tick the group
//! advances a cursor through them:
//!
//! - [`EntryMode::InSequence`] entries block the cursor until they finish.
//! - [`EntryMode::BranchChild`] entries are started and kept running in the
//!   background while the cursor moves on.
//! - [`EntryMode::BranchPeer`] entries are handed to the scheduler as
//!   independent top-level commands while the cursor moves on.
//!
//! A group is finished once the cursor has passed the last entry and no
//! background children remain.  Starting a sequential entry or a child
//! cancels any running child that shares one of its requirements, even an
//! uninterruptible one.

use robocmd_types::{CommandId, EntryMode, SchedulerError};
use tracing::debug;

use crate::command::{CommandKind, Engine};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Entry {
    pub(crate) command: CommandId,
    pub(crate) mode: EntryMode,
    pub(crate) timeout: Option<f64>,
}

#[derive(Debug, Default)]
pub(crate) struct Group {
    pub(crate) entries: Vec<Entry>,
    /// Background children currently running.
    pub(crate) children: Vec<Entry>,
    /// `None` until the group's first execution after (re)initialization.
    pub(crate) cursor: Option<usize>,
}

impl Engine {
    fn group(&self, id: CommandId) -> &Group {
        match &self.nodes[id.index()].kind {
            CommandKind::Group(group) => group,
            CommandKind::Leaf(_) => unreachable!("{id} is not a command group"),
        }
    }

    fn group_mut(&mut self, id: CommandId) -> &mut Group {
        match &mut self.nodes[id.index()].kind {
            CommandKind::Group(group) => group,
            CommandKind::Leaf(_) => unreachable!("{id} is not a command group"),
        }
    }

    // ── construction ────────────────────────────────────────────────────────

    /// Append `command` to `group`.
    ///
    /// Sequential entries and children become parented by the group, are
    /// locked, and contribute their requirements to the group.  Peers are
    /// only locked.
    pub(crate) fn add_entry(
        &mut self,
        group: CommandId,
        command: CommandId,
        mode: EntryMode,
        timeout: Option<f64>,
    ) -> Result<(), SchedulerError> {
        let target = self.node(group)?;
        let child = self.node(command)?;
        if !target.is_group() {
            return Err(SchedulerError::NotAGroup(target.name.clone()));
        }
        if target.locked {
            return Err(SchedulerError::GroupLocked(target.name.clone()));
        }
        if let Some(secs) = timeout
            && secs < 0.0
        {
            return Err(SchedulerError::NegativeTimeout(secs));
        }
        if group == command {
            return Err(SchedulerError::SelfReference(target.name.clone()));
        }
        if child.parent.is_some() {
            return Err(SchedulerError::AlreadyParented(child.name.clone()));
        }

        let child = &mut self.nodes[command.index()];
        child.locked = true;
        let inherited = if mode == EntryMode::BranchPeer {
            Default::default()
        } else {
            child.parent = Some(group);
            child.requirements.clone()
        };

        let target = &mut self.nodes[group.index()];
        target.requirements.extend(inherited);
        if let CommandKind::Group(g) = &mut target.kind {
            g.entries.push(Entry {
                command,
                mode,
                timeout,
            });
        }
        Ok(())
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    pub(crate) fn group_initialize(&mut self, id: CommandId) {
        self.group_mut(id).cursor = None;
    }

    pub(crate) fn group_execute(&mut self, id: CommandId) {
        let mut first_run = false;
        let mut cursor = match self.group(id).cursor {
            Some(cursor) => cursor,
            None => {
                first_run = true;
                0
            }
        };
        self.group_mut(id).cursor = Some(cursor);

        let mut current: Option<Entry> = None;
        while cursor < self.group(id).entries.len() {
            if let Some(entry) = current {
                if self.entry_timed_out(&entry) {
                    self.force_cancel(entry.command);
                }
                if self.run(entry.command) {
                    break;
                }
                self.removed(entry.command);
                cursor += 1;
                self.group_mut(id).cursor = Some(cursor);
                first_run = true;
                current = None;
                continue;
            }

            let entry = self.group(id).entries[cursor];
            match entry.mode {
                EntryMode::InSequence => {
                    if first_run {
                        self.start_running(entry.command);
                        self.cancel_conflicts(id, entry.command);
                    }
                    first_run = false;
                    current = Some(entry);
                }
                EntryMode::BranchPeer => {
                    cursor += 1;
                    self.group_mut(id).cursor = Some(cursor);
                    if let Err(err) = self.start(entry.command) {
                        debug!(
                            group = %self.name(id),
                            command = %self.name(entry.command),
                            error = %err,
                            "peer not started"
                        );
                    }
                }
                EntryMode::BranchChild => {
                    cursor += 1;
                    self.group_mut(id).cursor = Some(cursor);
                    self.cancel_conflicts(id, entry.command);
                    self.start_running(entry.command);
                    self.group_mut(id).children.push(entry);
                }
            }
        }

        self.run_children(id);
    }

    fn run_children(&mut self, id: CommandId) {
        let children = self.group(id).children.clone();
        let mut finished = Vec::new();
        for entry in children {
            if self.entry_timed_out(&entry) {
                self.force_cancel(entry.command);
            }
            if !self.run(entry.command) {
                self.removed(entry.command);
                finished.push(entry.command);
            }
        }
        if !finished.is_empty() {
            self.group_mut(id)
                .children
                .retain(|e| !finished.contains(&e.command));
        }
    }

    /// Cancel and remove every child sharing a requirement with `command`.
    fn cancel_conflicts(&mut self, id: CommandId, command: CommandId) {
        let wanted = self.nodes[command.index()].requirements.clone();
        if wanted.is_empty() {
            return;
        }
        let children = self.group(id).children.clone();
        let mut evicted = Vec::new();
        for entry in children {
            if self.nodes[entry.command.index()].shares_requirement(&wanted) {
                debug!(
                    group = %self.name(id),
                    child = %self.name(entry.command),
                    by = %self.name(command),
                    "child canceled by conflicting entry"
                );
                self.force_cancel(entry.command);
                self.removed(entry.command);
                evicted.push(entry.command);
            }
        }
        if !evicted.is_empty() {
            self.group_mut(id)
                .children
                .retain(|e| !evicted.contains(&e.command));
        }
    }

    /// Cancel and remove the entry under the cursor and every child.
    pub(crate) fn group_end(&mut self, id: CommandId) {
        let group = self.group(id);
        let current = group
            .cursor
            .and_then(|cursor| group.entries.get(cursor))
            .map(|entry| entry.command);
        if let Some(command) = current {
            self.force_cancel(command);
            self.removed(command);
        }
        let children = std::mem::take(&mut self.group_mut(id).children);
        for entry in children {
            self.force_cancel(entry.command);
            self.removed(entry.command);
        }
    }

    // ── queries ─────────────────────────────────────────────────────────────

    pub(crate) fn group_finished(&self, id: CommandId) -> bool {
        let group = self.group(id);
        match group.cursor {
            Some(cursor) => cursor >= group.entries.len() && group.children.is_empty(),
            None => false,
        }
    }

    pub(crate) fn group_interruptible(&self, id: CommandId) -> bool {
        let group = self.group(id);
        let current = group.cursor.and_then(|cursor| group.entries.get(cursor));
        current
            .into_iter()
            .chain(group.children.iter())
            .all(|entry| self.is_interruptible(entry.command))
    }

    pub(crate) fn group_has_branches(&self, id: CommandId) -> bool {
        match &self.nodes[id.index()].kind {
            CommandKind::Group(group) => !group.children.is_empty(),
            CommandKind::Leaf(_) => false,
        }
    }

    pub(crate) fn group_entries(&self, id: CommandId) -> Vec<(CommandId, EntryMode)> {
        match &self.nodes[id.index()].kind {
            CommandKind::Group(group) => group.entries.iter().map(|e| (e.command, e.mode)).collect(),
            CommandKind::Leaf(_) => Vec::new(),
        }
    }

    /// An entry times out against its own timeout, counted from the
    /// entry's first run.
    fn entry_timed_out(&self, entry: &Entry) -> bool {
        let Some(timeout) = entry.timeout else {
            return false;
        };
        let elapsed = self.time_since_initialized(entry.command);
        elapsed > 0.0 && elapsed >= timeout
    }
}

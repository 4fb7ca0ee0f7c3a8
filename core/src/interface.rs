//! Interfaces: named collections of command groups.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::command::Command;
use crate::error::Result;
use crate::merge::CommandGroup;
use crate::revision::Revision;
use crate::types::TypeRegistry;

/// One interface with the revisions it was observed on and its command
/// groups keyed by command number.
#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    name: String,
    revisions: Vec<Revision>,
    commands: BTreeMap<u32, CommandGroup>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revisions: Vec::new(),
            commands: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Revisions the interface was observed on, ascending and without
    /// duplicates.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    /// Command groups in ascending command-number order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandGroup> {
        self.commands.values()
    }

    pub fn command(&self, id: u32) -> Option<&CommandGroup> {
        self.commands.get(&id)
    }

    /// Records that the interface exists on `revision`.
    pub fn exists_on(&mut self, revision: &Revision) {
        if let Err(pos) = self.revisions.binary_search(revision) {
            self.revisions.insert(pos, revision.clone());
        }
    }

    /// Appends an observation to the group for `command.id`.
    ///
    /// # Errors
    ///
    /// Propagates ordering and conflict errors from [`CommandGroup::append`].
    pub fn append_command(
        &mut self,
        revision: &Revision,
        command: Command,
        types: &TypeRegistry,
    ) -> Result<()> {
        let id = command.id;
        self.commands
            .entry(id)
            .or_insert_with(|| CommandGroup::new(self.name.as_str(), id))
            .append(revision, command, types)
    }
}

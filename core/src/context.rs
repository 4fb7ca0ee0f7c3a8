//! Run-scoped state shared by every stage of a merge.

use std::collections::BTreeMap;

use crate::command::Command;
use crate::error::Result;
use crate::interface::Interface;
use crate::revision::Revision;
use crate::types::TypeRegistry;

/// Owns the type registry, the interface map and the revision scope of one
/// merge run.
///
/// A context is built fresh for every run and passed explicitly to every
/// stage; nothing is shared between runs.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Command, Context, Provenance, Revision};
///
/// let mut ctx = Context::new();
/// let revision: Revision = "1.0.0".parse().unwrap();
/// ctx.observe_revision(&revision);
/// ctx.get_or_create_interface("nn::IFoo").exists_on(&revision);
///
/// let command = Command::new(0, Provenance::new(revision.clone(), "server-test"));
/// ctx.append_command("nn::IFoo", &revision, command).unwrap();
/// assert_eq!(ctx.interface("nn::IFoo").unwrap().commands().count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    types: TypeRegistry,
    interfaces: BTreeMap<String, Interface>,
    revisions: Vec<Revision>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Interfaces in ascending name order.
    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    pub fn get_or_create_interface(&mut self, name: &str) -> &mut Interface {
        self.interfaces
            .entry(name.to_string())
            .or_insert_with(|| Interface::new(name))
    }

    /// Every revision ingested so far, ascending.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    /// Adds `revision` to the run's scope.
    pub fn observe_revision(&mut self, revision: &Revision) {
        if let Err(pos) = self.revisions.binary_search(revision) {
            self.revisions.insert(pos, revision.clone());
        }
    }

    /// Appends a command observation to `interface`, creating the interface
    /// if needed.
    ///
    /// # Errors
    ///
    /// Propagates ordering and conflict errors from the command group.
    pub fn append_command(
        &mut self,
        interface: &str,
        revision: &Revision,
        command: Command,
    ) -> Result<()> {
        let types = &self.types;
        self.interfaces
            .entry(interface.to_string())
            .or_insert_with(|| Interface::new(interface))
            .append_command(revision, command, types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::revision::Provenance;

    fn rev(text: &str) -> Revision {
        text.parse().unwrap()
    }

    fn command(revision: &Revision, inbytes: u64) -> Command {
        let mut command = Command::new(1, Provenance::new(revision.clone(), "server-test"));
        command.layout.inbytes = Some(inbytes);
        command
    }

    #[test]
    fn test_revision_scope_sorted() {
        let mut ctx = Context::new();
        ctx.observe_revision(&rev("3.0.0"));
        ctx.observe_revision(&rev("1.0.0"));
        ctx.observe_revision(&rev("3.0.0"));
        assert_eq!(ctx.revisions(), &[rev("1.0.0"), rev("3.0.0")]);
    }

    #[test]
    fn test_interfaces_are_independent() {
        let mut ctx = Context::new();
        let (r1, r2) = (rev("1.0.0"), rev("2.0.0"));
        ctx.append_command("nn::IB", &r2, command(&r2, 4)).unwrap();
        // A different interface may still receive an earlier revision.
        ctx.append_command("nn::IA", &r1, command(&r1, 4)).unwrap();
        let names: Vec<&str> = ctx.interfaces().map(Interface::name).collect();
        assert_eq!(names, vec!["nn::IA", "nn::IB"]);

        let err = ctx.append_command("nn::IB", &r1, command(&r1, 4)).unwrap_err();
        assert!(matches!(err, SchemaError::OutOfOrderRevision { .. }));
    }
}

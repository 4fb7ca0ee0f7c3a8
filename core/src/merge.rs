//! Cross-revision merging of command observations.
//!
//! Compatibility follows one rule everywhere: a value present on both sides
//! must agree, a value present on one side is adopted, and lists must have the
//! same length with pairwise-compatible elements. Two fragments that are both
//! silent on a field leave it unobserved.
//!
//! [`CommandGroup`] folds the observations of one command number into entries
//! covering runs of consecutive revisions.

use std::fmt::Debug;

use serde::Serialize;
use tracing::{debug, error};

use crate::command::{Arg, Buffer, Command, CommandLayout};
use crate::error::{Result, SchemaError};
use crate::revision::Revision;
use crate::types::TypeRegistry;

/// Field-wise merging of partially known records.
pub trait Mergeable {
    /// Returns `true` if no field present on both sides disagrees.
    fn can_merge(&self, other: &Self) -> bool;

    /// Fills unobserved fields of `self` from `other`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MergeFieldConflict`] if a field present on both
    /// sides disagrees.
    fn merge(&mut self, other: &Self) -> Result<()>;
}

fn compatible<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn merge_value<T: PartialEq + Clone + Debug>(
    field: &'static str,
    target: &mut Option<T>,
    incoming: &Option<T>,
) -> Result<()> {
    let Some(value) = incoming else {
        return Ok(());
    };
    match target {
        Some(existing) if existing != value => Err(SchemaError::MergeFieldConflict {
            field,
            existing: format!("{existing:?}"),
            incoming: format!("{value:?}"),
        }),
        Some(_) => Ok(()),
        None => {
            *target = Some(value.clone());
            Ok(())
        }
    }
}

fn lists_compatible<T>(a: &[T], b: &[T], element: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| element(a, b))
}

fn merge_list<T: Clone>(
    field: &'static str,
    target: &mut Option<Vec<T>>,
    incoming: &Option<Vec<T>>,
    mut element: impl FnMut(&mut T, &T) -> Result<()>,
) -> Result<()> {
    let Some(incoming) = incoming else {
        return Ok(());
    };
    match target {
        None => {
            *target = Some(incoming.clone());
            Ok(())
        }
        Some(existing) => {
            if existing.len() != incoming.len() {
                return Err(SchemaError::MergeFieldConflict {
                    field,
                    existing: format!("{} entries", existing.len()),
                    incoming: format!("{} entries", incoming.len()),
                });
            }
            for (a, b) in existing.iter_mut().zip(incoming) {
                element(a, b)?;
            }
            Ok(())
        }
    }
}

fn slots_compatible<T>(a: &Option<T>, b: &Option<T>, element: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => element(a, b),
        _ => true,
    }
}

impl Mergeable for Arg {
    fn can_merge(&self, other: &Self) -> bool {
        self.size == other.size
            && self.alignment == other.alignment
            && self.position == other.position
            && compatible(&self.data_type, &other.data_type)
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.size != other.size || self.alignment != other.alignment {
            return Err(SchemaError::MergeFieldConflict {
                field: "arg",
                existing: format!("{}/{}", self.size, self.alignment),
                incoming: format!("{}/{}", other.size, other.alignment),
            });
        }
        if self.position != other.position {
            return Err(SchemaError::MergeFieldConflict {
                field: "arg position",
                existing: self.position.to_string(),
                incoming: other.position.to_string(),
            });
        }
        merge_value("arg type", &mut self.data_type, &other.data_type)
    }
}

impl Mergeable for Buffer {
    fn can_merge(&self, other: &Self) -> bool {
        self.transfer_type == other.transfer_type
            && compatible(&self.data_type, &other.data_type)
            && compatible(&self.size, &other.size)
            && compatible(&self.is_array, &other.is_array)
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.transfer_type != other.transfer_type {
            return Err(SchemaError::MergeFieldConflict {
                field: "buffer transfer type",
                existing: format!("0x{:x}", self.transfer_type),
                incoming: format!("0x{:x}", other.transfer_type),
            });
        }
        merge_value("buffer type", &mut self.data_type, &other.data_type)?;
        merge_value("buffer size", &mut self.size, &other.size)?;
        merge_value("buffer array flag", &mut self.is_array, &other.is_array)
    }
}

impl<T: Mergeable + Clone> Mergeable for Option<T> {
    fn can_merge(&self, other: &Self) -> bool {
        slots_compatible(self, other, T::can_merge)
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        let Some(incoming) = other else {
            return Ok(());
        };
        match self {
            Some(existing) => existing.merge(incoming),
            None => {
                *self = Some(incoming.clone());
                Ok(())
            }
        }
    }
}

fn list_can_merge<T: Mergeable>(a: &Option<Vec<T>>, b: &Option<Vec<T>>) -> bool {
    slots_compatible(a, b, |a, b| lists_compatible(a, b, T::can_merge))
}

fn value_slots_can_merge<T: PartialEq>(a: &Option<Vec<Option<T>>>, b: &Option<Vec<Option<T>>>) -> bool {
    slots_compatible(a, b, |a, b| lists_compatible(a, b, compatible))
}

impl Mergeable for CommandLayout {
    fn can_merge(&self, other: &Self) -> bool {
        compatible(&self.name, &other.name)
            && list_can_merge(&self.buffers, &other.buffers)
            && list_can_merge(&self.in_args, &other.in_args)
            && list_can_merge(&self.out_args, &other.out_args)
            && compatible(&self.pid, &other.pid)
            && compatible(&self.inbytes, &other.inbytes)
            && compatible(&self.outbytes, &other.outbytes)
            && value_slots_can_merge(&self.in_interfaces, &other.in_interfaces)
            && value_slots_can_merge(&self.out_interfaces, &other.out_interfaces)
            && value_slots_can_merge(&self.in_handles, &other.in_handles)
            && value_slots_can_merge(&self.out_handles, &other.out_handles)
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        merge_value("name", &mut self.name, &other.name)?;
        merge_list("buffers", &mut self.buffers, &other.buffers, |a, b| a.merge(b))?;
        merge_list("inargs", &mut self.in_args, &other.in_args, |a, b| a.merge(b))?;
        merge_list("outargs", &mut self.out_args, &other.out_args, |a, b| a.merge(b))?;
        merge_value("pid", &mut self.pid, &other.pid)?;
        merge_value("inbytes", &mut self.inbytes, &other.inbytes)?;
        merge_value("outbytes", &mut self.outbytes, &other.outbytes)?;
        merge_list("ininterfaces", &mut self.in_interfaces, &other.in_interfaces, |a, b| {
            merge_value("ininterfaces", a, b)
        })?;
        merge_list("outinterfaces", &mut self.out_interfaces, &other.out_interfaces, |a, b| {
            merge_value("outinterfaces", a, b)
        })?;
        merge_list("inhandles", &mut self.in_handles, &other.in_handles, |a, b| {
            merge_value("inhandles", a, b)
        })?;
        merge_list("outhandles", &mut self.out_handles, &other.out_handles, |a, b| {
            merge_value("outhandles", a, b)
        })
    }
}

impl Mergeable for Command {
    fn can_merge(&self, other: &Self) -> bool {
        self.id == other.id && self.layout.can_merge(&other.layout)
    }

    /// Merges the layout and appends the other side's provenance.
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.id != other.id {
            return Err(SchemaError::MergeFieldConflict {
                field: "id",
                existing: self.id.to_string(),
                incoming: other.id.to_string(),
            });
        }
        self.layout.merge(&other.layout)?;
        self.sources.extend(other.sources.iter().cloned());
        Ok(())
    }
}

/// A merged command together with the revisions it covers.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEntry {
    pub command: Command,
    pub revisions: Vec<Revision>,
}

/// The version-ranged history of one command number.
///
/// # Ordering precondition
///
/// Callers must [`append`](CommandGroup::append) observations in
/// non-decreasing revision order. The group checks this at runtime and
/// rejects late arrivals with [`SchemaError::OutOfOrderRevision`].
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Command, CommandGroup, Provenance, Revision, TypeRegistry};
///
/// let types = TypeRegistry::new();
/// let r1: Revision = "1.0.0".parse().unwrap();
/// let r2: Revision = "2.0.0".parse().unwrap();
///
/// let observe = |rev: &Revision, inbytes: u64| {
///     let mut command = Command::new(0, Provenance::new(rev.clone(), "server-test"));
///     command.layout.inbytes = Some(inbytes);
///     command
/// };
///
/// let mut group = CommandGroup::new("IFoo", 0);
/// group.append(&r1, observe(&r1, 4), &types).unwrap();
/// group.append(&r2, observe(&r2, 4), &types).unwrap();
/// assert_eq!(group.entries().len(), 1);
/// assert_eq!(group.entries()[0].revisions, vec![r1, r2]);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandGroup {
    #[serde(skip)]
    interface: String,
    id: u32,
    entries: Vec<CommandEntry>,
    #[serde(skip)]
    last_seen: Option<Revision>,
}

impl CommandGroup {
    pub fn new(interface: impl Into<String>, id: u32) -> Self {
        Self {
            interface: interface.into(),
            id,
            entries: Vec::new(),
            last_seen: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Entries in ascending revision order.
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Folds one observation into the group.
    ///
    /// The observation is merged into the latest entry when compatible;
    /// otherwise it starts a new entry. `types` is only used to describe
    /// conflicting records.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::OutOfOrderRevision`] if `revision` precedes an
    ///   already appended revision.
    /// - [`SchemaError::IrreconcilableConflict`] if the observation is
    ///   incompatible with the latest entry and that entry already covers
    ///   `revision`.
    pub fn append(
        &mut self,
        revision: &Revision,
        command: Command,
        types: &TypeRegistry,
    ) -> Result<()> {
        if let Some(latest) = &self.last_seen {
            if revision < latest {
                return Err(SchemaError::OutOfOrderRevision {
                    interface: self.interface.clone(),
                    id: self.id,
                    latest: latest.clone(),
                    incoming: revision.clone(),
                });
            }
        }
        self.last_seen = Some(revision.clone());

        if let Some(latest) = self.entries.last_mut() {
            if latest.command.can_merge(&command) {
                latest.command.merge(&command)?;
                if !latest.revisions.contains(revision) {
                    latest.revisions.push(revision.clone());
                }
                return Ok(());
            }
            if latest.revisions.contains(revision) {
                let existing = latest.command.describe(types);
                let incoming = command.describe(types);
                error!(
                    interface = %self.interface,
                    id = self.id,
                    %revision,
                    %existing,
                    %incoming,
                    "Irreconcilable command definitions"
                );
                return Err(SchemaError::IrreconcilableConflict {
                    interface: self.interface.clone(),
                    id: self.id,
                    revision: revision.clone(),
                    existing,
                    incoming,
                });
            }
        }

        debug!(
            interface = %self.interface,
            id = self.id,
            %revision,
            "Starting new command entry"
        );
        self.entries.push(CommandEntry {
            command,
            revisions: vec![revision.clone()],
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HandleKind;
    use crate::revision::Provenance;

    fn rev(text: &str) -> Revision {
        text.parse().unwrap()
    }

    fn command(revision: &str, origin: &str) -> Command {
        Command::new(7, Provenance::new(rev(revision), origin))
    }

    #[test]
    fn test_absent_fields_are_adopted() {
        let mut a = command("1.0.0", "server-a");
        a.layout.inbytes = Some(8);
        let mut b = command("1.0.0", "client-b");
        b.layout.name = Some("Open".into());
        b.layout.inbytes = Some(8);

        assert!(a.can_merge(&b));
        a.merge(&b).unwrap();
        assert_eq!(a.layout.name.as_deref(), Some("Open"));
        assert_eq!(a.layout.inbytes, Some(8));
        assert_eq!(a.sources.len(), 2);
    }

    #[test]
    fn test_merge_is_commutative_for_compatible_fragments() {
        let types = TypeRegistry::new();
        let u32_id = types.lookup("u32").unwrap();

        let mut a = command("2.0.0", "server-a");
        a.layout.inbytes = Some(4);
        a.layout.buffers = Some(vec![Some(Buffer::from_transfer_type(5))]);
        a.layout.in_interfaces = Some(vec![None]);

        let mut b = command("2.0.0", "client-b");
        b.layout.name = Some("Read".into());
        b.layout.in_args = Some(vec![Arg::new(4, 4, 0, Some(u32_id))]);
        b.layout.buffers = Some(vec![Some(Buffer {
            data_type: Some(u32_id),
            transfer_type: 5,
            size: Some(0),
            is_array: Some(false),
        })]);
        b.layout.in_interfaces = Some(vec![Some("IFoo".into())]);

        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();
        assert_eq!(ab.layout, ba.layout);
    }

    #[test]
    fn test_lists_of_different_length_are_incompatible() {
        let mut a = command("1.0.0", "a");
        a.layout.in_handles = Some(vec![Some(HandleKind::Copy)]);
        let mut b = command("1.0.0", "b");
        b.layout.in_handles = Some(vec![Some(HandleKind::Copy), Some(HandleKind::Move)]);
        assert!(!a.can_merge(&b));
        assert!(matches!(
            a.merge(&b),
            Err(SchemaError::MergeFieldConflict { field: "inhandles", .. })
        ));
    }

    #[test]
    fn test_observed_empty_differs_from_unobserved() {
        let mut a = command("1.0.0", "a");
        a.layout.in_args = Some(Vec::new());
        let mut b = command("1.0.0", "b");
        b.layout.in_args = Some(vec![Arg::new(4, 4, 0, None)]);
        assert!(!a.can_merge(&b));

        let c = command("1.0.0", "c");
        assert!(c.can_merge(&b));
    }

    #[test]
    fn test_merge_field_conflict_on_present_values() {
        let mut a = command("1.0.0", "a");
        a.layout.name = Some("Open".into());
        let mut b = command("1.0.0", "b");
        b.layout.name = Some("Close".into());
        assert!(!a.can_merge(&b));
        let err = a.merge(&b).unwrap_err();
        assert!(matches!(err, SchemaError::MergeFieldConflict { field: "name", .. }));
    }

    #[test]
    fn test_arg_types_conflict() {
        let mut types = TypeRegistry::new();
        let foo = types.get_or_create_inferred("Foo");
        let bar = types.get_or_create_inferred("Bar");
        let a = Arg::new(4, 4, 0, Some(foo));
        assert!(a.can_merge(&Arg::new(4, 4, 0, None)));
        assert!(!a.can_merge(&Arg::new(4, 4, 0, Some(bar))));
        assert!(!a.can_merge(&Arg::new(4, 4, 4, Some(foo))));
    }

    #[test]
    fn test_group_merges_compatible_revisions() {
        let types = TypeRegistry::new();
        let mut group = CommandGroup::new("IFoo", 7);
        for r in ["1.0.0", "2.0.0", "3.0.0"] {
            let mut c = command(r, "server");
            c.layout.inbytes = Some(4);
            group.append(&rev(r), c, &types).unwrap();
        }
        let mut changed = command("4.0.0", "server");
        changed.layout.inbytes = Some(8);
        group.append(&rev("4.0.0"), changed, &types).unwrap();

        let entries = group.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].revisions, vec![rev("1.0.0"), rev("2.0.0"), rev("3.0.0")]);
        assert_eq!(entries[1].revisions, vec![rev("4.0.0")]);
    }

    #[test]
    fn test_group_records_revision_once() {
        let types = TypeRegistry::new();
        let mut group = CommandGroup::new("IFoo", 7);
        group.append(&rev("1.0.0"), command("1.0.0", "server-a"), &types).unwrap();
        group.append(&rev("1.0.0"), command("1.0.0", "client-b"), &types).unwrap();
        assert_eq!(group.entries()[0].revisions, vec![rev("1.0.0")]);
        assert_eq!(group.entries()[0].command.sources.len(), 2);
    }

    #[test]
    fn test_group_rejects_out_of_order_revision() {
        let types = TypeRegistry::new();
        let mut group = CommandGroup::new("IFoo", 7);
        group.append(&rev("2.0.0"), command("2.0.0", "a"), &types).unwrap();
        let err = group
            .append(&rev("1.0.0"), command("1.0.0", "a"), &types)
            .unwrap_err();
        assert!(matches!(err, SchemaError::OutOfOrderRevision { .. }));
    }

    #[test]
    fn test_group_rejects_conflict_on_same_revision() {
        let types = TypeRegistry::new();
        let mut group = CommandGroup::new("IFoo", 7);
        let mut a = command("2.0.0", "server-a");
        a.layout.inbytes = Some(4);
        let mut b = command("2.0.0", "client-b");
        b.layout.inbytes = Some(8);
        group.append(&rev("2.0.0"), a, &types).unwrap();
        let err = group.append(&rev("2.0.0"), b, &types).unwrap_err();
        assert!(matches!(err, SchemaError::IrreconcilableConflict { .. }));
        assert_eq!(group.entries().len(), 1);
    }

    #[test]
    fn test_group_rejects_conflict_inside_merged_run() {
        let types = TypeRegistry::new();
        let mut group = CommandGroup::new("IFoo", 7);
        let mut a = command("1.0.0", "server");
        a.layout.inbytes = Some(4);
        let mut b = command("2.0.0", "server");
        b.layout.inbytes = Some(4);
        let mut c = command("2.0.0", "client");
        c.layout.inbytes = Some(8);
        group.append(&rev("1.0.0"), a, &types).unwrap();
        group.append(&rev("2.0.0"), b, &types).unwrap();
        assert!(matches!(
            group.append(&rev("2.0.0"), c, &types),
            Err(SchemaError::IrreconcilableConflict { .. })
        ));
    }
}

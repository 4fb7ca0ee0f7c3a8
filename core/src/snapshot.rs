//! Serializable snapshot of a merged schema: types with their size runs,
//! interfaces and every command entry with its rendered definition.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::emit::render_command;
use crate::error::Result;
use crate::revision::Revision;

/// Format version written into every [`SchemaSnapshot`].
pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

/// Serializable export of a merged schema, for tooling that would rather
/// read JSON or YAML than the interface-definition text.
///
/// Command entries carry their rendered definition line, the revisions they
/// cover and every fragment that contributed to them.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Command, Context, Provenance, Revision, SchemaSnapshot};
///
/// let mut ctx = Context::new();
/// let revision: Revision = "1.0.0".parse().unwrap();
/// ctx.observe_revision(&revision);
/// let mut command = Command::new(0, Provenance::new(revision.clone(), "server-sm"));
/// command.layout.inbytes = Some(0);
/// command.layout.outbytes = Some(0);
/// ctx.append_command("nn::sm::IUserInterface", &revision, command).unwrap();
///
/// let snapshot = SchemaSnapshot::from_context(&ctx, "2024-01-15T10:30:00Z").unwrap();
/// assert_eq!(snapshot.interface_count(), 1);
/// assert_eq!(snapshot.command_count(), 1);
/// assert_eq!(snapshot.interfaces[0].commands[0].entries[0].definition, "[0] Unknown0();");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Snapshot format version ([`SNAPSHOT_FORMAT_VERSION`]).
    pub schema_version: String,
    /// ISO-8601 creation timestamp.
    pub generated_at: String,
    /// Every revision of the run, ascending.
    pub revisions: Vec<Revision>,
    pub types: Vec<TypeSnapshot>,
    pub interfaces: Vec<InterfaceSnapshot>,
}

/// An inferred type with its sizes grouped into revision runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSnapshot {
    pub name: String,
    pub sizes: Vec<SizeRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRun {
    /// Size in bytes, or `None` when unknown on these revisions.
    pub size: Option<u64>,
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub revisions: Vec<Revision>,
    pub commands: Vec<CommandSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSnapshot {
    pub id: u32,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub revisions: Vec<Revision>,
    /// The entry rendered as an interface-definition line.
    pub definition: String,
    /// Contributing fragments as `origin@revision`.
    pub sources: Vec<String>,
}

impl SchemaSnapshot {
    /// Captures the current state of `ctx`.
    ///
    /// # Errors
    ///
    /// Fails if any command cannot be rendered (see
    /// [`emit_idl`](crate::emit_idl)).
    pub fn from_context(ctx: &Context, generated_at: impl Into<String>) -> Result<Self> {
        let types = ctx
            .types()
            .emitted_types()
            .into_iter()
            .map(|ty| TypeSnapshot {
                name: ty.name.clone(),
                sizes: ty
                    .size_runs()
                    .into_iter()
                    .map(|(size, revisions)| SizeRun { size, revisions })
                    .collect(),
            })
            .collect();

        let mut interfaces = Vec::new();
        for interface in ctx.interfaces() {
            let mut commands = Vec::new();
            for group in interface.commands() {
                let mut entries = Vec::new();
                for entry in group.entries() {
                    entries.push(EntrySnapshot {
                        revisions: entry.revisions.clone(),
                        definition: render_command(&entry.command, ctx.types())?,
                        sources: entry.command.sources.iter().map(ToString::to_string).collect(),
                    });
                }
                commands.push(CommandSnapshot {
                    id: group.id(),
                    entries,
                });
            }
            interfaces.push(InterfaceSnapshot {
                name: interface.name().to_string(),
                revisions: interface.revisions().to_vec(),
                commands,
            });
        }

        Ok(Self {
            schema_version: SNAPSHOT_FORMAT_VERSION.to_string(),
            generated_at: generated_at.into(),
            revisions: ctx.revisions().to_vec(),
            types,
            interfaces,
        })
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Number of distinct command numbers across all interfaces.
    pub fn command_count(&self) -> usize {
        self.interfaces.iter().map(|i| i.commands.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::revision::Provenance;

    fn rev(text: &str) -> Revision {
        text.parse().unwrap()
    }

    fn sample() -> Context {
        let mut ctx = Context::new();
        for (revision, size) in [("1.0.0", 4), ("2.0.0", 4), ("3.0.0", 8)] {
            let revision = rev(revision);
            ctx.observe_revision(&revision);
            let id = ctx.types_mut().get_or_create_inferred("nn::Handle");
            ctx.types_mut().assert_size_on(id, &revision, Some(size)).unwrap();
            let mut command = Command::new(2, Provenance::new(revision.clone(), "server-fs"));
            command.layout.outbytes = Some(size);
            ctx.append_command("nn::fs::IFile", &revision, command).unwrap();
        }
        ctx
    }

    #[test]
    fn test_snapshot_groups_type_sizes() {
        let snapshot = SchemaSnapshot::from_context(&sample(), "2024-01-15T10:30:00Z").unwrap();
        assert_eq!(snapshot.schema_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.types.len(), 1);
        let sizes = &snapshot.types[0].sizes;
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].size, Some(4));
        assert_eq!(sizes[0].revisions, vec![rev("1.0.0"), rev("2.0.0")]);
        assert_eq!(sizes[1].revisions, vec![rev("3.0.0")]);
    }

    #[test]
    fn test_snapshot_entries_and_sources() {
        let snapshot = SchemaSnapshot::from_context(&sample(), "now").unwrap();
        let entries = &snapshot.interfaces[0].commands[0].entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sources, vec!["server-fs@1.0.0", "server-fs@2.0.0"]);
        assert_eq!(entries[1].definition, "[2] Unknown2(unknown) -> unknown<0x8>;");
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = SchemaSnapshot::from_context(&sample(), "now").unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#""revisions":["1.0.0","2.0.0","3.0.0"]"#));
        let back: SchemaSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}

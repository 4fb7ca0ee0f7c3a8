//! Folding fragment documents into a [`Context`].
//!
//! Fragments must be ingested in non-decreasing revision order; within one
//! revision, server and client fragments may come in any order.

use tracing::{debug, error, info};

use crate::command::Command;
use crate::context::Context;
use crate::error::{Result, SchemaError};
use crate::fragment::{ClientDocument, CommandDescriptor, InterfaceMap, ServerDocument};
use crate::layout::{ArgPair, CommandLayoutBuilder, ObservedFields};
use crate::revision::{Provenance, Revision};
use crate::signature::parse_signature_list;
use crate::validate::validate_layout;

/// Interface that never carries IPC commands and is skipped by default.
pub const DEFAULT_SKIPPED_INTERFACE: &str = "nns::hosbinder::IHOSBinderDriver";

/// Counts of what one fragment contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub interfaces: usize,
    pub commands: usize,
}

/// Ingests a server fragment.
///
/// Server traces see every layout list, so each command starts with no
/// buffers, no pid and no handles or objects before its descriptor is
/// applied.
///
/// # Errors
///
/// Fails on the first malformed descriptor, layout mismatch or merge
/// conflict.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Context, ServerDocument, emit_idl, EmitOptions, ingest_server_document};
///
/// let doc: ServerDocument = serde_json::from_str(
///     r#"{"sm": {"nn::sm::detail::IUserInterface": {"0": {"inbytes": 8, "outbytes": 0, "pid": true}}}}"#,
/// ).unwrap();
/// let mut ctx = Context::new();
/// ingest_server_document(&mut ctx, &"1.0.0".parse().unwrap(), &doc, &[]).unwrap();
///
/// let text = emit_idl(&ctx, &EmitOptions::default()).unwrap();
/// assert!(text.contains("[0] Unknown0(unknown<0x8>, pid);"));
/// ```
pub fn ingest_server_document(
    ctx: &mut Context,
    revision: &Revision,
    doc: &ServerDocument,
    skip: &[String],
) -> Result<IngestStats> {
    ctx.observe_revision(revision);
    let mut stats = IngestStats::default();
    for (module, interfaces) in doc {
        let source = Provenance::new(revision.clone(), format!("server-{module}"));
        ingest_interfaces(ctx, &source, interfaces, skip, true, &mut stats)?;
    }
    info!(
        %revision,
        interfaces = stats.interfaces,
        commands = stats.commands,
        "Ingested server fragment"
    );
    Ok(stats)
}

/// Ingests a client fragment captured from the trace named `label`.
///
/// # Errors
///
/// Fails on the first malformed descriptor or signature, layout mismatch or
/// merge conflict.
pub fn ingest_client_document(
    ctx: &mut Context,
    revision: &Revision,
    label: &str,
    doc: &ClientDocument,
    skip: &[String],
) -> Result<IngestStats> {
    ctx.observe_revision(revision);
    let mut stats = IngestStats::default();
    let source = Provenance::new(revision.clone(), format!("client-{label}"));
    ingest_interfaces(ctx, &source, doc, skip, false, &mut stats)?;
    info!(
        %revision,
        label,
        interfaces = stats.interfaces,
        commands = stats.commands,
        "Ingested client fragment"
    );
    Ok(stats)
}

fn ingest_interfaces(
    ctx: &mut Context,
    source: &Provenance,
    interfaces: &InterfaceMap,
    skip: &[String],
    server: bool,
    stats: &mut IngestStats,
) -> Result<()> {
    let revision = &source.revision;
    for (name, commands) in interfaces {
        if skip.iter().any(|skipped| skipped == name) {
            debug!(interface = %name, "Skipping interface");
            continue;
        }
        ctx.get_or_create_interface(name).exists_on(revision);
        stats.interfaces += 1;

        for (key, desc) in commands {
            let command = build_command(ctx, source, key, desc, server).inspect_err(|err| {
                error!(interface = %name, command = %key, descriptor = ?desc, %err, "Rejected command");
            })?;
            debug!(interface = %name, id = command.id, origin = %source.origin, "Ingesting command");
            ctx.append_command(name, revision, command)?;
            stats.commands += 1;
        }
    }
    Ok(())
}

fn build_command(
    ctx: &mut Context,
    source: &Provenance,
    key: &str,
    desc: &CommandDescriptor,
    server: bool,
) -> Result<Command> {
    let id = key
        .trim()
        .parse::<u32>()
        .map_err(|_| SchemaError::InvalidCommandId(key.to_string()))?;
    let mut command = Command::new(id, source.clone());
    let layout = &mut command.layout;

    if server {
        layout.buffers = Some(Vec::new());
        layout.pid = Some(false);
        layout.in_handles = Some(Vec::new());
        layout.out_handles = Some(Vec::new());
        layout.in_interfaces = Some(Vec::new());
        layout.out_interfaces = Some(Vec::new());
    }
    desc.apply_fields(layout)?;

    let pairs = ArgPair::zip(
        parse_signature_list(desc.args.as_deref().unwrap_or_default())?,
        parse_signature_list(desc.arginfo.as_deref().unwrap_or_default())?,
    );
    let fields = ObservedFields {
        args: desc.args.is_some(),
        arg_info: desc.arginfo.is_some(),
    };
    CommandLayoutBuilder::new(ctx.types_mut(), &source.revision).apply(layout, &pairs, fields)?;

    validate_layout(layout)?;
    Ok(command)
}

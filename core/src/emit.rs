//! Text renderers for a merged [`Context`]: the version-annotated interface
//! definition and the diagnostic dump.

use crate::command::{Arg, Buffer, Command, HandleKind};
use crate::context::Context;
use crate::error::{Result, SchemaError};
use crate::interface::Interface;
use crate::revision::{version_decorator, Revision};
use crate::types::{InferredType, TypeRegistry};

/// Rendering options for [`emit_idl`].
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Scope against which `type` blocks are decorated. Defaults to every
    /// revision of the run.
    pub type_scope: Option<Vec<Revision>>,
}

/// Renders the merged schema.
///
/// Types come first in (first revision, last revision, name) order, one block
/// per run of revisions sharing a size. Interfaces follow in name order, each
/// command entry on its own tab-indented line.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidBuffer`] for an array buffer with a fixed
/// size and [`SchemaError::IncompleteSlots`] for a handle or buffer slot that
/// was never observed.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Command, Context, EmitOptions, Provenance, Revision, emit_idl};
///
/// let mut ctx = Context::new();
/// let revision: Revision = "1.0.0".parse().unwrap();
/// ctx.observe_revision(&revision);
/// ctx.get_or_create_interface("nn::IFoo").exists_on(&revision);
///
/// let mut command = Command::new(0, Provenance::new(revision.clone(), "server-test"));
/// command.layout.name = Some("Ping".into());
/// command.layout.inbytes = Some(0);
/// command.layout.outbytes = Some(0);
/// ctx.append_command("nn::IFoo", &revision, command).unwrap();
///
/// let text = emit_idl(&ctx, &EmitOptions::default()).unwrap();
/// assert_eq!(text, "interface nn::IFoo {\n\t[0] Ping();\n}\n");
/// ```
pub fn emit_idl(ctx: &Context, options: &EmitOptions) -> Result<String> {
    let type_scope = options.type_scope.as_deref().unwrap_or(ctx.revisions());
    let mut sections = Vec::new();

    let mut types = String::new();
    for ty in ctx.types().emitted_types() {
        render_type(&mut types, ty, type_scope);
    }
    if !types.is_empty() {
        sections.push(types);
    }

    for interface in ctx.interfaces() {
        sections.push(render_interface(interface, ctx.types(), ctx.revisions())?);
    }
    Ok(sections.join("\n"))
}

fn render_type(out: &mut String, ty: &InferredType, scope: &[Revision]) {
    for (size, revisions) in ty.size_runs() {
        if let Some(decorator) = version_decorator(&revisions, scope) {
            out.push_str(&format!("{decorator}\n"));
        }
        out.push_str(&format!("type {} = {};\n", ty.name, size_expr(size)));
    }
}

fn size_expr(size: Option<u64>) -> String {
    match size {
        Some(1) => "i8".to_string(),
        Some(2) => "i16".to_string(),
        Some(4) => "i32".to_string(),
        Some(8) => "i64".to_string(),
        Some(other) => format!("bytes<0x{other:x}>"),
        None => "unknown".to_string(),
    }
}

fn render_interface(
    interface: &Interface,
    types: &TypeRegistry,
    scope: &[Revision],
) -> Result<String> {
    let mut out = String::new();
    if let Some(decorator) = version_decorator(interface.revisions(), scope) {
        out.push_str(&format!("{decorator}\n"));
    }
    out.push_str(&format!("interface {} {{\n", interface.name()));
    for group in interface.commands() {
        for entry in group.entries() {
            if let Some(decorator) = version_decorator(&entry.revisions, interface.revisions()) {
                out.push_str(&format!("\t{decorator}\n"));
            }
            out.push_str(&format!("\t{}\n", render_command(&entry.command, types)?));
        }
    }
    out.push_str("}\n");
    Ok(out)
}

/// Renders one command line: `[id] Name(inputs) -> outputs;`.
pub fn render_command(command: &Command, types: &TypeRegistry) -> Result<String> {
    let layout = &command.layout;
    let mut input = Vec::new();
    let mut output = Vec::new();

    push_raw(&mut input, layout.in_args.as_deref(), layout.inbytes, types);
    push_raw(&mut output, layout.out_args.as_deref(), layout.outbytes, types);

    if layout.pid == Some(true) {
        input.push("pid".to_string());
    }
    push_handles(&mut input, command.id, "inhandles", layout.in_handles.as_deref())?;
    push_handles(&mut output, command.id, "outhandles", layout.out_handles.as_deref())?;

    for (index, slot) in layout.buffers.iter().flatten().enumerate() {
        let buffer = slot.as_ref().ok_or(SchemaError::IncompleteSlots {
            id: command.id,
            field: "buffers",
            index,
        })?;
        let rendered = render_buffer(buffer, types)?;
        if buffer.is_input() {
            input.push(rendered);
        } else {
            output.push(rendered);
        }
    }

    for name in layout.in_interfaces.iter().flatten() {
        input.push(format!("object<{}>", name.as_deref().unwrap_or("unknown")));
    }
    for name in layout.out_interfaces.iter().flatten() {
        output.push(format!("object<{}>", name.as_deref().unwrap_or("unknown")));
    }

    let mut line = format!(
        "[{}] {}({})",
        command.id,
        command.name_or_placeholder(),
        input.join(", ")
    );
    match output.as_slice() {
        [] => {}
        [single] => {
            line.push_str(&format!(" -> {single}"));
        }
        many => {
            line.push_str(&format!(" -> ({})", many.join(", ")));
        }
    }
    line.push(';');
    Ok(line)
}

fn push_raw(out: &mut Vec<String>, args: Option<&[Arg]>, total: Option<u64>, types: &TypeRegistry) {
    match (args, total) {
        (Some(args), _) => out.extend(args.iter().map(|arg| match arg.data_type {
            Some(id) => types.display_name(id).to_string(),
            None => format!("unknown<0x{:x}>", arg.size),
        })),
        (None, None) => out.push("unknown".to_string()),
        (None, Some(0)) => {}
        (None, Some(total)) => out.push(format!("unknown<0x{total:x}>")),
    }
}

fn push_handles(
    out: &mut Vec<String>,
    id: u32,
    field: &'static str,
    handles: Option<&[Option<HandleKind>]>,
) -> Result<()> {
    for (index, slot) in handles.unwrap_or_default().iter().enumerate() {
        let kind = slot.ok_or(SchemaError::IncompleteSlots { id, field, index })?;
        out.push(format!("KHandle<{kind}>"));
    }
    Ok(())
}

fn render_buffer(buffer: &Buffer, types: &TypeRegistry) -> Result<String> {
    let element = buffer
        .data_type
        .map_or("unknown", |id| types.display_name(id));
    if buffer.is_array == Some(true) {
        if let Some(size) = buffer.size.filter(|&size| size != 0) {
            return Err(SchemaError::InvalidBuffer(format!(
                "array<{element}, 0x{:x}> has fixed size 0x{size:x}",
                buffer.transfer_type
            )));
        }
        return Ok(format!("array<{element}, 0x{:x}>", buffer.transfer_type));
    }
    let size = match buffer.size {
        None => "unknown".to_string(),
        Some(0) => "variable".to_string(),
        Some(size) => format!("0x{size:x}"),
    };
    Ok(format!(
        "buffer<{element}, 0x{:x}, {size}>",
        buffer.transfer_type
    ))
}

/// Renders every interface, command number and entry with its revisions and
/// descriptive form. Meant for inspecting merge results by hand.
pub fn render_dump(ctx: &Context) -> String {
    let mut out = String::new();
    for interface in ctx.interfaces() {
        out.push_str(&format!("{}\n", interface.name()));
        for group in interface.commands() {
            out.push_str(&format!("  #{}:\n", group.id()));
            for entry in group.entries() {
                let revisions: Vec<&str> = entry.revisions.iter().map(Revision::as_str).collect();
                out.push_str(&format!("    @{{{}}}\n", revisions.join(", ")));
                out.push_str(&format!("      {}\n", entry.command.describe(ctx.types())));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::Provenance;

    fn rev(text: &str) -> Revision {
        text.parse().unwrap()
    }

    fn command(id: u32, revision: &Revision) -> Command {
        let mut command = Command::new(id, Provenance::new(revision.clone(), "server-test"));
        command.layout.observe_all_lists();
        command.layout.inbytes = Some(0);
        command.layout.outbytes = Some(0);
        command
    }

    #[test]
    fn test_render_command_argument_order() {
        let mut types = TypeRegistry::new();
        let revision = rev("1.0.0");
        let uid = types.get_or_create_inferred("nn::account::Uid");
        let u32_id = types.lookup("u32").unwrap();

        let mut cmd = command(7, &revision);
        cmd.layout.name = Some("Open".into());
        cmd.layout.inbytes = Some(0x18);
        cmd.layout.in_args = Some(vec![Arg::new(4, 4, 0, Some(u32_id)), Arg::new(0x10, 8, 8, Some(uid))]);
        cmd.layout.out_args = Some(vec![Arg::new(8, 8, 0, None)]);
        cmd.layout.pid = Some(true);
        cmd.layout.in_handles = Some(vec![Some(HandleKind::Copy)]);
        cmd.layout.out_handles = Some(vec![Some(HandleKind::Move)]);
        cmd.layout.buffers = Some(vec![
            Some(Buffer {
                data_type: None,
                transfer_type: 5,
                size: Some(0),
                is_array: Some(false),
            }),
            Some(Buffer::from_transfer_type(6)),
        ]);
        cmd.layout.in_interfaces = Some(vec![None]);
        cmd.layout.out_interfaces = Some(vec![Some("nn::IBar".into())]);

        assert_eq!(
            render_command(&cmd, &types).unwrap(),
            "[7] Open(u32, nn::account::Uid, pid, KHandle<copy>, buffer<unknown, 0x5, variable>, object<unknown>) \
             -> (unknown<0x8>, KHandle<move>, buffer<unknown, 0x6, unknown>, object<nn::IBar>);"
        );
    }

    #[test]
    fn test_render_unobserved_raw_data() {
        let types = TypeRegistry::new();
        let mut cmd = Command::new(2, Provenance::new(rev("1.0.0"), "server-test"));
        cmd.layout.inbytes = Some(0x10);
        assert_eq!(
            render_command(&cmd, &types).unwrap(),
            "[2] Unknown2(unknown<0x10>) -> unknown;"
        );
    }

    #[test]
    fn test_render_array_buffers() {
        let mut types = TypeRegistry::new();
        let entry = types.get_or_create_inferred("nn::Entry");
        let mut cmd = command(0, &rev("1.0.0"));
        cmd.layout.buffers = Some(vec![Some(Buffer {
            data_type: Some(entry),
            transfer_type: 6,
            size: Some(0),
            is_array: Some(true),
        })]);
        assert_eq!(
            render_command(&cmd, &types).unwrap(),
            "[0] Unknown0() -> array<nn::Entry, 0x6>;"
        );

        if let Some(Some(buffer)) = cmd.layout.buffers.as_mut().and_then(|b| b.first_mut()) {
            buffer.size = Some(0x20);
        }
        assert!(matches!(
            render_command(&cmd, &types),
            Err(SchemaError::InvalidBuffer(_))
        ));
    }

    #[test]
    fn test_render_handle_gap_fails() {
        let types = TypeRegistry::new();
        let mut cmd = command(3, &rev("1.0.0"));
        cmd.layout.in_handles = Some(vec![None, Some(HandleKind::Copy)]);
        assert!(matches!(
            render_command(&cmd, &types),
            Err(SchemaError::IncompleteSlots { field: "inhandles", index: 0, .. })
        ));
    }

    #[test]
    fn test_emit_types_and_decorators() {
        let scope: Vec<Revision> = ["1.0.0", "2.0.0", "3.0.0", "4.0.0"].iter().map(|r| rev(r)).collect();
        let mut ctx = Context::new();
        for revision in &scope {
            ctx.observe_revision(revision);
        }

        let foo = ctx.types_mut().get_or_create_inferred("Foo");
        ctx.types_mut().assert_size_on(foo, &scope[1], Some(4)).unwrap();
        ctx.types_mut().assert_size_on(foo, &scope[2], Some(8)).unwrap();
        ctx.types_mut().assert_size_on(foo, &scope[3], Some(8)).unwrap();

        for revision in &scope[1..] {
            ctx.get_or_create_interface("nn::IFoo").exists_on(revision);
            let mut cmd = command(0, revision);
            cmd.layout.name = Some("Get".into());
            cmd.layout.outbytes = Some(if revision < &scope[3] { 4 } else { 8 });
            ctx.append_command("nn::IFoo", revision, cmd).unwrap();
        }

        let text = emit_idl(&ctx, &EmitOptions::default()).unwrap();
        let expected = "\
@version(2.0.0)
type Foo = i32;
@version(3.0.0+)
type Foo = i64;

@version(2.0.0+)
interface nn::IFoo {
\t@version(2.0.0-3.0.0)
\t[0] Get() -> unknown<0x4>;
\t@version(4.0.0+)
\t[0] Get() -> unknown<0x8>;
}
";
        assert_eq!(text, expected);

        let narrowed = EmitOptions {
            type_scope: Some(scope[1..].to_vec()),
        };
        let text = emit_idl(&ctx, &narrowed).unwrap();
        assert!(text.starts_with("@version(2.0.0)\ntype Foo = i32;\n@version(3.0.0+)\n"));
    }

    #[test]
    fn test_size_expressions() {
        assert_eq!(size_expr(Some(1)), "i8");
        assert_eq!(size_expr(Some(0x18)), "bytes<0x18>");
        assert_eq!(size_expr(None), "unknown");
    }

    #[test]
    fn test_dump_lists_revisions() {
        let mut ctx = Context::new();
        let revision = rev("1.0.0");
        let mut cmd = command(4, &revision);
        cmd.layout.name = Some("Close".into());
        ctx.append_command("nn::IFoo", &revision, cmd).unwrap();
        let dump = render_dump(&ctx);
        assert!(dump.starts_with("nn::IFoo\n  #4:\n    @{1.0.0}\n      #4: Close, buffers: []"));
    }
}

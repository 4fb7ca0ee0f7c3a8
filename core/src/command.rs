//! Command records: one callable entry of an interface as observed at one or
//! more revisions.
//!
//! Every field is optional until some fragment observes it. `None` means
//! "not observed"; `Some(vec![])` and `Some(false)` mean "observed as empty".
//! Slot lists (`buffers`, interfaces, handles) hold `None` for slots that are
//! known to exist but whose content was not observed.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, SchemaError};
use crate::revision::Provenance;
use crate::types::{TypeId, TypeRegistry};

/// Kernel handle transfer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Copy,
    Move,
}

impl HandleKind {
    /// Decodes the fragment encoding (1 = copy, 2 = move).
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            1 => Ok(Self::Copy),
            2 => Ok(Self::Move),
            other => Err(SchemaError::InvalidHandleKind(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw positional field inside the input or output data block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arg {
    pub size: u64,
    pub alignment: u64,
    pub position: u64,
    pub data_type: Option<TypeId>,
}

impl Arg {
    pub fn new(size: u64, alignment: u64, position: u64, data_type: Option<TypeId>) -> Self {
        Self {
            size,
            alignment,
            position,
            data_type,
        }
    }
}

/// Transfer-descriptor field.
///
/// Bit 0 of `transfer_type` marks an input buffer. A `size` of `Some(0)`
/// means variable-length; `None` means unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Buffer {
    pub data_type: Option<TypeId>,
    pub transfer_type: u64,
    pub size: Option<u64>,
    pub is_array: Option<bool>,
}

impl Buffer {
    /// A buffer known only by its transfer type.
    pub fn from_transfer_type(transfer_type: u64) -> Self {
        Self {
            data_type: None,
            transfer_type,
            size: None,
            is_array: None,
        }
    }

    pub fn is_input(&self) -> bool {
        self.transfer_type & 1 != 0
    }
}

/// Everything known about a command's layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandLayout {
    pub name: Option<String>,
    pub buffers: Option<Vec<Option<Buffer>>>,
    pub pid: Option<bool>,
    pub inbytes: Option<u64>,
    pub outbytes: Option<u64>,
    pub in_args: Option<Vec<Arg>>,
    pub out_args: Option<Vec<Arg>>,
    pub in_interfaces: Option<Vec<Option<String>>>,
    pub out_interfaces: Option<Vec<Option<String>>>,
    pub in_handles: Option<Vec<Option<HandleKind>>>,
    pub out_handles: Option<Vec<Option<HandleKind>>>,
}

impl CommandLayout {
    /// Marks every list-valued field as observed (empty where still absent).
    pub fn observe_all_lists(&mut self) {
        self.buffers.get_or_insert_with(Vec::new);
        self.pid.get_or_insert(false);
        self.in_interfaces.get_or_insert_with(Vec::new);
        self.out_interfaces.get_or_insert_with(Vec::new);
        self.in_handles.get_or_insert_with(Vec::new);
        self.out_handles.get_or_insert_with(Vec::new);
        self.in_args.get_or_insert_with(Vec::new);
        self.out_args.get_or_insert_with(Vec::new);
    }
}

/// One command number observed at one or more revisions.
///
/// Equality of two commands is decided by their [`CommandLayout`]; the
/// provenance list is diagnostic only.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub id: u32,
    #[serde(flatten)]
    pub layout: CommandLayout,
    pub sources: Vec<Provenance>,
}

impl Command {
    pub fn new(id: u32, source: Provenance) -> Self {
        Self {
            id,
            layout: CommandLayout::default(),
            sources: vec![source],
        }
    }

    /// Name to render, with a placeholder for unnamed commands.
    pub fn name_or_placeholder(&self) -> String {
        self.layout
            .name
            .clone()
            .unwrap_or_else(|| format!("Unknown{}", self.id))
    }

    /// Single-line descriptive form used in diagnostics and dumps.
    ///
    /// Unobserved fields render as `?`.
    pub fn describe(&self, types: &TypeRegistry) -> String {
        let layout = &self.layout;
        let type_name = |id: &Option<TypeId>| {
            id.map_or_else(|| "unknown".to_string(), |id| types.display_name(id).to_string())
        };
        let buffers = describe_list(&layout.buffers, |slot| match slot {
            Some(b) => format!(
                "{}/0x{:x}/{}{}",
                type_name(&b.data_type),
                b.transfer_type,
                b.size.map_or_else(|| "?".to_string(), |s| format!("0x{s:x}")),
                if b.is_array == Some(true) { "[]" } else { "" }
            ),
            None => "-".to_string(),
        });
        let args = |list: &Option<Vec<Arg>>| {
            describe_list(list, |a| {
                format!("{}@{}+{}", type_name(&a.data_type), a.position, a.size)
            })
        };
        let names = |list: &Option<Vec<Option<String>>>| {
            describe_list(list, |slot| slot.clone().unwrap_or_else(|| "unknown".into()))
        };
        let handles = |list: &Option<Vec<Option<HandleKind>>>| {
            describe_list(list, |slot| slot.map_or("-", |k| k.as_str()).to_string())
        };
        format!(
            "#{}: {}, buffers: {}, pid: {}, inbytes: {}, outbytes: {}, inargs: {}, outargs: {}, ininterfaces: {}, outinterfaces: {}, inhandles: {}, outhandles: {}",
            self.id,
            layout.name.as_deref().unwrap_or("?"),
            buffers,
            describe_opt(&layout.pid),
            describe_opt(&layout.inbytes),
            describe_opt(&layout.outbytes),
            args(&layout.in_args),
            args(&layout.out_args),
            names(&layout.in_interfaces),
            names(&layout.out_interfaces),
            handles(&layout.in_handles),
            handles(&layout.out_handles),
        )
    }
}

fn describe_opt<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "?".to_string(), ToString::to_string)
}

fn describe_list<T>(list: &Option<Vec<T>>, render: impl Fn(&T) -> String) -> String {
    match list {
        Some(items) => format!(
            "[{}]",
            items.iter().map(render).collect::<Vec<_>>().join(", ")
        ),
        None => "?".to_string(),
    }
}

/// Sets `list[index]` if that slot is still unobserved, growing the list with
/// unobserved slots as needed. An absent `value` only reserves the slot.
pub(crate) fn fill_slot<T>(list: &mut Vec<Option<T>>, index: usize, value: Option<T>) {
    if list.len() <= index {
        list.resize_with(index + 1, || None);
    }
    if list[index].is_none() {
        list[index] = value;
    }
}

/// Overwrites `list[index]`, growing the list with unobserved slots as needed.
pub(crate) fn set_slot<T>(list: &mut Vec<Option<T>>, index: usize, value: T) {
    if list.len() <= index {
        list.resize_with(index + 1, || None);
    }
    list[index] = Some(value);
}

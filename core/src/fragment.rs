//! Serde model of server and client fragment documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::command::{Buffer, CommandLayout, HandleKind};
use crate::error::Result;

/// What one fragment says about one command number.
///
/// Every key is optional. `args` and `arginfo` are signature lists and only
/// appear in client fragments.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::CommandDescriptor;
///
/// let desc: CommandDescriptor =
///     serde_json::from_str(r#"{"name": "Open", "inbytes": 8, "inhandles": [1]}"#).unwrap();
/// assert_eq!(desc.name.as_deref(), Some("Open"));
/// assert!(serde_json::from_str::<CommandDescriptor>(r#"{"color": "red"}"#).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbytes: Option<u64>,
    /// Transfer-type codes, one per buffer slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffers: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ininterfaces: Option<Vec<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outinterfaces: Option<Vec<Option<String>>>,
    /// Handle kind codes (1 = copy, 2 = move).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inhandles: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outhandles: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arginfo: Option<String>,
}

impl CommandDescriptor {
    /// Copies every present non-signature key onto `layout`, replacing what
    /// was there.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidHandleKind`](crate::SchemaError::InvalidHandleKind)
    /// for a handle code other than 1 or 2.
    pub fn apply_fields(&self, layout: &mut CommandLayout) -> Result<()> {
        if let Some(name) = &self.name {
            layout.name = Some(name.clone());
        }
        if let Some(inbytes) = self.inbytes {
            layout.inbytes = Some(inbytes);
        }
        if let Some(outbytes) = self.outbytes {
            layout.outbytes = Some(outbytes);
        }
        if let Some(buffers) = &self.buffers {
            layout.buffers = Some(
                buffers
                    .iter()
                    .map(|&code| Some(Buffer::from_transfer_type(code)))
                    .collect(),
            );
        }
        if let Some(pid) = self.pid {
            layout.pid = Some(pid);
        }
        if let Some(names) = &self.ininterfaces {
            layout.in_interfaces = Some(names.clone());
        }
        if let Some(names) = &self.outinterfaces {
            layout.out_interfaces = Some(names.clone());
        }
        if let Some(codes) = &self.inhandles {
            layout.in_handles = Some(handle_kinds(codes)?);
        }
        if let Some(codes) = &self.outhandles {
            layout.out_handles = Some(handle_kinds(codes)?);
        }
        Ok(())
    }
}

fn handle_kinds(codes: &[u64]) -> Result<Vec<Option<HandleKind>>> {
    codes
        .iter()
        .map(|&code| HandleKind::from_code(code).map(Some))
        .collect()
}

/// Interface name to command number (as a string key) to descriptor.
pub type InterfaceMap = BTreeMap<String, BTreeMap<String, CommandDescriptor>>;

/// Client fragment: interfaces observed from the calling side.
pub type ClientDocument = InterfaceMap;

/// Server fragment: module name to the interfaces that module serves.
pub type ServerDocument = BTreeMap<String, InterfaceMap>;

//! Schema-merge engine for reverse-engineered IPC interface descriptions.
//!
//! Fragments captured at several revisions, from server-side and client-side
//! traces, are folded into one deduplicated, version-annotated schema:
//!
//! - [`parse_signature_list`] parses C++-template-like type and annotation
//!   signatures into [`SyntaxNode`] trees; [`Annotation::classify`] turns
//!   annotation trees into a closed set of layout annotations.
//! - [`TypeRegistry`] seeds the builtin primitives and learns the size of
//!   every other type per revision.
//! - [`CommandLayoutBuilder`] turns (signature, annotation) pairs into the
//!   raw arguments, buffers, handles and objects of a [`CommandLayout`], and
//!   [`validate_layout`] checks the packing arithmetic.
//! - [`CommandGroup`] merges compatible observations of one command number
//!   into minimal revision runs and rejects irreconcilable ones.
//! - [`emit_idl`], [`render_dump`] and [`SchemaSnapshot`] render the result.
//!
//! All state of a run lives in one [`Context`].
//!
//! # Example
//!
//! ```
//! use ipc_schema_core::*;
//!
//! let mut ctx = Context::new();
//! let skip = vec![DEFAULT_SKIPPED_INTERFACE.to_string()];
//!
//! for (revision, inbytes) in [("1.0.0", 4), ("2.0.0", 4), ("3.0.0", 8)] {
//!     let revision: Revision = revision.parse().unwrap();
//!     let doc: ClientDocument = serde_json::from_str(&format!(
//!         r#"{{"nn::IFoo": {{"0": {{
//!             "name": "SetValue",
//!             "inbytes": {inbytes},
//!             "outbytes": 0,
//!             "args": "nn::Value",
//!             "arginfo": "InRaw<{inbytes},{inbytes},0>"
//!         }}}}}}"#
//!     ))
//!     .unwrap();
//!     ingest_client_document(&mut ctx, &revision, "trace", &doc, &skip).unwrap();
//! }
//!
//! let text = emit_idl(&ctx, &EmitOptions::default()).unwrap();
//! assert_eq!(
//!     text,
//!     "@version(1.0.0-2.0.0)\ntype nn::Value = i32;\n@version(3.0.0+)\ntype nn::Value = i64;\n\n\
//!      interface nn::IFoo {\n\
//!      \t@version(1.0.0-2.0.0)\n\
//!      \t[0] SetValue(nn::Value);\n\
//!      \t@version(3.0.0+)\n\
//!      \t[0] SetValue(nn::Value);\n\
//!      }\n"
//! );
//! ```

mod annotation;
mod command;
mod context;
mod emit;
mod error;
mod fragment;
mod ingest;
mod interface;
mod layout;
mod merge;
mod revision;
mod signature;
mod snapshot;
mod types;
mod validate;

pub use annotation::{Annotation, MAX_SLOTS, RawPlacement, parse_int};
pub use command::{Arg, Buffer, Command, CommandLayout, HandleKind};
pub use context::Context;
pub use emit::{EmitOptions, emit_idl, render_command, render_dump};
pub use error::{ErrorKind, ParseError, Result, SchemaError};
pub use fragment::{ClientDocument, CommandDescriptor, InterfaceMap, ServerDocument};
pub use ingest::{
    DEFAULT_SKIPPED_INTERFACE, IngestStats, ingest_client_document, ingest_server_document,
};
pub use interface::Interface;
pub use layout::{ArgPair, CommandLayoutBuilder, ObservedFields};
pub use merge::{CommandEntry, CommandGroup, Mergeable};
pub use revision::{Provenance, Revision, version_decorator};
pub use signature::{Signature, SyntaxNode, parse_signature, parse_signature_list};
pub use snapshot::{
    CommandSnapshot, EntrySnapshot, InterfaceSnapshot, SNAPSHOT_FORMAT_VERSION, SchemaSnapshot,
    SizeRun, TypeSnapshot,
};
pub use types::{BuiltinType, InferredType, TypeDef, TypeId, TypeRegistry};
pub use validate::{validate_direction, validate_layout};

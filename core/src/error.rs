//! Error types for schema parsing, layout inference and merging.
//!
//! Every failure is fatal to a merge run. [`SchemaError::kind`] separates
//! malformed input ([`ErrorKind::Precondition`]) from fragments that are
//! well-formed but disagree with each other ([`ErrorKind::Conflict`]).

use thiserror::Error;

use crate::revision::Revision;

/// A malformed signature string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse signature '{input}' at offset {offset}: {message}")]
pub struct ParseError {
    /// The full input that was being parsed.
    pub input: String,
    /// Byte offset of the offending character (or input length at end of input).
    pub offset: usize,
    /// What the parser expected.
    pub message: String,
}

/// Broad classification of a [`SchemaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input itself is malformed (bad syntax, unknown tags, bad integers).
    Precondition,
    /// Inputs are individually well-formed but contradict each other.
    Conflict,
}

/// Errors raised by the schema engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Malformed type or annotation signature.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Annotation tag outside the recognized set.
    #[error("unknown annotation '{0}'")]
    UnknownAnnotation(String),

    /// Recognized annotation whose arguments or paired type are malformed.
    #[error("invalid {tag} annotation: {message}")]
    InvalidAnnotation { tag: &'static str, message: String },

    /// An annotation argument or descriptor value is not an integer.
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),

    /// Handle transfer code other than 1 (copy) or 2 (move).
    #[error("invalid handle kind code {0}")]
    InvalidHandleKind(u64),

    /// Revision string is not a dotted list of integers.
    #[error("invalid revision '{0}'")]
    InvalidRevision(String),

    /// Command number key is not an integer.
    #[error("invalid command id '{0}'")]
    InvalidCommandId(String),

    /// A type was asserted to two different sizes.
    #[error("type '{name}' on {revision} is {existing} bytes, not {asserted} bytes")]
    SizeConflict {
        name: String,
        revision: Revision,
        existing: u64,
        asserted: u64,
    },

    /// Raw argument offsets or byte totals disagree with the declared values.
    #[error("{direction} layout mismatch: {message}")]
    LayoutMismatch {
        direction: &'static str,
        message: String,
    },

    /// Revisions were appended to a command group out of order.
    #[error("revision {incoming} for {interface}#{id} arrived after {latest}")]
    OutOfOrderRevision {
        interface: String,
        id: u32,
        latest: Revision,
        incoming: Revision,
    },

    /// Two incompatible definitions were observed at the same revision.
    #[error(
        "cannot merge two definitions of {interface}#{id} on {revision}:\n  {existing}\n  {incoming}"
    )]
    IrreconcilableConflict {
        interface: String,
        id: u32,
        revision: Revision,
        existing: String,
        incoming: String,
    },

    /// A field present on both sides of a merge holds different values.
    #[error("cannot merge {field}: {existing} and {incoming}")]
    MergeFieldConflict {
        field: &'static str,
        existing: String,
        incoming: String,
    },

    /// Buffer that cannot be rendered (array buffer with a fixed element size).
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    /// A slot list still has an unobserved gap when rendering.
    #[error("{field} slot {index} of command #{id} was never observed")]
    IncompleteSlots {
        id: u32,
        field: &'static str,
        index: usize,
    },
}

impl SchemaError {
    /// Classifies the error as malformed input or a genuine data conflict.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipc_schema_core::{ErrorKind, SchemaError};
    ///
    /// let err = SchemaError::UnknownAnnotation("Foo".into());
    /// assert_eq!(err.kind(), ErrorKind::Precondition);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SizeConflict { .. }
            | Self::LayoutMismatch { .. }
            | Self::IrreconcilableConflict { .. }
            | Self::MergeFieldConflict { .. } => ErrorKind::Conflict,
            Self::Parse(_)
            | Self::UnknownAnnotation(_)
            | Self::InvalidAnnotation { .. }
            | Self::InvalidInteger(_)
            | Self::InvalidHandleKind(_)
            | Self::InvalidRevision(_)
            | Self::InvalidCommandId(_)
            | Self::OutOfOrderRevision { .. }
            | Self::InvalidBuffer(_)
            | Self::IncompleteSlots { .. } => ErrorKind::Precondition,
        }
    }
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;

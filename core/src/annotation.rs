//! Classification of parsed annotation signatures into a closed set of
//! layout annotations.

use crate::command::HandleKind;
use crate::error::{Result, SchemaError};
use crate::signature::SyntaxNode;

/// Number of buffer, object and handle slots an annotation may address.
pub const MAX_SLOTS: usize = 32;

/// Raw data placement: `<size, alignment, position>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPlacement {
    pub size: u64,
    pub alignment: u64,
    pub position: u64,
}

/// One layout annotation attached to a command argument.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Annotation, parse_signature_list};
///
/// let nodes = parse_signature_list("Buffer<2,5,0x100>, InRaw<4,4,0>").unwrap();
/// assert_eq!(
///     Annotation::classify(&nodes[0]).unwrap(),
///     Annotation::Buffer { index: 2, transfer_type: 5, size: 0x100 }
/// );
/// assert!(matches!(Annotation::classify(&nodes[1]).unwrap(), Annotation::InRaw(_)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// `Buffer<index, transfer_type, size>`; a size of 0 means variable-length.
    Buffer {
        index: usize,
        transfer_type: u64,
        size: u64,
    },
    InRaw(RawPlacement),
    OutRaw(RawPlacement),
    InObject {
        index: usize,
    },
    OutObject {
        index: usize,
    },
    InHandle {
        index: usize,
        kind: HandleKind,
    },
    OutHandle {
        index: usize,
        kind: HandleKind,
    },
}

impl Annotation {
    /// Classifies a parsed annotation by its tag.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownAnnotation`] for an unrecognized tag,
    /// [`SchemaError::InvalidAnnotation`] for a wrong argument count, an
    /// alignment that is not a power of two or a slot index of
    /// [`MAX_SLOTS`] or more, and
    /// [`SchemaError::InvalidInteger`]/[`SchemaError::InvalidHandleKind`] for
    /// malformed arguments.
    pub fn classify(node: &SyntaxNode) -> Result<Self> {
        match node.before.as_str() {
            "Buffer" => {
                let [index, transfer_type, size] = int_args::<3>("Buffer", node)?;
                Ok(Self::Buffer {
                    index: slot("Buffer", index)?,
                    transfer_type,
                    size,
                })
            }
            "InRaw" => Ok(Self::InRaw(placement("InRaw", node)?)),
            "OutRaw" => Ok(Self::OutRaw(placement("OutRaw", node)?)),
            "InObject" => {
                let [index] = int_args::<1>("InObject", node)?;
                Ok(Self::InObject {
                    index: slot("InObject", index)?,
                })
            }
            "OutObject" => {
                let [index] = int_args::<1>("OutObject", node)?;
                Ok(Self::OutObject {
                    index: slot("OutObject", index)?,
                })
            }
            "InHandle" => {
                let [index, kind] = int_args::<2>("InHandle", node)?;
                Ok(Self::InHandle {
                    index: slot("InHandle", index)?,
                    kind: HandleKind::from_code(kind)?,
                })
            }
            "OutHandle" => {
                let [index, kind] = int_args::<2>("OutHandle", node)?;
                Ok(Self::OutHandle {
                    index: slot("OutHandle", index)?,
                    kind: HandleKind::from_code(kind)?,
                })
            }
            other => Err(SchemaError::UnknownAnnotation(other.to_string())),
        }
    }

    /// The annotation's tag as written in signatures.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Buffer { .. } => "Buffer",
            Self::InRaw(_) => "InRaw",
            Self::OutRaw(_) => "OutRaw",
            Self::InObject { .. } => "InObject",
            Self::OutObject { .. } => "OutObject",
            Self::InHandle { .. } => "InHandle",
            Self::OutHandle { .. } => "OutHandle",
        }
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::parse_int;
///
/// assert_eq!(parse_int("0x100").unwrap(), 256);
/// assert_eq!(parse_int(" 42 ").unwrap(), 42);
/// assert!(parse_int("four").is_err());
/// ```
pub fn parse_int(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| SchemaError::InvalidInteger(text.to_string()))
}

fn slot(tag: &'static str, value: u64) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&index| index < MAX_SLOTS)
        .ok_or_else(|| SchemaError::InvalidAnnotation {
            tag,
            message: format!("slot index {value} exceeds the maximum of {}", MAX_SLOTS - 1),
        })
}

fn int_args<const N: usize>(tag: &'static str, node: &SyntaxNode) -> Result<[u64; N]> {
    if node.arity() != N {
        return Err(SchemaError::InvalidAnnotation {
            tag,
            message: format!("expected {N} arguments in '{node}'"),
        });
    }
    let mut values = [0u64; N];
    for (i, value) in values.iter_mut().enumerate() {
        if let Some(arg) = node.arg(i) {
            *value = parse_int(&arg.to_string())?;
        }
    }
    Ok(values)
}

fn placement(tag: &'static str, node: &SyntaxNode) -> Result<RawPlacement> {
    let [size, alignment, position] = int_args::<3>(tag, node)?;
    if !alignment.is_power_of_two() {
        return Err(SchemaError::InvalidAnnotation {
            tag,
            message: format!("alignment {alignment} is not a power of two"),
        });
    }
    Ok(RawPlacement {
        size,
        alignment,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::parse_signature_list;

    fn classify(text: &str) -> Result<Annotation> {
        let nodes = parse_signature_list(text).unwrap();
        Annotation::classify(&nodes[0])
    }

    #[test]
    fn test_classify_every_tag() {
        assert_eq!(
            classify("InRaw<8,8,0x10>").unwrap(),
            Annotation::InRaw(RawPlacement {
                size: 8,
                alignment: 8,
                position: 16
            })
        );
        assert!(matches!(
            classify("OutRaw<1,1,0>").unwrap(),
            Annotation::OutRaw(_)
        ));
        assert_eq!(
            classify("InObject<0>").unwrap(),
            Annotation::InObject { index: 0 }
        );
        assert_eq!(
            classify("OutObject<1>").unwrap(),
            Annotation::OutObject { index: 1 }
        );
        assert_eq!(
            classify("InHandle<0,1>").unwrap(),
            Annotation::InHandle {
                index: 0,
                kind: HandleKind::Copy
            }
        );
        assert_eq!(
            classify("OutHandle<1,2>").unwrap(),
            Annotation::OutHandle {
                index: 1,
                kind: HandleKind::Move
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(
            classify("InPointer<0>").unwrap_err(),
            SchemaError::UnknownAnnotation("InPointer".into())
        );
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        assert!(matches!(
            classify("InRaw<4,4>").unwrap_err(),
            SchemaError::InvalidAnnotation { tag: "InRaw", .. }
        ));
    }

    #[test]
    fn test_bad_alignment_is_rejected() {
        assert!(matches!(
            classify("InRaw<4,3,0>").unwrap_err(),
            SchemaError::InvalidAnnotation { .. }
        ));
        assert!(classify("InRaw<4,0,0>").is_err());
    }

    #[test]
    fn test_slot_index_out_of_range_is_rejected() {
        for text in [
            "Buffer<0xffffffffffffffff,5,0>",
            "InHandle<0x10000000000,1>",
            "OutHandle<32,2>",
            "InObject<0x100>",
            "OutObject<1000>",
        ] {
            assert!(
                matches!(
                    classify(text).unwrap_err(),
                    SchemaError::InvalidAnnotation { .. }
                ),
                "{text} should be rejected"
            );
        }
        assert_eq!(
            classify("OutHandle<31,2>").unwrap(),
            Annotation::OutHandle {
                index: 31,
                kind: HandleKind::Move
            }
        );
    }

    #[test]
    fn test_bad_handle_kind_is_rejected() {
        assert_eq!(
            classify("InHandle<0,3>").unwrap_err(),
            SchemaError::InvalidHandleKind(3)
        );
    }

    #[test]
    fn test_parse_int_forms() {
        assert_eq!(parse_int("0x19").unwrap(), 0x19);
        assert_eq!(parse_int("0X1f").unwrap(), 31);
        assert_eq!(parse_int("7").unwrap(), 7);
        assert!(matches!(
            parse_int("0xZZ"),
            Err(SchemaError::InvalidInteger(_))
        ));
    }
}

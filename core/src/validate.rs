//! Byte-layout validation of raw arguments.
//!
//! Raw arguments must be packed in offset order, each at the next offset
//! aligned to its own alignment, and must add up to the declared byte total.
//! An unobserved argument list is skipped; an observed one needs a declared
//! total to check against.
//!
//! # Examples
//!
//! ```
//! use ipc_schema_core::{Arg, validate_direction};
//!
//! let args = [Arg::new(4, 4, 0, None), Arg::new(2, 2, 4, None), Arg::new(1, 1, 6, None)];
//! assert!(validate_direction("input", Some(&args), Some(7)).is_ok());
//! assert!(validate_direction("input", Some(&args), Some(8)).is_err());
//! ```

use crate::command::{Arg, CommandLayout};
use crate::error::{Result, SchemaError};

/// Validates both directions of a command layout.
///
/// # Errors
///
/// Returns [`SchemaError::LayoutMismatch`] for the first misplaced argument or
/// wrong byte total found.
pub fn validate_layout(layout: &CommandLayout) -> Result<()> {
    validate_direction("input", layout.in_args.as_deref(), layout.inbytes)?;
    validate_direction("output", layout.out_args.as_deref(), layout.outbytes)
}

/// Validates one direction's arguments against its declared byte total.
pub fn validate_direction(
    direction: &'static str,
    args: Option<&[Arg]>,
    declared: Option<u64>,
) -> Result<()> {
    let Some(args) = args else {
        return Ok(());
    };

    let mut cursor = 0u64;
    for arg in args {
        let alignment = arg.alignment.max(1);
        let expected = cursor
            .div_ceil(alignment)
            .checked_mul(alignment)
            .ok_or_else(|| overflow(direction, arg))?;
        if arg.position != expected {
            return Err(SchemaError::LayoutMismatch {
                direction,
                message: format!(
                    "expected {}-byte argument at 0x{expected:x}, found it at 0x{:x}",
                    arg.size, arg.position
                ),
            });
        }
        cursor = expected
            .checked_add(arg.size)
            .ok_or_else(|| overflow(direction, arg))?;
    }

    match declared {
        Some(declared) if declared == cursor => Ok(()),
        Some(declared) => Err(SchemaError::LayoutMismatch {
            direction,
            message: format!("declared {declared} bytes but arguments end at {cursor}"),
        }),
        None => Err(SchemaError::LayoutMismatch {
            direction,
            message: format!("arguments end at {cursor} but no byte total was declared"),
        }),
    }
}

fn overflow(direction: &'static str, arg: &Arg) -> SchemaError {
    SchemaError::LayoutMismatch {
        direction,
        message: format!(
            "{}-byte argument at 0x{:x} overflows the argument area",
            arg.size, arg.position
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed() -> Vec<Arg> {
        vec![
            Arg::new(4, 4, 0, None),
            Arg::new(2, 2, 4, None),
            Arg::new(1, 1, 6, None),
        ]
    }

    #[test]
    fn test_validate_packed_layout() {
        assert!(validate_direction("input", Some(&packed()), Some(7)).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_total() {
        let err = validate_direction("input", Some(&packed()), Some(8)).unwrap_err();
        assert!(matches!(err, SchemaError::LayoutMismatch { direction: "input", .. }));
    }

    #[test]
    fn test_validate_rejects_misplaced_arg() {
        let mut args = packed();
        args[2].position = 7;
        assert!(matches!(
            validate_direction("input", Some(&args), Some(8)),
            Err(SchemaError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_respects_alignment_padding() {
        let args = vec![Arg::new(1, 1, 0, None), Arg::new(8, 8, 8, None)];
        assert!(validate_direction("output", Some(&args), Some(16)).is_ok());
        let unpadded = vec![Arg::new(1, 1, 0, None), Arg::new(8, 8, 1, None)];
        assert!(validate_direction("output", Some(&unpadded), Some(9)).is_err());
    }

    #[test]
    fn test_validate_skips_unobserved() {
        assert!(validate_direction("input", None, Some(12)).is_ok());
        assert!(validate_direction("input", None, None).is_ok());
        assert!(validate_direction("input", Some(&[]), Some(0)).is_ok());
        assert!(validate_direction("input", Some(&[]), Some(4)).is_err());
    }

    #[test]
    fn test_validate_requires_declared_total() {
        let err = validate_direction("input", Some(&packed()), None).unwrap_err();
        assert!(matches!(err, SchemaError::LayoutMismatch { direction: "input", .. }));
        assert!(validate_direction("output", Some(&[]), None).is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_offsets() {
        let huge = vec![Arg::new(u64::MAX, 1, 0, None), Arg::new(1, 1, u64::MAX, None)];
        assert!(matches!(
            validate_direction("input", Some(&huge), Some(0)),
            Err(SchemaError::LayoutMismatch { .. })
        ));

        let unalignable = vec![Arg::new(u64::MAX - 1, 1, 0, None), Arg::new(4, 1 << 63, 0, None)];
        assert!(matches!(
            validate_direction("input", Some(&unalignable), Some(0)),
            Err(SchemaError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_layout_checks_both_directions() {
        let layout = CommandLayout {
            inbytes: Some(7),
            in_args: Some(packed()),
            outbytes: Some(4),
            out_args: Some(vec![Arg::new(4, 4, 0, None)]),
            ..Default::default()
        };
        assert!(validate_layout(&layout).is_ok());

        let broken = CommandLayout {
            outbytes: Some(8),
            ..layout
        };
        assert!(matches!(
            validate_layout(&broken),
            Err(SchemaError::LayoutMismatch { direction: "output", .. })
        ));
    }
}

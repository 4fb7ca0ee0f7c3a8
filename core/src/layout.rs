//! Turns parsed (type signature, annotation) pairs into structured command
//! layout fields.

use tracing::trace;

use crate::annotation::{Annotation, RawPlacement};
use crate::command::{fill_slot, set_slot, Arg, Buffer, CommandLayout};
use crate::error::{Result, SchemaError};
use crate::revision::Revision;
use crate::signature::SyntaxNode;
use crate::types::{TypeId, TypeRegistry};

/// One argument position of a client fragment: the argument's type
/// signature and its layout annotation, either of which may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgPair {
    pub signature: Option<SyntaxNode>,
    pub annotation: Option<SyntaxNode>,
}

impl ArgPair {
    /// Zips two parsed lists position by position, padding the shorter one
    /// with absent entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipc_schema_core::{ArgPair, parse_signature_list};
    ///
    /// let args = parse_signature_list("u32").unwrap();
    /// let info = parse_signature_list("InRaw<4,4,0>, InHandle<0,1>").unwrap();
    /// let pairs = ArgPair::zip(args, info);
    /// assert_eq!(pairs.len(), 2);
    /// assert!(pairs[1].signature.is_none());
    /// ```
    pub fn zip(signatures: Vec<SyntaxNode>, annotations: Vec<SyntaxNode>) -> Vec<Self> {
        let len = signatures.len().max(annotations.len());
        let mut signatures = signatures.into_iter();
        let mut annotations = annotations.into_iter();
        (0..len)
            .map(|_| Self {
                signature: signatures.next(),
                annotation: annotations.next(),
            })
            .collect()
    }
}

/// Which argument fields the fragment carried at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservedFields {
    pub args: bool,
    pub arg_info: bool,
}

/// Populates a [`CommandLayout`] from argument pairs observed at one revision,
/// recording inferred type sizes in the registry as it goes.
pub struct CommandLayoutBuilder<'a> {
    types: &'a mut TypeRegistry,
    revision: &'a Revision,
}

impl<'a> CommandLayoutBuilder<'a> {
    pub fn new(types: &'a mut TypeRegistry, revision: &'a Revision) -> Self {
        Self { types, revision }
    }

    /// Applies every pair to `layout` in order.
    ///
    /// When the fragment carried layout info, every list-valued field is
    /// marked observed first, so that an empty list stays distinguishable
    /// from a field the fragment never mentioned.
    ///
    /// # Errors
    ///
    /// Fails on unknown or malformed annotations, on a type signature of the
    /// wrong shape for its annotation, and on type size conflicts.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipc_schema_core::{
    ///     ArgPair, CommandLayout, CommandLayoutBuilder, ObservedFields, TypeRegistry,
    ///     parse_signature_list,
    /// };
    ///
    /// let mut types = TypeRegistry::new();
    /// let revision = "2.0.0".parse().unwrap();
    /// let pairs = ArgPair::zip(
    ///     parse_signature_list("u32, Out<nn::Foo>").unwrap(),
    ///     parse_signature_list("InRaw<4,4,0>, OutRaw<0x10,8,0>").unwrap(),
    /// );
    /// let mut layout = CommandLayout::default();
    /// CommandLayoutBuilder::new(&mut types, &revision)
    ///     .apply(&mut layout, &pairs, ObservedFields { args: true, arg_info: true })
    ///     .unwrap();
    ///
    /// assert_eq!(layout.in_args.as_ref().map(Vec::len), Some(1));
    /// assert_eq!(layout.buffers, Some(Vec::new()));
    /// let foo = types.lookup("nn::Foo").unwrap();
    /// assert_eq!(types.inferred(foo).unwrap().size_on(&revision), Some(0x10));
    /// ```
    pub fn apply(
        &mut self,
        layout: &mut CommandLayout,
        pairs: &[ArgPair],
        fields: ObservedFields,
    ) -> Result<()> {
        if fields.arg_info {
            layout.observe_all_lists();
        } else if fields.args {
            trace!(revision = %self.revision, "Argument types without layout info");
        }

        for pair in pairs {
            let Some(annotation) = &pair.annotation else {
                // Unannotated arguments carry no layout facts.
                trace!(signature = ?pair.signature.as_ref().map(ToString::to_string), "Skipping unannotated argument");
                continue;
            };
            let annotation = Annotation::classify(annotation)?;
            self.apply_one(layout, pair.signature.as_ref(), annotation)?;
        }
        Ok(())
    }

    fn apply_one(
        &mut self,
        layout: &mut CommandLayout,
        signature: Option<&SyntaxNode>,
        annotation: Annotation,
    ) -> Result<()> {
        match annotation {
            Annotation::Buffer {
                index,
                transfer_type,
                size,
            } => {
                let (data_type, is_array) = match signature {
                    Some(sig) => {
                        let (element, is_array) = match sig.before.as_str() {
                            "Out" => (type_argument("Buffer", sig)?.to_string(), false),
                            "InArray" | "OutArray" => {
                                (type_argument("Buffer", sig)?.to_string(), true)
                            }
                            _ => (sig.to_string(), false),
                        };
                        let id = self.sized_type(&element, (size != 0).then_some(size))?;
                        (Some(id), is_array)
                    }
                    None => (None, false),
                };
                let buffers = layout.buffers.get_or_insert_with(Vec::new);
                set_slot(
                    buffers,
                    index,
                    Buffer {
                        data_type,
                        transfer_type,
                        size: Some(size),
                        is_array: Some(is_array),
                    },
                );
            }
            Annotation::InRaw(placement) => {
                let data_type = match signature {
                    Some(sig) => Some(self.sized_type(&sig.to_string(), Some(placement.size))?),
                    None => None,
                };
                push_sorted(layout.in_args.get_or_insert_with(Vec::new), placement, data_type);
            }
            Annotation::OutRaw(placement) => {
                let data_type = match signature {
                    Some(sig) => {
                        let inner = expect_wrapper("OutRaw", sig, "Out")?;
                        Some(self.sized_type(&inner.to_string(), Some(placement.size))?)
                    }
                    None => None,
                };
                push_sorted(layout.out_args.get_or_insert_with(Vec::new), placement, data_type);
            }
            Annotation::InObject { index } => {
                let name = match signature {
                    Some(sig) => Some(expect_wrapper("InObject", sig, "SharedPointer")?.to_string()),
                    None => None,
                };
                fill_slot(layout.in_interfaces.get_or_insert_with(Vec::new), index, name);
            }
            Annotation::OutObject { index } => {
                let name = match signature {
                    Some(sig) => {
                        let pointer = expect_wrapper("OutObject", sig, "Out")?;
                        Some(expect_wrapper("OutObject", pointer, "SharedPointer")?.to_string())
                    }
                    None => None,
                };
                fill_slot(layout.out_interfaces.get_or_insert_with(Vec::new), index, name);
            }
            Annotation::InHandle { index, kind } => {
                set_slot(layout.in_handles.get_or_insert_with(Vec::new), index, kind);
            }
            Annotation::OutHandle { index, kind } => {
                set_slot(layout.out_handles.get_or_insert_with(Vec::new), index, kind);
            }
        }
        Ok(())
    }

    fn sized_type(&mut self, name: &str, size: Option<u64>) -> Result<TypeId> {
        let id = self.types.get_or_create_inferred(name);
        self.types.assert_size_on(id, self.revision, size)?;
        Ok(id)
    }
}

fn push_sorted(args: &mut Vec<Arg>, placement: RawPlacement, data_type: Option<TypeId>) {
    args.push(Arg::new(
        placement.size,
        placement.alignment,
        placement.position,
        data_type,
    ));
    args.sort_by_key(|arg| arg.position);
}

fn type_argument<'n>(tag: &'static str, sig: &'n SyntaxNode) -> Result<&'n SyntaxNode> {
    sig.arg(0).ok_or_else(|| SchemaError::InvalidAnnotation {
        tag,
        message: format!("type '{sig}' has no type argument"),
    })
}

/// Unwraps `wrapper<T>` to `T`, failing if `sig` has another shape.
fn expect_wrapper<'n>(
    tag: &'static str,
    sig: &'n SyntaxNode,
    wrapper: &str,
) -> Result<&'n SyntaxNode> {
    if sig.before != wrapper {
        return Err(SchemaError::InvalidAnnotation {
            tag,
            message: format!("expected {wrapper}<T>, found '{sig}'"),
        });
    }
    type_argument(tag, sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HandleKind;
    use crate::signature::parse_signature_list;

    fn rev(text: &str) -> Revision {
        text.parse().unwrap()
    }

    fn build(
        types: &mut TypeRegistry,
        revision: &Revision,
        args: &str,
        info: &str,
    ) -> Result<CommandLayout> {
        let pairs = ArgPair::zip(
            parse_signature_list(args).unwrap(),
            parse_signature_list(info).unwrap(),
        );
        let mut layout = CommandLayout::default();
        CommandLayoutBuilder::new(types, revision).apply(
            &mut layout,
            &pairs,
            ObservedFields {
                args: true,
                arg_info: true,
            },
        )?;
        Ok(layout)
    }

    #[test]
    fn test_raw_args_sorted_by_position() {
        let mut types = TypeRegistry::new();
        let layout = build(
            &mut types,
            &rev("1.0.0"),
            "u8, u32",
            "InRaw<1,1,4>, InRaw<4,4,0>",
        )
        .unwrap();
        let positions: Vec<u64> = layout
            .in_args
            .unwrap()
            .iter()
            .map(|arg| arg.position)
            .collect();
        assert_eq!(positions, vec![0, 4]);
    }

    #[test]
    fn test_out_raw_requires_out_wrapper() {
        let mut types = TypeRegistry::new();
        let err = build(&mut types, &rev("1.0.0"), "u32", "OutRaw<4,4,0>").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAnnotation { tag: "OutRaw", .. }));
    }

    #[test]
    fn test_buffer_element_types() {
        let mut types = TypeRegistry::new();
        let revision = rev("3.0.0");
        let layout = build(
            &mut types,
            &revision,
            "Out<nn::Info>, InArray<nn::Entry>, nn::Blob",
            "Buffer<0,0x16,0x20>, Buffer<1,5,0>, Buffer<2,0x19,0x100>",
        )
        .unwrap();
        let buffers = layout.buffers.unwrap();
        assert_eq!(buffers.len(), 3);

        let info = buffers[0].as_ref().unwrap();
        assert_eq!(info.is_array, Some(false));
        assert_eq!(types.display_name(info.data_type.unwrap()), "nn::Info");
        assert_eq!(info.size, Some(0x20));

        let entries = buffers[1].as_ref().unwrap();
        assert_eq!(entries.is_array, Some(true));
        let entry = types.inferred(entries.data_type.unwrap()).unwrap();
        assert_eq!(entry.sizes.get(&revision), Some(&None));

        let blob = types.lookup("nn::Blob").unwrap();
        assert_eq!(types.inferred(blob).unwrap().size_on(&revision), Some(0x100));
    }

    #[test]
    fn test_buffer_without_signature() {
        let mut types = TypeRegistry::new();
        let layout = build(&mut types, &rev("1.0.0"), "", "Buffer<1,6,0x40>").unwrap();
        let buffers = layout.buffers.unwrap();
        assert_eq!(buffers[0], None);
        assert_eq!(buffers[1].as_ref().unwrap().data_type, None);
    }

    #[test]
    fn test_objects_first_writer_wins() {
        let mut types = TypeRegistry::new();
        let layout = build(
            &mut types,
            &rev("1.0.0"),
            "SharedPointer<nn::IFoo>, SharedPointer<nn::IBar>, Out<SharedPointer<nn::IBaz>>",
            "InObject<0>, InObject<0>, OutObject<1>",
        )
        .unwrap();
        assert_eq!(layout.in_interfaces, Some(vec![Some("nn::IFoo".to_string())]));
        assert_eq!(
            layout.out_interfaces,
            Some(vec![None, Some("nn::IBaz".to_string())])
        );
    }

    #[test]
    fn test_object_shape_checked() {
        let mut types = TypeRegistry::new();
        let err = build(&mut types, &rev("1.0.0"), "Out<nn::IFoo>", "OutObject<0>").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAnnotation { tag: "OutObject", .. }));
        let err = build(&mut types, &rev("1.0.0"), "nn::IFoo", "InObject<0>").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAnnotation { tag: "InObject", .. }));
    }

    #[test]
    fn test_handles_ignore_signature() {
        let mut types = TypeRegistry::new();
        let layout = build(
            &mut types,
            &rev("1.0.0"),
            "KObject, KObject",
            "InHandle<1,2>, OutHandle<0,1>",
        )
        .unwrap();
        assert_eq!(layout.in_handles, Some(vec![None, Some(HandleKind::Move)]));
        assert_eq!(layout.out_handles, Some(vec![Some(HandleKind::Copy)]));
        assert!(types.lookup("KObject").is_none());
    }

    #[test]
    fn test_unannotated_signature_skipped() {
        let mut types = TypeRegistry::new();
        let layout = build(&mut types, &rev("1.0.0"), "u32, nn::Thing", "InRaw<4,4,0>").unwrap();
        assert_eq!(layout.in_args.unwrap().len(), 1);
        assert!(types.lookup("nn::Thing").is_none());
    }

    #[test]
    fn test_unknown_annotation_fails() {
        let mut types = TypeRegistry::new();
        let err = build(&mut types, &rev("1.0.0"), "u32", "Frobnicate<1>").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownAnnotation(tag) if tag == "Frobnicate"));
    }

    #[test]
    fn test_builtin_size_conflict() {
        let mut types = TypeRegistry::new();
        let err = build(&mut types, &rev("1.0.0"), "int", "InRaw<8,8,0>").unwrap_err();
        assert!(matches!(err, SchemaError::SizeConflict { .. }));
    }

    #[test]
    fn test_lists_left_unobserved_without_arg_info() {
        let mut types = TypeRegistry::new();
        let mut layout = CommandLayout::default();
        CommandLayoutBuilder::new(&mut types, &rev("1.0.0"))
            .apply(&mut layout, &[], ObservedFields { args: true, arg_info: false })
            .unwrap();
        assert_eq!(layout, CommandLayout::default());
    }
}

use super::{Frame, InstructionId, StackElement, StackElementType};
use crate::jvm::{BinaryName, ConstantIndex, RefType, Serialize};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::io::{Error, ErrorKind};

/// Types as they appear in the `StackMapTable` attribute
///
///   - while building the table, `Cls` is a `RefType<BinaryName>` and `U` is the `new`
///     instruction that produced an uninitialized value
///   - when serializing, `Cls` is the index of a class constant and `U` is the bytecode offset of
///     the `new` instruction
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(Cls),
    Uninitialized(U),
}

pub type SymbolicType = VerificationType<RefType<BinaryName>, InstructionId>;
pub type ResolvedType = VerificationType<ConstantIndex, u16>;

impl SymbolicType {
    pub fn from_element(element: &StackElementType) -> SymbolicType {
        match element {
            StackElementType::Top => VerificationType::Top,
            StackElementType::Integer => VerificationType::Integer,
            StackElementType::Float => VerificationType::Float,
            StackElementType::Long => VerificationType::Long,
            StackElementType::Double => VerificationType::Double,
            StackElementType::Null => VerificationType::Null,
            StackElementType::UninitializedThis => VerificationType::UninitializedThis,
            StackElementType::Uninitialized { site, .. } => VerificationType::Uninitialized(*site),
            StackElementType::ObjectRef => VerificationType::Object(RefType::Object(BinaryName::OBJECT)),
            StackElementType::Reference(ref_type) => VerificationType::Object(ref_type.clone()),
        }
    }
}

impl<C, U> VerificationType<C, U> {
    pub fn try_map<C2, U2, E>(
        &self,
        map_class: &mut impl FnMut(&C) -> Result<C2, E>,
        map_uninitialized: &mut impl FnMut(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(u) => {
                VerificationType::Uninitialized(map_uninitialized(u)?)
            }
        })
    }
}

impl<C, U> Width for VerificationType<C, U> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl Serialize for ResolvedType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Locals as the stack map lists them: a category 2 value covers the `Top` slot after it, and
/// trailing unusable slots are dropped
pub fn compress_locals(locals: &[StackElement]) -> Vec<SymbolicType> {
    let mut compressed = vec![];
    let mut slot = 0;
    while slot < locals.len() {
        let element = &locals[slot];
        compressed.push(SymbolicType::from_element(&element.ty));
        slot += element.width();
    }
    while let Some(VerificationType::Top) = compressed.last() {
        compressed.pop();
    }
    compressed
}

pub fn stack_types(frame: &Frame) -> Vec<SymbolicType> {
    frame
        .stack
        .iter()
        .map(|(_, _, element)| SymbolicType::from_element(&element.ty))
        .collect()
}

/// One entry of the stack map table, expressed relative to the entry before it
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame<V> {
    /// Same locals as the previous frame and an empty stack
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Same locals as the previous frame and exactly one stack entry
    /// Tags: 64-127 or 247
    SameLocalsOneStack { offset_delta: u16, stack: V },

    /// Previous frame without the last `chopped_k` locals (1 to 3) and an empty stack
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Previous frame with 1 to 3 extra locals and an empty stack
    /// Tags: 252-254
    AppendLocalsNoStack { offset_delta: u16, locals: Vec<V> },

    /// Exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<V>,
        stack: Vec<V>,
    },
}

impl<V: Clone + PartialEq> StackMapFrame<V> {
    /// Pick the most compact entry describing `locals` and `stack`, given the locals of the
    /// previous entry
    pub fn between(offset_delta: u16, previous_locals: &[V], locals: &[V], stack: &[V]) -> Self {
        match stack.len() {
            0 if locals.len() <= previous_locals.len()
                && previous_locals.len() - locals.len() < 4
                && previous_locals.starts_with(locals) =>
            {
                let chopped_k = previous_locals.len() - locals.len();
                if chopped_k == 0 {
                    StackMapFrame::SameLocalsNoStack { offset_delta }
                } else {
                    StackMapFrame::ChopLocalsNoStack {
                        offset_delta,
                        chopped_k: chopped_k as u8,
                    }
                }
            }
            0 if locals.len() > previous_locals.len()
                && locals.len() - previous_locals.len() < 4
                && locals.starts_with(previous_locals) =>
            {
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals: locals[previous_locals.len()..].to_vec(),
                }
            }
            1 if locals == previous_locals => StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack: stack[0].clone(),
            },
            _ => StackMapFrame::Full {
                offset_delta,
                locals: locals.to_vec(),
                stack: stack.to_vec(),
            },
        }
    }

    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn try_map<V2, E>(
        &self,
        mut map_type: impl FnMut(&V) -> Result<V2, E>,
    ) -> Result<StackMapFrame<V2>, E> {
        Ok(match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => StackMapFrame::SameLocalsNoStack {
                offset_delta: *offset_delta,
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocalsOneStack {
                offset_delta: *offset_delta,
                stack: map_type(stack)?,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => StackMapFrame::ChopLocalsNoStack {
                offset_delta: *offset_delta,
                chopped_k: *chopped_k,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => StackMapFrame::AppendLocalsNoStack {
                offset_delta: *offset_delta,
                locals: locals.iter().map(&mut map_type).collect::<Result<_, E>>()?,
            },
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => StackMapFrame::Full {
                offset_delta: *offset_delta,
                locals: locals.iter().map(&mut map_type).collect::<Result<_, E>>()?,
                stack: stack.iter().map(&mut map_type).collect::<Result<_, E>>()?,
            },
        })
    }
}

impl Serialize for StackMapFrame<ResolvedType> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                if !(1..=3).contains(chopped_k) {
                    let msg = format!("chop frame cannot chop {} locals", chopped_k);
                    return Err(Error::new(ErrorKind::InvalidData, msg));
                }
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                if !(1..=3).contains(&added_k) {
                    let msg = format!("append frame cannot add {} locals", added_k);
                    return Err(Error::new(ErrorKind::InvalidData, msg));
                }
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Build the entries of a stack map table
///
///   * `initial` - frame on entry to the method (the implicit first frame of the table)
///   * `targets` - frames at the offsets that are jump targets
///
/// Entries come out sorted by offset. Each `offset_delta` is relative to the previous entry,
/// following the class file convention that every entry after the first adds one.
pub fn build_stack_map<'a>(
    initial: &Frame,
    targets: impl IntoIterator<Item = (usize, &'a Frame)>,
) -> Vec<(usize, StackMapFrame<SymbolicType>)> {
    let mut targets: Vec<(usize, &Frame)> = targets.into_iter().collect();
    targets.sort_by_key(|(offset, _)| *offset);
    targets.dedup_by_key(|(offset, _)| *offset);

    let mut entries = vec![];
    let mut previous_locals = compress_locals(&initial.locals);
    let mut previous_offset: Option<usize> = None;
    for (offset, frame) in targets {
        let offset_delta = match previous_offset {
            None => offset,
            Some(previous) => offset - previous - 1,
        };
        let locals = compress_locals(&frame.locals);
        let stack = stack_types(frame);
        let entry = StackMapFrame::between(offset_delta as u16, &previous_locals, &locals, &stack);
        entries.push((offset, entry));
        previous_locals = locals;
        previous_offset = Some(offset);
    }
    entries
}

#[cfg(test)]
mod test {
    use super::*;

    fn element(ty: StackElementType) -> StackElement {
        StackElement::new(ty, None)
    }

    fn frame(locals: Vec<StackElementType>, stack: Vec<StackElementType>) -> Frame {
        let mut frame = Frame::new();
        for (idx, local) in locals.into_iter().enumerate() {
            if local != StackElementType::Top {
                frame.set_local(idx as u16, element(local));
            }
        }
        frame.stack = stack.into_iter().map(element).collect();
        frame
    }

    #[test]
    fn compressed_locals() {
        let frame = frame(
            vec![
                StackElementType::Integer,
                StackElementType::Long,
                StackElementType::Top,
                StackElementType::Float,
            ],
            vec![],
        );
        assert_eq!(
            compress_locals(&frame.locals),
            vec![
                VerificationType::Integer,
                VerificationType::Long,
                VerificationType::Float
            ]
        );

        let mut trailing = frame.clone();
        trailing.locals.push(StackElement::TOP);
        trailing.locals.push(StackElement::TOP);
        assert_eq!(compress_locals(&trailing.locals).len(), 3);
    }

    #[test]
    fn compact_entries() {
        use StackElementType::*;
        let initial = frame(vec![Integer], vec![]);
        let same = frame(vec![Integer], vec![]);
        let one_stack = frame(vec![Integer], vec![Float]);
        let appended = frame(vec![Integer, Long, Top, Float], vec![]);
        let chopped = frame(vec![Integer, Long], vec![]);
        let full = frame(vec![Float], vec![Integer, Integer]);

        let entries = build_stack_map(
            &initial,
            vec![
                (20, &one_stack),
                (4, &same),
                (30, &appended),
                (40, &chopped),
                (50, &full),
            ],
        );
        let entries: Vec<_> = entries.into_iter().map(|(_, entry)| entry).collect();
        assert_eq!(entries[0], StackMapFrame::SameLocalsNoStack { offset_delta: 4 });
        assert_eq!(
            entries[1],
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 15,
                stack: VerificationType::Float
            }
        );
        assert_eq!(
            entries[2],
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 9,
                locals: vec![VerificationType::Long, VerificationType::Float]
            }
        );
        assert_eq!(
            entries[3],
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 9,
                chopped_k: 1
            }
        );
        assert!(matches!(entries[4], StackMapFrame::Full { offset_delta: 9, .. }));
    }

    #[test]
    fn serialized_entries() {
        let extended: StackMapFrame<ResolvedType> =
            StackMapFrame::SameLocalsNoStack { offset_delta: 100 };
        assert_eq!(extended.to_bytes().unwrap(), vec![251, 0, 100]);

        let one_stack: StackMapFrame<ResolvedType> = StackMapFrame::SameLocalsOneStack {
            offset_delta: 3,
            stack: VerificationType::Object(ConstantIndex(9)),
        };
        assert_eq!(one_stack.to_bytes().unwrap(), vec![67, 7, 0, 9]);

        let bad_chop: StackMapFrame<ResolvedType> = StackMapFrame::ChopLocalsNoStack {
            offset_delta: 0,
            chopped_k: 4,
        };
        assert!(bad_chop.to_bytes().is_err());
    }
}

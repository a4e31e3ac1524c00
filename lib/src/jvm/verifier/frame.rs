use super::{StackElement, StackElementType};
use crate::jvm::{BinaryName, RefType};
use crate::util::{OffsetVec, Width};
use std::fmt::{Display, Error as FmtError, Formatter};

/// Abstract state flowing along one control flow edge: the operand stack and local variables
///
/// Locals are stored one entry per slot. A category 2 value in slot `n` is followed by a `Top`
/// entry in slot `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub stack: OffsetVec<StackElement>,
    pub locals: Vec<StackElement>,
}

/// Why two frames are not compatible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameMismatch {
    /// The stacks have different depths (in slots)
    StackSize { expected: usize, actual: usize },

    /// The stack entries at this position have different shapes
    StackElement(usize),

    /// The local slots at this index have different shapes
    Local(usize),
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    /// Depth of the stack, in slots
    pub fn stack_depth(&self) -> usize {
        self.stack.offset_len().0
    }

    /// Number of local slots in use
    pub fn locals_len(&self) -> usize {
        self.locals.len()
    }

    pub fn local(&self, index: u16) -> Option<&StackElement> {
        self.locals.get(index as usize)
    }

    /// Write a value into a local (and the slot after it if the value is category 2)
    ///
    /// Overwriting half of a category 2 value leaves the other half unusable.
    pub fn set_local(&mut self, index: u16, element: StackElement) {
        let index = index as usize;
        let width = element.width();
        if self.locals.len() < index + width {
            self.locals.resize(index + width, StackElement::TOP);
        }

        // The slot after a category 2 value is always `Top`, so only the slot before can be the
        // first half of a value that is now broken
        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = StackElement::TOP;
        }
        if width == 2 {
            self.locals[index + 1] = StackElement::TOP;
        }
        self.locals[index] = element;
    }

    /// Replace every copy of an uninitialized value with an initialized reference
    pub fn initialize(&mut self, uninitialized: &StackElementType, this_class: &BinaryName) {
        let initialized = match uninitialized {
            StackElementType::UninitializedThis => RefType::Object(this_class.clone()),
            StackElementType::Uninitialized { class, .. } => RefType::Object(class.clone()),
            _ => return,
        };
        let update = |element: StackElement| -> StackElement {
            if &element.ty == uninitialized {
                StackElement::new(
                    StackElementType::Reference(initialized.clone()),
                    element.producer,
                )
            } else {
                element
            }
        };

        let stack = std::mem::take(&mut self.stack);
        self.stack = stack
            .iter()
            .map(|(_, _, element)| update(element.clone()))
            .collect();
        for local in self.locals.iter_mut() {
            *local = update(local.clone());
        }
    }

    /// Check that a frame arriving along another edge agrees with this one
    ///
    /// Stacks must have the same depth and pairwise the same shapes. Every local slot of this
    /// frame must have the same shape in `other`, with missing slots counting as unusable. Extra
    /// locals in `other` are fine: they are unusable past this point.
    pub fn check_compatible(&self, other: &Frame) -> Result<(), FrameMismatch> {
        if self.stack_depth() != other.stack_depth() {
            return Err(FrameMismatch::StackSize {
                expected: self.stack_depth(),
                actual: other.stack_depth(),
            });
        }
        for (position, ((_, _, expected), (_, _, actual))) in
            self.stack.iter().zip(other.stack.iter()).enumerate()
        {
            if !expected.same_shape(actual) {
                return Err(FrameMismatch::StackElement(position));
            }
        }

        for (index, expected) in self.locals.iter().enumerate() {
            let actual = other.locals.get(index).unwrap_or(&StackElement::TOP);
            if expected.ty != StackElementType::Top && !expected.same_shape(actual) {
                return Err(FrameMismatch::Local(index));
            }
        }
        Ok(())
    }

    /// Widen the reference types of this frame so that they also describe `other`
    ///
    /// Only meaningful once `other` is known to be compatible. This never changes shapes: a
    /// `null` slot takes the class arriving in `other`, and references to different classes
    /// become [`StackElementType::ObjectRef`]. Returns whether anything was widened.
    pub fn join_references(&mut self, other: &Frame) -> bool {
        let mut changed = false;

        let stack = std::mem::take(&mut self.stack);
        self.stack = stack
            .iter()
            .zip(other.stack.iter())
            .map(|((_, _, mine), (_, _, theirs))| {
                let mut element = mine.clone();
                changed |= join_reference(&mut element.ty, &theirs.ty);
                element
            })
            .collect();
        for (local, theirs) in self.locals.iter_mut().zip(other.locals.iter()) {
            changed |= join_reference(&mut local.ty, &theirs.ty);
        }
        changed
    }
}

fn join_reference(mine: &mut StackElementType, theirs: &StackElementType) -> bool {
    use StackElementType::{Null, ObjectRef, Reference};
    let joined = match (&*mine, theirs) {
        (Null, Reference(_)) => theirs.clone(),
        (Reference(a), Reference(b)) if a != b => ObjectRef,
        (Null | Reference(_), ObjectRef) => ObjectRef,
        _ => return false,
    };
    *mine = joined;
    true
}

impl Display for FrameMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            FrameMismatch::StackSize { expected, actual } => {
                write!(f, "stack depth {} instead of {}", actual, expected)
            }
            FrameMismatch::StackElement(position) => write!(f, "stack entry {} differs", position),
            FrameMismatch::Local(index) => write!(f, "local {} differs", index),
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str("locals [")?;
        for (idx, local) in self.locals.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", local)?;
        }
        f.write_str("], stack [")?;
        for (_, idx, element) in &self.stack {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", element)?;
        }
        f.write_str("]")
    }
}

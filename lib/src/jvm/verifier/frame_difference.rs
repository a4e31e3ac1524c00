use super::{Primitive, StackElementType};
use crate::jvm::{BinaryName, RefType};
use crate::util::Width;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Declarative effect of one instruction on the frame
///
/// Pops are listed top of stack first. Pushes are listed in push order, so the last push ends up
/// on top of the stack. Nothing is checked here: an inconsistent declaration is a bug in the
/// instruction kind that declared it.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameDifference {
    /// No effect on the stack (eg. `nop`, `goto`, `iinc`)
    Same,

    Change(FrameChange),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct FrameChange {
    pub pops: Vec<ExpectedElement>,
    pub pushes: Vec<PushedElement>,

    /// Store the first popped value into this local
    pub store: Option<u16>,

    /// Initialize the object popped at this position: every copy of it in the frame becomes an
    /// initialized reference
    pub initialize: Option<usize>,
}

/// Shape expected when popping
#[derive(Clone, Debug, PartialEq)]
pub enum ExpectedElement {
    Primitive(Primitive),

    /// Initialized reference or `null`
    ObjectRef,

    /// Any reference, initialized or not
    AnyReference,

    /// Reference to an object whose `<init>` has not been called yet
    Uninitialized,

    /// Exactly this many slots of values, never splitting a category 2 value
    Slots(usize),
}

impl Width for ExpectedElement {
    fn width(&self) -> usize {
        match self {
            ExpectedElement::Primitive(primitive) => primitive.width(),
            ExpectedElement::Slots(slots) => *slots,
            _ => 1,
        }
    }
}

impl ExpectedElement {
    /// Does a single value of this type satisfy the expectation?
    ///
    /// `Slots` is checked by the caller since it may span several values.
    pub fn accepts(&self, actual: &StackElementType) -> bool {
        match self {
            ExpectedElement::Primitive(primitive) => actual.primitive() == Some(*primitive),
            ExpectedElement::ObjectRef => actual.is_initialized_reference(),
            ExpectedElement::AnyReference => actual.is_reference(),
            ExpectedElement::Uninitialized => actual.is_uninitialized(),
            ExpectedElement::Slots(slots) => actual.width() == *slots,
        }
    }
}

impl Display for ExpectedElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            ExpectedElement::Primitive(primitive) => StackElementType::from(*primitive).fmt(f),
            ExpectedElement::ObjectRef => f.write_str("object reference"),
            ExpectedElement::AnyReference => f.write_str("reference"),
            ExpectedElement::Uninitialized => f.write_str("uninitialized reference"),
            ExpectedElement::Slots(1) => f.write_str("category 1 value"),
            ExpectedElement::Slots(slots) => write!(f, "{} slots of values", slots),
        }
    }
}

/// Value produced when pushing
#[derive(Clone, Debug, PartialEq)]
pub enum PushedElement {
    Primitive(Primitive),
    Null,
    ObjectRef,
    Reference(RefType<BinaryName>),

    /// Fresh object of this class, awaiting `<init>`
    Uninitialized(BinaryName),

    /// The values popped by the pop at this position, unchanged
    Popped(usize),

    /// Value of a local variable, which must satisfy the expectation
    Local { index: u16, expected: ExpectedElement },
}

impl FrameDifference {
    pub fn same() -> FrameDifference {
        FrameDifference::Same
    }

    pub fn builder() -> FrameDifferenceBuilder {
        FrameDifferenceBuilder(FrameChange::default())
    }

    /// Change in stack depth (in slots) that applying this difference causes
    pub fn slot_delta(&self) -> isize {
        match self {
            FrameDifference::Same => 0,
            FrameDifference::Change(change) => {
                let popped: usize = change.pops.iter().map(Width::width).sum();
                let pushed: usize = change
                    .pushes
                    .iter()
                    .map(|push| match push {
                        PushedElement::Primitive(primitive) => primitive.width(),
                        PushedElement::Popped(idx) => {
                            change.pops.get(*idx).map_or(0, Width::width)
                        }
                        PushedElement::Local { expected, .. } => expected.width(),
                        _ => 1,
                    })
                    .sum();
                pushed as isize - popped as isize
            }
        }
    }
}

/// Incrementally declare a [`FrameDifference`]
pub struct FrameDifferenceBuilder(FrameChange);

impl FrameDifferenceBuilder {
    pub fn pop_primitive(mut self, primitive: Primitive) -> Self {
        self.0.pops.push(ExpectedElement::Primitive(primitive));
        self
    }

    pub fn pop_object_ref(mut self) -> Self {
        self.0.pops.push(ExpectedElement::ObjectRef);
        self
    }

    pub fn pop_any_reference(mut self) -> Self {
        self.0.pops.push(ExpectedElement::AnyReference);
        self
    }

    pub fn pop_slots(mut self, slots: usize) -> Self {
        self.0.pops.push(ExpectedElement::Slots(slots));
        self
    }

    pub fn pop(mut self, expected: ExpectedElement) -> Self {
        self.0.pops.push(expected);
        self
    }

    pub fn push_primitive(mut self, primitive: Primitive) -> Self {
        self.0.pushes.push(PushedElement::Primitive(primitive));
        self
    }

    pub fn push_object_ref(mut self) -> Self {
        self.0.pushes.push(PushedElement::ObjectRef);
        self
    }

    pub fn push_null(mut self) -> Self {
        self.0.pushes.push(PushedElement::Null);
        self
    }

    pub fn push_reference(mut self, ref_type: RefType<BinaryName>) -> Self {
        self.0.pushes.push(PushedElement::Reference(ref_type));
        self
    }

    pub fn push_uninitialized(mut self, class: BinaryName) -> Self {
        self.0.pushes.push(PushedElement::Uninitialized(class));
        self
    }

    /// Push back the values popped by the pop at position `idx`
    pub fn push_popped(mut self, idx: usize) -> Self {
        self.0.pushes.push(PushedElement::Popped(idx));
        self
    }

    pub fn push(mut self, pushed: PushedElement) -> Self {
        self.0.pushes.push(pushed);
        self
    }

    pub fn load_local(mut self, index: u16, expected: ExpectedElement) -> Self {
        self.0.pushes.push(PushedElement::Local { index, expected });
        self
    }

    /// Store the first popped value into a local
    pub fn store_local(mut self, index: u16) -> Self {
        self.0.store = Some(index);
        self
    }

    /// Initialize the uninitialized object popped at position `idx`
    pub fn initialize(mut self, idx: usize) -> Self {
        self.0.initialize = Some(idx);
        self
    }

    pub fn build(self) -> FrameDifference {
        FrameDifference::Change(self.0)
    }
}

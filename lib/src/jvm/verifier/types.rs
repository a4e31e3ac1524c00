use crate::jvm::{BaseType, BinaryName, FieldType, RefType, RenderDescriptor};
use crate::util::Width;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Position of an instruction in the body of the method being compiled
///
/// This is an index into the method's instruction list. Stack elements use it to remember which
/// instruction produced them, which is only ever used to attribute errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionId(pub usize);

impl Display for InstructionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "instruction #{}", self.0)
    }
}

/// Primitive kinds that instructions pop and push by name
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Integer,
    Float,
    Long,
    Double,
}

impl Width for Primitive {
    fn width(&self) -> usize {
        match self {
            Primitive::Long | Primitive::Double => 2,
            Primitive::Integer | Primitive::Float => 1,
        }
    }
}

impl From<BaseType> for Primitive {
    fn from(base_type: BaseType) -> Primitive {
        match base_type.computational_type() {
            BaseType::Long => Primitive::Long,
            BaseType::Float => Primitive::Float,
            BaseType::Double => Primitive::Double,
            _ => Primitive::Integer,
        }
    }
}

/// Type of an abstract value on the stack or in a local variable
///
/// These follow the verification types of [this hierarchy][0], except that there is also a
/// generic object reference whose class is unknown (eg. what `aaload` produces).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StackElementType {
    /// Unusable slot (only ever found in locals)
    Top,

    Integer,
    Float,
    Long,
    Double,
    Null,

    /// In the constructor, `this` starts with this type then turns into an object type after the
    /// superclass `<init>` is called
    UninitializedThis,

    /// Result of a `new` whose `<init>` has not been called yet
    Uninitialized {
        /// Class the object will have once initialized
        class: BinaryName,

        /// The `new` instruction
        site: InstructionId,
    },

    /// Reference to an object of unspecified class
    ObjectRef,

    /// Reference to an object of a known class, interface, or array type
    Reference(RefType<BinaryName>),
}

impl StackElementType {
    /// Is this a reference (including `null` and uninitialized objects)?
    pub fn is_reference(&self) -> bool {
        match self {
            StackElementType::Top
            | StackElementType::Integer
            | StackElementType::Float
            | StackElementType::Long
            | StackElementType::Double => false,

            StackElementType::Null
            | StackElementType::UninitializedThis
            | StackElementType::Uninitialized { .. }
            | StackElementType::ObjectRef
            | StackElementType::Reference(_) => true,
        }
    }

    /// Is this a reference to an initialized object (or `null`)?
    pub fn is_initialized_reference(&self) -> bool {
        matches!(
            self,
            StackElementType::Null | StackElementType::ObjectRef | StackElementType::Reference(_)
        )
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(
            self,
            StackElementType::UninitializedThis | StackElementType::Uninitialized { .. }
        )
    }

    /// Do two types have the same shape?
    ///
    /// Primitives must be of the same kind. Initialized references all have the same shape,
    /// whatever their class. Uninitialized references only match the same allocation.
    pub fn same_shape(&self, other: &StackElementType) -> bool {
        if self.is_initialized_reference() && other.is_initialized_reference() {
            true
        } else {
            self == other
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            StackElementType::Integer => Some(Primitive::Integer),
            StackElementType::Float => Some(Primitive::Float),
            StackElementType::Long => Some(Primitive::Long),
            StackElementType::Double => Some(Primitive::Double),
            _ => None,
        }
    }
}

impl Width for StackElementType {
    fn width(&self) -> usize {
        match self {
            StackElementType::Long | StackElementType::Double => 2,
            _ => 1,
        }
    }
}

impl From<Primitive> for StackElementType {
    fn from(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Integer => StackElementType::Integer,
            Primitive::Float => StackElementType::Float,
            Primitive::Long => StackElementType::Long,
            Primitive::Double => StackElementType::Double,
        }
    }
}

impl From<FieldType<BinaryName>> for StackElementType {
    fn from(field_type: FieldType<BinaryName>) -> Self {
        match field_type {
            FieldType::Base(base_type) => Primitive::from(base_type).into(),
            FieldType::Ref(ref_type) => StackElementType::Reference(ref_type),
        }
    }
}

impl Display for StackElementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            StackElementType::Top => f.write_str("top"),
            StackElementType::Integer => f.write_str("int"),
            StackElementType::Float => f.write_str("float"),
            StackElementType::Long => f.write_str("long"),
            StackElementType::Double => f.write_str("double"),
            StackElementType::Null => f.write_str("null"),
            StackElementType::UninitializedThis => f.write_str("uninitialized this"),
            StackElementType::Uninitialized { class, site } => {
                write!(f, "uninitialized {} (from {})", class, site)
            }
            StackElementType::ObjectRef => f.write_str("object reference"),
            StackElementType::Reference(ref_type) => f.write_str(&ref_type.render()),
        }
    }
}

/// One abstract value, along with the instruction that produced it
///
/// Values that come from the method's parameters have no producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackElement {
    pub ty: StackElementType,
    pub producer: Option<InstructionId>,
}

impl StackElement {
    pub fn new(ty: StackElementType, producer: Option<InstructionId>) -> StackElement {
        StackElement { ty, producer }
    }

    pub const TOP: StackElement = StackElement {
        ty: StackElementType::Top,
        producer: None,
    };

    pub fn same_shape(&self, other: &StackElement) -> bool {
        self.ty.same_shape(&other.ty)
    }
}

impl Width for StackElement {
    fn width(&self) -> usize {
        self.ty.width()
    }
}

impl Display for StackElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        self.ty.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reference_shapes() {
        let string = StackElementType::Reference(RefType::Object(BinaryName::STRING));
        let object = StackElementType::Reference(RefType::Object(BinaryName::OBJECT));
        let fresh = |site| StackElementType::Uninitialized {
            class: BinaryName::OBJECT,
            site: InstructionId(site),
        };

        assert!(string.same_shape(&object));
        assert!(StackElementType::Null.same_shape(&string));
        assert!(StackElementType::ObjectRef.same_shape(&StackElementType::Null));
        assert!(!string.same_shape(&StackElementType::Integer));
        assert!(fresh(3).same_shape(&fresh(3)));
        assert!(!fresh(3).same_shape(&fresh(4)));
        assert!(!fresh(3).same_shape(&object));
        assert!(!StackElementType::UninitializedThis.same_shape(&object));
    }

    #[test]
    fn computational_types() {
        assert_eq!(
            StackElementType::from(FieldType::<BinaryName>::boolean()),
            StackElementType::Integer
        );
        assert_eq!(StackElementType::from(FieldType::<BinaryName>::long()).width(), 2);
        assert_eq!(Primitive::from(BaseType::Char), Primitive::Integer);
    }
}

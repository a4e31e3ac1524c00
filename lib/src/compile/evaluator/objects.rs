use super::{InstructionKind, SymbolicInstruction};
use crate::compile::{Error, InstructionNode};
use crate::jvm::bytecode::{ArrayKind, CodeInstruction, Instruction, InvokeType};
use crate::jvm::verifier::{ExpectedElement, FrameDifference, FrameDifferenceBuilder, Primitive};
use crate::jvm::{
    BaseType, BinaryName, Constant, FieldRef, FieldType, MethodDescriptor, MethodRef, Name,
    ParseDescriptor, RefType, UnqualifiedName,
};
use std::fmt::Display;

pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    let plain = |insn| Some(InstructionKind::Plain(CodeInstruction::Simple(insn)));
    match mnemonic {
        "getstatic" => Some(InstructionKind::Field(Instruction::GetStatic(()))),
        "putstatic" => Some(InstructionKind::Field(Instruction::PutStatic(()))),
        "getfield" => Some(InstructionKind::Field(Instruction::GetField(()))),
        "putfield" => Some(InstructionKind::Field(Instruction::PutField(()))),
        "invokevirtual" => Some(InstructionKind::Invoke(InvokeType::Virtual)),
        "invokespecial" => Some(InstructionKind::Invoke(InvokeType::Special)),
        "invokestatic" => Some(InstructionKind::Invoke(InvokeType::Static)),
        "invokeinterface" => Some(InstructionKind::Invoke(InvokeType::Interface(0))),
        "new" => Some(InstructionKind::Class(Instruction::New(()))),
        "anewarray" => Some(InstructionKind::Class(Instruction::ANewArray(()))),
        "checkcast" => Some(InstructionKind::Class(Instruction::CheckCast(()))),
        "instanceof" => Some(InstructionKind::Class(Instruction::InstanceOf(()))),
        "newarray" => Some(InstructionKind::NewArray),
        "multianewarray" => Some(InstructionKind::MultiANewArray),
        "arraylength" => plain(Instruction::ArrayLength),
        "monitorenter" => plain(Instruction::MonitorEnter),
        "monitorexit" => plain(Instruction::MonitorExit),
        _ => {
            let mut chars = mnemonic.chars();
            let kind = match chars.next()? {
                'i' => ArrayKind::Int,
                'l' => ArrayKind::Long,
                'f' => ArrayKind::Float,
                'd' => ArrayKind::Double,
                'a' => ArrayKind::Reference,
                'b' => ArrayKind::Byte,
                'c' => ArrayKind::Char,
                's' => ArrayKind::Short,
                _ => return None,
            };
            match chars.as_str() {
                "aload" => plain(Instruction::ArrayLoad(kind)),
                "astore" => plain(Instruction::ArrayStore(kind)),
                _ => None,
            }
        }
    }
}

fn bad_descriptor(node: &InstructionNode, descriptor: &str, err: impl Display) -> Error {
    Error::BadDescriptor {
        position: node.position,
        descriptor: descriptor.to_owned(),
        message: err.to_string(),
    }
}

/// Class name, or array descriptor
pub fn parse_class(node: &InstructionNode, name: &str) -> Result<RefType<BinaryName>, Error> {
    RefType::from_class_name(name).map_err(|err| bad_descriptor(node, name, err))
}

fn parse_member_name(node: &InstructionNode, name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name.to_owned()).map_err(|err| bad_descriptor(node, name, err))
}

pub fn evaluate_field(
    node: &InstructionNode,
    template: &Instruction<()>,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let member = node.member(0)?;
    let field = FieldRef {
        class: BinaryName::from_string(member.owner.clone())
            .map_err(|err| bad_descriptor(node, &member.owner, err))?,
        name: parse_member_name(node, &member.name)?,
        descriptor: FieldType::parse(&member.descriptor)
            .map_err(|err| bad_descriptor(node, &member.descriptor, err))?,
    };
    let constant = Constant::Field(field);
    let instruction = template.map_constant(|_| Ok::<_, Error>(constant.clone()))?;
    Ok(CodeInstruction::Simple(instruction))
}

pub fn evaluate_invoke(
    node: &InstructionNode,
    invoke_type: InvokeType,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let member = node.member(0)?;
    let class = parse_class(node, &member.owner)?;
    let name = parse_member_name(node, &member.name)?;
    let descriptor = MethodDescriptor::parse(&member.descriptor)
        .map_err(|err| bad_descriptor(node, &member.descriptor, err))?;

    if name == UnqualifiedName::CLINIT {
        return Err(node.illegal("class initializers cannot be invoked"));
    }
    if name.is_init() {
        if invoke_type != InvokeType::Special {
            return Err(node.illegal("instance initializers are only called with invokespecial"));
        }
        if descriptor.return_type.is_some() {
            return Err(node.illegal("instance initializers must return void"));
        }
    }

    let invoke_type = match invoke_type {
        InvokeType::Interface(_) => {
            let count = descriptor.parameter_length(true);
            let count = u8::try_from(count)
                .map_err(|_| node.illegal(format!("{} argument slots is too many", count)))?;
            InvokeType::Interface(count)
        }
        other => other,
    };
    let method = MethodRef {
        class,
        name,
        descriptor,
        is_interface: matches!(invoke_type, InvokeType::Interface(_)),
    };
    Ok(CodeInstruction::Simple(Instruction::Invoke(
        invoke_type,
        Constant::Method(method),
    )))
}

pub fn evaluate_class(
    node: &InstructionNode,
    template: &Instruction<()>,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let class = parse_class(node, node.type_name(0)?)?;
    if matches!(template, Instruction::New(_)) && !matches!(class, RefType::Object(_)) {
        return Err(node.illegal("arrays are created with newarray, anewarray, or multianewarray"));
    }
    let constant = Constant::Class(class);
    let instruction = template.map_constant(|_| Ok::<_, Error>(constant.clone()))?;
    Ok(CodeInstruction::Simple(instruction))
}

pub fn evaluate_newarray(node: &InstructionNode) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let element_type = match node.type_name(0)? {
        "boolean" | "Z" => BaseType::Boolean,
        "char" | "C" => BaseType::Char,
        "float" | "F" => BaseType::Float,
        "double" | "D" => BaseType::Double,
        "byte" | "B" => BaseType::Byte,
        "short" | "S" => BaseType::Short,
        "int" | "I" => BaseType::Int,
        "long" | "J" => BaseType::Long,
        other => {
            return Err(node.illegal(format!("'{}' is not a primitive element type", other)))
        }
    };
    Ok(CodeInstruction::Simple(Instruction::NewArray(element_type)))
}

pub fn evaluate_multianewarray(node: &InstructionNode) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(2)?;
    let class = parse_class(node, node.type_name(0)?)?;
    let dimensions: u8 = node.integer(1, "dimension count")?;
    if dimensions == 0 || dimensions as usize > class.dimensions() {
        return Err(node.illegal(format!(
            "cannot create {} dimension(s) of a {} dimension array",
            dimensions,
            class.dimensions()
        )));
    }
    Ok(CodeInstruction::Simple(Instruction::MultiANewArray(
        Constant::Class(class),
        dimensions,
    )))
}

/// Expectation on a value of a field or parameter type
fn expected(field_type: &FieldType<BinaryName>) -> ExpectedElement {
    match field_type {
        FieldType::Base(base_type) => ExpectedElement::Primitive(Primitive::from(*base_type)),
        FieldType::Ref(_) => ExpectedElement::ObjectRef,
    }
}

fn push_value(builder: FrameDifferenceBuilder, field_type: &FieldType<BinaryName>) -> FrameDifferenceBuilder {
    match field_type {
        FieldType::Base(base_type) => builder.push_primitive(Primitive::from(*base_type)),
        FieldType::Ref(ref_type) => builder.push_reference(ref_type.clone()),
    }
}

fn array_element(kind: ArrayKind) -> Option<Primitive> {
    match kind {
        ArrayKind::Int | ArrayKind::Byte | ArrayKind::Char | ArrayKind::Short => {
            Some(Primitive::Integer)
        }
        ArrayKind::Long => Some(Primitive::Long),
        ArrayKind::Float => Some(Primitive::Float),
        ArrayKind::Double => Some(Primitive::Double),
        ArrayKind::Reference => None,
    }
}

pub fn array_load(kind: ArrayKind) -> FrameDifference {
    let builder = FrameDifference::builder()
        .pop_primitive(Primitive::Integer)
        .pop_object_ref();
    match array_element(kind) {
        Some(primitive) => builder.push_primitive(primitive),
        None => builder.push_object_ref(),
    }
    .build()
}

pub fn array_store(kind: ArrayKind) -> FrameDifference {
    let builder = FrameDifference::builder();
    match array_element(kind) {
        Some(primitive) => builder.pop_primitive(primitive),
        None => builder.pop_object_ref(),
    }
    .pop_primitive(Primitive::Integer)
    .pop_object_ref()
    .build()
}

/// Field access
///
/// Field instructions are only ever evaluated with a field constant. Fields can be written on an
/// uninitialized `this` (constructors set their fields before calling the superclass
/// constructor).
pub fn field(insn: &Instruction<Constant>, constant: &Constant) -> FrameDifference {
    let field = match constant {
        Constant::Field(field) => field,
        _ => return FrameDifference::same(),
    };
    let builder = FrameDifference::builder();
    match insn {
        Instruction::GetStatic(_) => push_value(builder, &field.descriptor),
        Instruction::PutStatic(_) => builder.pop(expected(&field.descriptor)),
        Instruction::GetField(_) => push_value(builder.pop_object_ref(), &field.descriptor),
        Instruction::PutField(_) => builder.pop(expected(&field.descriptor)).pop_any_reference(),
        _ => builder,
    }
    .build()
}

/// Method invocation
///
/// Arguments are popped last one first, then the receiver. Calling `<init>` consumes an
/// uninitialized receiver and initializes every other copy of it.
pub fn invoke(invoke_type: InvokeType, constant: &Constant) -> FrameDifference {
    let method = match constant {
        Constant::Method(method) => method,
        _ => return FrameDifference::same(),
    };
    let mut builder = FrameDifference::builder();
    for parameter in method.descriptor.parameters.iter().rev() {
        builder = builder.pop(expected(parameter));
    }
    builder = match invoke_type {
        InvokeType::Static => builder,
        InvokeType::Special if method.name.is_init() => builder
            .pop(ExpectedElement::Uninitialized)
            .initialize(method.descriptor.parameters.len()),
        _ => builder.pop_object_ref(),
    };
    if let Some(return_type) = &method.descriptor.return_type {
        builder = push_value(builder, return_type);
    }
    builder.build()
}

pub fn new(constant: &Constant) -> FrameDifference {
    match constant {
        Constant::Class(RefType::Object(class)) => FrameDifference::builder()
            .push_uninitialized(class.clone())
            .build(),
        _ => FrameDifference::same(),
    }
}

pub fn new_array(element_type: BaseType) -> FrameDifference {
    FrameDifference::builder()
        .pop_primitive(Primitive::Integer)
        .push_reference(RefType::array(FieldType::Base(element_type)))
        .build()
}

pub fn anewarray(constant: &Constant) -> FrameDifference {
    let builder = FrameDifference::builder().pop_primitive(Primitive::Integer);
    match constant {
        Constant::Class(class) => builder.push_reference(RefType::array(FieldType::Ref(class.clone()))),
        _ => builder.push_object_ref(),
    }
    .build()
}

pub fn multianewarray(constant: &Constant, dimensions: u8) -> FrameDifference {
    let mut builder = FrameDifference::builder();
    for _ in 0..dimensions {
        builder = builder.pop_primitive(Primitive::Integer);
    }
    match constant {
        Constant::Class(class) => builder.push_reference(class.clone()),
        _ => builder.push_object_ref(),
    }
    .build()
}

pub fn array_length() -> FrameDifference {
    FrameDifference::builder()
        .pop_object_ref()
        .push_primitive(Primitive::Integer)
        .build()
}

pub fn checkcast(constant: &Constant) -> FrameDifference {
    let builder = FrameDifference::builder().pop_object_ref();
    match constant {
        Constant::Class(class) => builder.push_reference(class.clone()),
        _ => builder.push_object_ref(),
    }
    .build()
}

pub fn instanceof() -> FrameDifference {
    FrameDifference::builder()
        .pop_object_ref()
        .push_primitive(Primitive::Integer)
        .build()
}

pub fn monitor() -> FrameDifference {
    FrameDifference::builder().pop_object_ref().build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::evaluator::frame_difference;
    use crate::compile::evaluator::test::Fixture;
    use crate::compile::{MemberReference, Operand};

    fn member(owner: &str, name: &str, descriptor: &str) -> Operand {
        Operand::Member(MemberReference {
            owner: owner.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        })
    }

    #[test]
    fn array_mnemonics() {
        let plain = |mnemonic| match lookup(mnemonic) {
            Some(InstructionKind::Plain(CodeInstruction::Simple(insn))) => Some(insn),
            _ => None,
        };
        assert_eq!(plain("baload"), Some(Instruction::ArrayLoad(ArrayKind::Byte)));
        assert_eq!(plain("aastore"), Some(Instruction::ArrayStore(ArrayKind::Reference)));
        assert_eq!(plain("castore"), Some(Instruction::ArrayStore(ArrayKind::Char)));
        assert_eq!(plain("xaload"), None);
        assert_eq!(plain("load"), None);
    }

    #[test]
    fn invocations() {
        let mut fixture = Fixture::new(None);

        let interface = fixture
            .evaluate(
                InstructionNode::new("invokeinterface")
                    .with(member("java/util/List", "add", "(ILjava/lang/Object;)V")),
            )
            .unwrap();
        assert_eq!(interface.size, 5);
        match &interface.instruction {
            CodeInstruction::Simple(Instruction::Invoke(InvokeType::Interface(count), _)) => {
                assert_eq!(*count, 3)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(frame_difference(&interface.instruction).slot_delta(), -3);

        let stat = fixture
            .evaluate(
                InstructionNode::new("invokestatic")
                    .with(member("java/lang/Math", "max", "(JJ)J")),
            )
            .unwrap();
        assert_eq!(frame_difference(&stat.instruction).slot_delta(), -2);

        assert!(matches!(
            fixture.evaluate(
                InstructionNode::new("invokevirtual").with(member("java/lang/Object", "<init>", "()V"))
            ),
            Err(Error::IllegalInstruction { .. })
        ));
        assert!(matches!(
            fixture.evaluate(
                InstructionNode::new("invokevirtual").with(member("java/lang/Object", "hashCode", "()"))
            ),
            Err(Error::BadDescriptor { .. })
        ));
    }

    #[test]
    fn initialization() {
        let difference = invoke(
            InvokeType::Special,
            &Constant::Method(MethodRef {
                class: RefType::Object(BinaryName::OBJECT),
                name: UnqualifiedName::INIT,
                descriptor: MethodDescriptor {
                    parameters: vec![FieldType::int()],
                    return_type: None,
                },
                is_interface: false,
            }),
        );
        let expected = FrameDifference::builder()
            .pop_primitive(Primitive::Integer)
            .pop(ExpectedElement::Uninitialized)
            .initialize(1)
            .build();
        assert_eq!(difference, expected);
    }

    #[test]
    fn object_creation() {
        let mut fixture = Fixture::new(None);
        let class = |mnemonic: &str, name: &str| {
            InstructionNode::new(mnemonic).with(Operand::Type(name.to_owned()))
        };

        assert_eq!(fixture.evaluate(class("new", "java/lang/StringBuilder")).unwrap().size, 3);
        assert!(fixture.evaluate(class("new", "[I")).is_err());
        assert_eq!(fixture.evaluate(class("newarray", "boolean")).unwrap().size, 2);
        assert!(fixture.evaluate(class("newarray", "java/lang/String")).is_err());

        let multi = |name: &str, dims| class("multianewarray", name).with(Operand::Number(dims));
        let created = fixture.evaluate(multi("[[[I", 2)).unwrap();
        assert_eq!(created.size, 4);
        assert_eq!(frame_difference(&created.instruction).slot_delta(), -1);
        assert!(fixture.evaluate(multi("[[[I", 4)).is_err());
        assert!(fixture.evaluate(multi("[I", 0)).is_err());

        let getfield = fixture
            .evaluate(
                InstructionNode::new("getfield").with(member("java/awt/Point", "x", "J")),
            )
            .unwrap();
        assert_eq!(frame_difference(&getfield.instruction).slot_delta(), 1);
    }
}

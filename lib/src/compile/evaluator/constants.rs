use super::{InstructionKind, SymbolicInstruction};
use crate::compile::{Error, InstructionNode, Operand};
use crate::jvm::bytecode::{CodeInstruction, Instruction};
use crate::jvm::verifier::{FrameDifference, Primitive};
use crate::jvm::{BinaryName, Constant, RefType};

/// Which of the three `ldc` instructions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LdcForm {
    /// `ldc`: one byte index
    Narrow,

    /// `ldc_w`: two byte index
    Wide,

    /// `ldc2_w`: `long` and `double` constants
    Double,
}

pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    let plain = |insn| Some(InstructionKind::Plain(CodeInstruction::Simple(insn)));
    match mnemonic {
        "nop" => plain(Instruction::Nop),
        "aconst_null" => plain(Instruction::AConstNull),
        "iconst_m1" => plain(Instruction::IConst(-1)),
        "bipush" => Some(InstructionKind::BiPush),
        "sipush" => Some(InstructionKind::SiPush),
        "ldc" => Some(InstructionKind::Ldc(LdcForm::Narrow)),
        "ldc_w" => Some(InstructionKind::Ldc(LdcForm::Wide)),
        "ldc2_w" => Some(InstructionKind::Ldc(LdcForm::Double)),
        _ => {
            let (prefix, n) = mnemonic.split_once("const_")?;
            let n: u8 = n.parse().ok()?;
            match (prefix, n) {
                ("i", 0..=5) => plain(Instruction::IConst(n as i8)),
                ("l", 0..=1) => plain(Instruction::LConst(n)),
                ("f", 0..=2) => plain(Instruction::FConst(n)),
                ("d", 0..=1) => plain(Instruction::DConst(n)),
                _ => None,
            }
        }
    }
}

pub fn evaluate_bipush(node: &InstructionNode) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let value: i8 = node.integer(0, "byte value")?;
    Ok(CodeInstruction::Simple(Instruction::BiPush(value)))
}

pub fn evaluate_sipush(node: &InstructionNode) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let value: i16 = node.integer(0, "short value")?;
    Ok(CodeInstruction::Simple(Instruction::SiPush(value)))
}

/// Loadable constant
///
/// The form decides between `int`/`float` and `long`/`double` for numeric literals. Whether a
/// narrow `ldc` can actually address the constant is only known once the constant pool is built.
pub fn evaluate_ldc(node: &InstructionNode, form: LdcForm) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let constant = match (node.operand(0)?, form) {
        (Operand::Number(number), LdcForm::Double) => Constant::Long(*number),
        (Operand::Decimal(decimal), LdcForm::Double) => Constant::Double(*decimal),
        (Operand::Number(_), _) => Constant::Integer(node.integer(0, "int constant")?),
        (Operand::Decimal(decimal), _) => Constant::Float(*decimal as f32),
        (Operand::Text(text), LdcForm::Narrow | LdcForm::Wide) => Constant::String(text.clone()),
        (Operand::Type(name), LdcForm::Narrow | LdcForm::Wide) => {
            Constant::Class(super::objects::parse_class(node, name)?)
        }
        _ => {
            return Err(node.illegal(match form {
                LdcForm::Double => "expected a long or double constant",
                _ => "expected an int, float, string, or class constant",
            }))
        }
    };
    let instruction = match form {
        LdcForm::Narrow => Instruction::Ldc(constant),
        LdcForm::Wide => Instruction::LdcW(constant),
        LdcForm::Double => Instruction::Ldc2W(constant),
    };
    Ok(CodeInstruction::Simple(instruction))
}

pub fn push(primitive: Primitive) -> FrameDifference {
    FrameDifference::builder().push_primitive(primitive).build()
}

pub fn ldc(constant: &Constant) -> FrameDifference {
    let builder = FrameDifference::builder();
    match constant {
        Constant::Integer(_) => builder.push_primitive(Primitive::Integer),
        Constant::Float(_) => builder.push_primitive(Primitive::Float),
        Constant::Long(_) => builder.push_primitive(Primitive::Long),
        Constant::Double(_) => builder.push_primitive(Primitive::Double),
        Constant::String(_) => builder.push_reference(RefType::Object(BinaryName::STRING)),
        Constant::Class(_) => builder.push_reference(RefType::Object(BinaryName::CLASS)),
        Constant::Field(_) | Constant::Method(_) => builder.push_object_ref(),
    }
    .build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::evaluator::test::Fixture;

    #[test]
    fn immediate_ranges() {
        let mut fixture = Fixture::new(None);
        let bipush = |n| InstructionNode::new("bipush").with(Operand::Number(n));
        let sipush = |n| InstructionNode::new("sipush").with(Operand::Number(n));

        assert_eq!(fixture.evaluate(bipush(-128)).unwrap().size, 2);
        assert!(matches!(fixture.evaluate(bipush(128)), Err(Error::IllegalInstruction { .. })));
        assert_eq!(fixture.evaluate(sipush(-32768)).unwrap().size, 3);
        assert!(matches!(fixture.evaluate(sipush(40000)), Err(Error::IllegalInstruction { .. })));
    }

    #[test]
    fn constant_forms() {
        let mut fixture = Fixture::new(None);
        let ldc = |mnemonic: &str, operand| InstructionNode::new(mnemonic).with(operand);

        let long = fixture.evaluate(ldc("ldc2_w", Operand::Number(1 << 40))).unwrap();
        assert_eq!(long.instruction, CodeInstruction::Simple(Instruction::Ldc2W(Constant::Long(1 << 40))));
        assert_eq!(long.size, 3);

        let text = fixture.evaluate(ldc("ldc", Operand::Text(String::from("hi")))).unwrap();
        assert_eq!(text.size, 2);
        assert_eq!(super::super::frame_difference(&text.instruction).slot_delta(), 1);

        assert!(fixture.evaluate(ldc("ldc", Operand::Number(1 << 40))).is_err());
        assert!(fixture.evaluate(ldc("ldc2_w", Operand::Text(String::from("hi")))).is_err());
        assert!(matches!(
            fixture.evaluate(ldc("ldc_w", Operand::Type(String::from("not a.class")))),
            Err(Error::BadDescriptor { .. })
        ));
    }
}

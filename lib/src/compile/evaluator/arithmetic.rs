use super::InstructionKind;
use crate::jvm::bytecode::{
    ArithmeticOp, BitwiseOp, CodeInstruction, CompareMode, Instruction, NumericKind, ShiftType,
};
use crate::jvm::verifier::{FrameDifference, Primitive};

fn numeric_kind(prefix: char) -> Option<NumericKind> {
    match prefix {
        'i' => Some(NumericKind::Int),
        'l' => Some(NumericKind::Long),
        'f' => Some(NumericKind::Float),
        'd' => Some(NumericKind::Double),
        _ => None,
    }
}

fn primitive(kind: NumericKind) -> Primitive {
    match kind {
        NumericKind::Int => Primitive::Integer,
        NumericKind::Long => Primitive::Long,
        NumericKind::Float => Primitive::Float,
        NumericKind::Double => Primitive::Double,
    }
}

pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    let instruction = match mnemonic {
        "i2b" => Instruction::I2B,
        "i2c" => Instruction::I2C,
        "i2s" => Instruction::I2S,
        "lcmp" => Instruction::LCmp,

        // NaN ordering is only visible in the mnemonic
        "fcmpl" => Instruction::FCmp(CompareMode::L),
        "fcmpg" => Instruction::FCmp(CompareMode::G),
        "dcmpl" => Instruction::DCmp(CompareMode::L),
        "dcmpg" => Instruction::DCmp(CompareMode::G),

        _ => {
            let mut chars = mnemonic.chars();
            let kind = numeric_kind(chars.next()?)?;
            let integral = matches!(kind, NumericKind::Int | NumericKind::Long);
            match chars.as_str() {
                "add" => Instruction::Arithmetic(kind, ArithmeticOp::Add),
                "sub" => Instruction::Arithmetic(kind, ArithmeticOp::Sub),
                "mul" => Instruction::Arithmetic(kind, ArithmeticOp::Mul),
                "div" => Instruction::Arithmetic(kind, ArithmeticOp::Div),
                "rem" => Instruction::Arithmetic(kind, ArithmeticOp::Rem),
                "neg" => Instruction::Neg(kind),
                "shl" if integral => Instruction::Shift(kind, ShiftType::Left),
                "shr" if integral => Instruction::Shift(kind, ShiftType::ArithmeticRight),
                "ushr" if integral => Instruction::Shift(kind, ShiftType::LogicalRight),
                "and" if integral => Instruction::Bitwise(kind, BitwiseOp::And),
                "or" if integral => Instruction::Bitwise(kind, BitwiseOp::Or),
                "xor" if integral => Instruction::Bitwise(kind, BitwiseOp::Xor),
                conversion => {
                    let target = conversion.strip_prefix('2')?;
                    let mut target_chars = target.chars();
                    let to = numeric_kind(target_chars.next()?)?;
                    if !target_chars.as_str().is_empty() || to == kind {
                        return None;
                    }
                    Instruction::Convert(kind, to)
                }
            }
        }
    };
    Some(InstructionKind::Plain(CodeInstruction::Simple(instruction)))
}

/// Two operands of the same kind in, one result of that kind out
pub fn binary(kind: NumericKind) -> FrameDifference {
    FrameDifference::builder()
        .pop_primitive(primitive(kind))
        .pop_primitive(primitive(kind))
        .push_primitive(primitive(kind))
        .build()
}

/// Shift amount is always an `int`
pub fn shift(kind: NumericKind) -> FrameDifference {
    FrameDifference::builder()
        .pop_primitive(Primitive::Integer)
        .pop_primitive(primitive(kind))
        .push_primitive(primitive(kind))
        .build()
}

pub fn convert(from: NumericKind, to: NumericKind) -> FrameDifference {
    FrameDifference::builder()
        .pop_primitive(primitive(from))
        .push_primitive(primitive(to))
        .build()
}

pub fn compare(kind: NumericKind) -> FrameDifference {
    FrameDifference::builder()
        .pop_primitive(primitive(kind))
        .pop_primitive(primitive(kind))
        .push_primitive(Primitive::Integer)
        .build()
}

#[cfg(test)]
mod test {
    use super::*;

    fn simple(mnemonic: &str) -> Option<Instruction<crate::jvm::Constant>> {
        match lookup(mnemonic)? {
            InstructionKind::Plain(CodeInstruction::Simple(insn)) => Some(insn),
            _ => None,
        }
    }

    #[test]
    fn mnemonics() {
        assert_eq!(simple("lushr"), Some(Instruction::Shift(NumericKind::Long, ShiftType::LogicalRight)));
        assert_eq!(simple("fshl"), None);
        assert_eq!(simple("dxor"), None);
        assert_eq!(simple("f2l"), Some(Instruction::Convert(NumericKind::Float, NumericKind::Long)));
        assert_eq!(simple("i2i"), None);
        assert_eq!(simple("i2lx"), None);
        assert_eq!(simple("fcmpg"), Some(Instruction::FCmp(CompareMode::G)));
        assert_eq!(simple("fcmpl"), Some(Instruction::FCmp(CompareMode::L)));
        assert_eq!(simple("fcmp"), None);
        assert_eq!(simple("irem"), Some(Instruction::Arithmetic(NumericKind::Int, ArithmeticOp::Rem)));
    }
}

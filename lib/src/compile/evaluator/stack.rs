use super::InstructionKind;
use crate::jvm::bytecode::{CodeInstruction, Instruction};
use crate::jvm::verifier::FrameDifference;

pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    let instruction = match mnemonic {
        "pop" => Instruction::Pop,
        "pop2" => Instruction::Pop2,
        "dup" => Instruction::Dup,
        "dup_x1" => Instruction::DupX1,
        "dup_x2" => Instruction::DupX2,
        "dup2" => Instruction::Dup2,
        "dup2_x1" => Instruction::Dup2X1,
        "dup2_x2" => Instruction::Dup2X2,
        "swap" => Instruction::Swap,
        _ => return None,
    };
    Some(InstructionKind::Plain(CodeInstruction::Simple(instruction)))
}

/// Discard `slots` slots of values
pub fn pop(slots: usize) -> FrameDifference {
    FrameDifference::builder().pop_slots(slots).build()
}

/// Duplicate the top `slots` slots of values, inserting the copy below the next `under` slots
///
/// The values are moved around whole: a `long` or `double` is never split.
pub fn dup(slots: usize, under: usize) -> FrameDifference {
    let builder = FrameDifference::builder().pop_slots(slots);
    if under == 0 {
        builder.push_popped(0).push_popped(0).build()
    } else {
        builder
            .pop_slots(under)
            .push_popped(0)
            .push_popped(1)
            .push_popped(0)
            .build()
    }
}

pub fn swap() -> FrameDifference {
    FrameDifference::builder()
        .pop_slots(1)
        .pop_slots(1)
        .push_popped(0)
        .push_popped(1)
        .build()
}

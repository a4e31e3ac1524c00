use super::{LabelId, SourcePosition};
use crate::jvm::verifier::{ExpectedElement, Frame, FrameMismatch, InstructionId, StackElementType};
use crate::jvm::{BinaryName, ConstantPoolOverflow, ReturnType};
use std::fmt::{Display, Error as FmtError, Formatter};

/// Everything that can go wrong while compiling a method
///
/// Each failure is fatal for the method it happens in. Variants carry enough information to point
/// at the source of the problem: the instruction (as a position in the method body), its source
/// position, and the types involved.
#[derive(Debug)]
pub enum Error {
    /// An instruction needs to pop from an empty stack
    StackUnderflow {
        instruction: InstructionId,
        position: SourcePosition,
        mnemonic: String,
        expected: ExpectedElement,
    },

    /// The value on top of the stack does not have the shape an instruction expects
    StackElementMismatch {
        instruction: InstructionId,
        position: SourcePosition,
        mnemonic: String,

        /// Instruction that pushed the offending value (`None` for parameters)
        producer: Option<InstructionId>,
        expected: ExpectedElement,
        actual: StackElementType,
    },

    /// Two paths reach a label with stacks of different depths
    StackSizeDifferent {
        label: LabelId,
        name: String,
        position: SourcePosition,
        expected: Frame,
        actual: Frame,
    },

    /// Two paths reach a label with stacks or locals of different shapes
    PropagationMismatch {
        label: LabelId,
        name: String,
        position: SourcePosition,
        expected: Frame,
        actual: Frame,
        mismatch: FrameMismatch,
    },

    /// A branch targets a label that does not exist
    ///
    /// `label` is `None` when the name was never declared. It is set when the label was declared
    /// but there is no instruction after it to jump to.
    UnknownJump {
        instruction: InstructionId,
        position: SourcePosition,
        target: String,
        label: Option<LabelId>,
    },

    /// Operands that cannot be encoded (or are just malformed)
    IllegalInstruction {
        position: SourcePosition,
        mnemonic: String,
        message: String,
    },

    /// A return instruction does not match the declared return type of the method
    ReturnTypeMismatch {
        position: SourcePosition,
        expected: ReturnType<BinaryName>,
        actual: ReturnType<BinaryName>,
    },

    UnknownLocalVariable {
        position: SourcePosition,
        reference: String,
        opcode: String,
    },

    /// A load reads a local slot holding the wrong kind of value (or nothing usable)
    LocalElementMismatch {
        instruction: InstructionId,
        position: SourcePosition,
        index: u16,
        expected: ExpectedElement,
        actual: StackElementType,
    },

    DuplicateLabel {
        name: String,
        position: SourcePosition,
    },

    /// Execution can continue past the last instruction
    FallOffEnd {
        instruction: Option<InstructionId>,
        position: SourcePosition,
    },

    BadDescriptor {
        position: SourcePosition,
        descriptor: String,
        message: String,
    },

    ConstantPoolOverflow(ConstantPoolOverflow),

    /// A branch offset or constant index does not fit in the encoding the source asked for
    BranchOutOfRange {
        instruction: InstructionId,
        position: SourcePosition,
        message: String,
    },

    IoError(std::io::Error),
}

impl Error {
    /// Source position of the failure, if it can be attributed to one
    pub fn position(&self) -> Option<SourcePosition> {
        match self {
            Error::StackUnderflow { position, .. }
            | Error::StackElementMismatch { position, .. }
            | Error::StackSizeDifferent { position, .. }
            | Error::PropagationMismatch { position, .. }
            | Error::UnknownJump { position, .. }
            | Error::IllegalInstruction { position, .. }
            | Error::ReturnTypeMismatch { position, .. }
            | Error::UnknownLocalVariable { position, .. }
            | Error::LocalElementMismatch { position, .. }
            | Error::DuplicateLabel { position, .. }
            | Error::FallOffEnd { position, .. }
            | Error::BadDescriptor { position, .. }
            | Error::BranchOutOfRange { position, .. } => Some(*position),
            Error::ConstantPoolOverflow(_) | Error::IoError(_) => None,
        }
    }

    /// Flatten the error for reporting
    pub fn diagnostic(&self) -> Diagnostic {
        let position = self.position().unwrap_or_default();
        Diagnostic {
            line: position.line,
            column: position.column,
            offset: position.offset,
            message: self.to_string(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Error::StackUnderflow {
                instruction,
                mnemonic,
                expected,
                ..
            } => write!(
                f,
                "stack underflow at {} ({}): expected {}",
                instruction, mnemonic, expected
            ),
            Error::StackElementMismatch {
                instruction,
                mnemonic,
                producer,
                expected,
                actual,
                ..
            } => {
                write!(
                    f,
                    "{} ({}) expected {} but found {}",
                    instruction, mnemonic, expected, actual
                )?;
                match producer {
                    Some(producer) => write!(f, " (pushed by {})", producer),
                    None => f.write_str(" (from the method parameters)"),
                }
            }
            Error::StackSizeDifferent {
                name,
                expected,
                actual,
                ..
            } => write!(
                f,
                "stack size differs at label '{}': expected {} but got {}",
                name, expected, actual
            ),
            Error::PropagationMismatch {
                name,
                expected,
                actual,
                mismatch,
                ..
            } => write!(
                f,
                "frames differ at label '{}' ({}): expected {} but got {}",
                name, mismatch, expected, actual
            ),
            Error::UnknownJump {
                instruction,
                target,
                label,
                ..
            } => match label {
                None => write!(f, "{} jumps to undeclared label '{}'", instruction, target),
                Some(_) => write!(
                    f,
                    "{} jumps to label '{}' which has no instruction after it",
                    instruction, target
                ),
            },
            Error::IllegalInstruction {
                mnemonic, message, ..
            } => write!(f, "illegal instruction '{}': {}", mnemonic, message),
            Error::ReturnTypeMismatch {
                expected, actual, ..
            } => write!(
                f,
                "return type mismatch: method returns {} but instruction returns {}",
                expected, actual
            ),
            Error::UnknownLocalVariable {
                reference, opcode, ..
            } => write!(f, "unknown local variable '{}' in '{}'", reference, opcode),
            Error::LocalElementMismatch {
                instruction,
                index,
                expected,
                actual,
                ..
            } => write!(
                f,
                "{} expected local {} to hold {} but found {}",
                instruction, index, expected, actual
            ),
            Error::DuplicateLabel { name, .. } => write!(f, "label '{}' is already declared", name),
            Error::FallOffEnd { .. } => f.write_str("execution can fall off the end of the code"),
            Error::BadDescriptor {
                descriptor,
                message,
                ..
            } => write!(f, "bad descriptor '{}': {}", descriptor, message),
            Error::ConstantPoolOverflow(overflow) => write!(
                f,
                "constant pool overflow at offset {} adding {:?}",
                overflow.offset, overflow.entry
            ),
            Error::BranchOutOfRange {
                instruction,
                message,
                ..
            } => write!(f, "{} cannot be encoded: {}", instruction, message),
            Error::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(err: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

/// Error flattened into what a driver prints
///
/// Position fields are zero when the error has no source position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

use super::Error;
use std::convert::TryFrom;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Where something is in the source listing
///
/// Lines and columns start at 1. The all-zero position is used when nothing better is known.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,

    /// Byte offset from the start of the file
    pub offset: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize, offset: usize) -> SourcePosition {
        SourcePosition {
            line,
            column,
            offset,
        }
    }
}

impl Display for SourcePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reference to a local variable, either by slot or by name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocalReference {
    Index(u16),
    Name(String),
}

impl Display for LocalReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            LocalReference::Index(index) => write!(f, "{}", index),
            LocalReference::Name(name) => f.write_str(name),
        }
    }
}

/// Field or method, written `owner.name:descriptor`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberReference {
    /// Class name (or array descriptor, for methods like `clone`)
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// Operand of an instruction, as it appeared in the source
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Number(i64),
    Decimal(f64),

    /// Quoted string literal, already unescaped
    Text(String),

    Local(LocalReference),
    Label(String),

    /// Class name or type descriptor
    Type(String),

    Member(MemberReference),
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Operand::Number(_) => "number",
            Operand::Decimal(_) => "decimal",
            Operand::Text(_) => "string",
            Operand::Local(_) => "local variable",
            Operand::Label(_) => "label",
            Operand::Type(_) => "type",
            Operand::Member(_) => "member reference",
        }
    }
}

/// Inline declaration attached to a store, written `-> name:Type`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDeclaration {
    pub name: String,
    pub descriptor: Option<String>,
}

/// One instruction, as handed over by the parser
///
/// Operand accessors fail with [`Error::IllegalInstruction`] when the operand is missing or has
/// the wrong kind, so instruction kinds can use `?` without checking the shape themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionNode {
    /// Instruction name, as written (lowercase)
    pub mnemonic: String,
    pub operands: Vec<Operand>,

    /// Was this prefixed with `wide`?
    pub wide: bool,

    pub declaration: Option<LocalDeclaration>,
    pub position: SourcePosition,
}

impl InstructionNode {
    pub fn new(mnemonic: impl Into<String>) -> InstructionNode {
        InstructionNode {
            mnemonic: mnemonic.into(),
            operands: vec![],
            wide: false,
            declaration: None,
            position: SourcePosition::default(),
        }
    }

    pub fn with(mut self, operand: Operand) -> InstructionNode {
        self.operands.push(operand);
        self
    }

    pub fn with_wide(mut self) -> InstructionNode {
        self.wide = true;
        self
    }

    pub fn declaring(mut self, name: impl Into<String>, descriptor: Option<String>) -> InstructionNode {
        self.declaration = Some(LocalDeclaration {
            name: name.into(),
            descriptor,
        });
        self
    }

    pub fn at(mut self, position: SourcePosition) -> InstructionNode {
        self.position = position;
        self
    }

    /// Error attributed to this instruction
    pub fn illegal(&self, message: impl Into<String>) -> Error {
        Error::IllegalInstruction {
            position: self.position,
            mnemonic: self.mnemonic.clone(),
            message: message.into(),
        }
    }

    /// Check the number of operands
    pub fn expect_operands(&self, count: usize) -> Result<(), Error> {
        if self.operands.len() == count {
            Ok(())
        } else {
            Err(self.illegal(format!(
                "expected {} operand(s), found {}",
                count,
                self.operands.len()
            )))
        }
    }

    /// Reject a `wide` prefix on instructions that have no wide form
    pub fn reject_wide(&self) -> Result<(), Error> {
        if self.wide {
            Err(self.illegal("instruction has no wide form"))
        } else {
            Ok(())
        }
    }

    pub fn operand(&self, idx: usize) -> Result<&Operand, Error> {
        self.operands
            .get(idx)
            .ok_or_else(|| self.illegal(format!("missing operand {}", idx + 1)))
    }

    fn mismatched(&self, idx: usize, expected: &str, found: &Operand) -> Error {
        self.illegal(format!(
            "operand {} should be a {}, but is a {}",
            idx + 1,
            expected,
            found.kind()
        ))
    }

    pub fn number(&self, idx: usize) -> Result<i64, Error> {
        match self.operand(idx)? {
            Operand::Number(number) => Ok(*number),
            other => Err(self.mismatched(idx, "number", other)),
        }
    }

    /// Numeric operand which must fit in `T`
    pub fn integer<T: TryFrom<i64>>(&self, idx: usize, what: &str) -> Result<T, Error> {
        let number = self.number(idx)?;
        T::try_from(number)
            .map_err(|_| self.illegal(format!("{} {} is out of range", what, number)))
    }

    pub fn local(&self, idx: usize) -> Result<&LocalReference, Error> {
        match self.operand(idx)? {
            Operand::Local(local) => Ok(local),
            other => Err(self.mismatched(idx, "local variable", other)),
        }
    }

    pub fn label(&self, idx: usize) -> Result<&str, Error> {
        match self.operand(idx)? {
            Operand::Label(label) => Ok(label),
            other => Err(self.mismatched(idx, "label", other)),
        }
    }

    pub fn type_name(&self, idx: usize) -> Result<&str, Error> {
        match self.operand(idx)? {
            Operand::Type(name) => Ok(name),
            other => Err(self.mismatched(idx, "type", other)),
        }
    }

    pub fn member(&self, idx: usize) -> Result<&MemberReference, Error> {
        match self.operand(idx)? {
            Operand::Member(member) => Ok(member),
            other => Err(self.mismatched(idx, "member reference", other)),
        }
    }
}

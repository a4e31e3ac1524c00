//! This module contains the AST of JVM bytecode. The representation stays close to the source
//! assembly rather than to a minimal encoding:
//!
//!   - Local variable instructions remember which encoding the source asked for (the one-byte
//!     `xload_<n>` form, the regular form, or the `wide` form). The encoding is never silently
//!     promoted, since the size of every instruction must be known as soon as it is evaluated.
//!
//!   - Families of instructions (arithmetic, comparisons, shifts, invokes, ...) are grouped into
//!     one variant with a field. This keeps pattern matches over stack effects short.
//!
//!   - Branching instructions are kept separate from the rest since they are the only ones that
//!     mention labels and the only ones that end a block.
//!
//!   - `jsr`, `ret`, and `invokedynamic` are omitted.
//!

use super::{opcodes, BaseType, Serialize};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::{Error, ErrorKind, Result};
use std::ops::Not;

/// Non-branching JVM bytecode instruction
///
/// `Constant` is the representation of constant pool operands: symbolic constants while
/// compiling, constant pool indices once the method is resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction<Constant> {
    Nop,
    AConstNull,
    IConst(i8), // covers `iconst_m1` through `iconst_5`
    LConst(u8), // covers `lconst_0` and `lconst_1`
    FConst(u8), // covers `fconst_0` through `fconst_2`
    DConst(u8), // covers `dconst_0` and `dconst_1`
    BiPush(i8),
    SiPush(i16),
    Ldc(Constant),
    LdcW(Constant),
    Ldc2W(Constant),
    Load(ValueKind, u16, LocalForm), // covers `xload`, `xload_<n>`, and `wide xload`
    Store(ValueKind, u16, LocalForm), // covers `xstore`, `xstore_<n>`, and `wide xstore`
    IInc {
        index: u16,
        increment: i16,
        wide: bool,
    },
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Arithmetic(NumericKind, ArithmeticOp), // covers `xadd`, `xsub`, `xmul`, `xdiv`, `xrem`
    Neg(NumericKind),
    Shift(NumericKind, ShiftType), // only `Int` and `Long`
    Bitwise(NumericKind, BitwiseOp), // only `Int` and `Long`
    Convert(NumericKind, NumericKind), // covers `i2l`, `f2d`, ...
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(Constant),
    PutStatic(Constant),
    GetField(Constant),
    PutField(Constant),
    Invoke(InvokeType, Constant),
    New(Constant),
    NewArray(BaseType),
    ANewArray(Constant),
    MultiANewArray(Constant, u8),
    ArrayLength,
    CheckCast(Constant),
    InstanceOf(Constant),
    MonitorEnter,
    MonitorExit,
}

impl<C> Instruction<C> {
    /// Replace the constant operand (if there is one)
    pub fn map_constant<C2, E>(
        &self,
        mut map_constant: impl FnMut(&C) -> std::result::Result<C2, E>,
    ) -> std::result::Result<Instruction<C2>, E> {
        use Instruction::*;
        Ok(match self {
            Nop => Nop,
            AConstNull => AConstNull,
            IConst(n) => IConst(*n),
            LConst(n) => LConst(*n),
            FConst(n) => FConst(*n),
            DConst(n) => DConst(*n),
            BiPush(b) => BiPush(*b),
            SiPush(s) => SiPush(*s),
            Ldc(c) => Ldc(map_constant(c)?),
            LdcW(c) => LdcW(map_constant(c)?),
            Ldc2W(c) => Ldc2W(map_constant(c)?),
            Load(kind, idx, form) => Load(*kind, *idx, *form),
            Store(kind, idx, form) => Store(*kind, *idx, *form),
            IInc {
                index,
                increment,
                wide,
            } => IInc {
                index: *index,
                increment: *increment,
                wide: *wide,
            },
            ArrayLoad(kind) => ArrayLoad(*kind),
            ArrayStore(kind) => ArrayStore(*kind),
            Pop => Pop,
            Pop2 => Pop2,
            Dup => Dup,
            DupX1 => DupX1,
            DupX2 => DupX2,
            Dup2 => Dup2,
            Dup2X1 => Dup2X1,
            Dup2X2 => Dup2X2,
            Swap => Swap,
            Arithmetic(kind, op) => Arithmetic(*kind, *op),
            Neg(kind) => Neg(*kind),
            Shift(kind, typ) => Shift(*kind, *typ),
            Bitwise(kind, op) => Bitwise(*kind, *op),
            Convert(from, to) => Convert(*from, *to),
            I2B => I2B,
            I2C => I2C,
            I2S => I2S,
            LCmp => LCmp,
            FCmp(mode) => FCmp(*mode),
            DCmp(mode) => DCmp(*mode),
            GetStatic(c) => GetStatic(map_constant(c)?),
            PutStatic(c) => PutStatic(map_constant(c)?),
            GetField(c) => GetField(map_constant(c)?),
            PutField(c) => PutField(map_constant(c)?),
            Invoke(typ, c) => Invoke(*typ, map_constant(c)?),
            New(c) => New(map_constant(c)?),
            NewArray(bt) => NewArray(*bt),
            ANewArray(c) => ANewArray(map_constant(c)?),
            MultiANewArray(c, dims) => MultiANewArray(map_constant(c)?, *dims),
            ArrayLength => ArrayLength,
            CheckCast(c) => CheckCast(map_constant(c)?),
            InstanceOf(c) => InstanceOf(map_constant(c)?),
            MonitorEnter => MonitorEnter,
            MonitorExit => MonitorExit,
        })
    }
}

impl<C> Width for Instruction<C> {
    fn width(&self) -> usize {
        match self {
            Instruction::BiPush(_)
            | Instruction::Ldc(_)
            | Instruction::Load(_, _, LocalForm::Narrow)
            | Instruction::Store(_, _, LocalForm::Narrow)
            | Instruction::NewArray(_) => 2,

            Instruction::SiPush(_)
            | Instruction::LdcW(_)
            | Instruction::Ldc2W(_)
            | Instruction::IInc { wide: false, .. }
            | Instruction::GetStatic(_)
            | Instruction::PutStatic(_)
            | Instruction::GetField(_)
            | Instruction::PutField(_)
            | Instruction::Invoke(InvokeType::Special, _)
            | Instruction::Invoke(InvokeType::Static, _)
            | Instruction::Invoke(InvokeType::Virtual, _)
            | Instruction::New(_)
            | Instruction::ANewArray(_)
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_) => 3,

            Instruction::Load(_, _, LocalForm::Wide)
            | Instruction::Store(_, _, LocalForm::Wide)
            | Instruction::MultiANewArray(_, _) => 4,

            Instruction::Invoke(InvokeType::Interface(_), _) => 5,

            Instruction::IInc { wide: true, .. } => 6,

            _ => 1,
        }
    }
}

impl Serialize for Instruction<u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        /* The load/store instructions follow the same pattern:
         *
         *   - implicit form (0-3) has one opcode per index
         *   - narrow form (0-255) uses `iload` plus a byte operand
         *   - wide form (0-65535) uses `wide iload` plus two byte operands
         */
        fn serialize_local<W: WriteBytesExt>(
            idx: u16,
            form: LocalForm,
            implicit_start: u8,
            narrow: u8,
            writer: &mut W,
        ) -> Result<()> {
            match form {
                LocalForm::Implicit => match u8::try_from(idx) {
                    Ok(n @ 0..=3) => (implicit_start + n).serialize(writer),
                    _ => Err(out_of_range("implicit local index", idx as i64)),
                },
                LocalForm::Narrow => {
                    let idx = u8::try_from(idx)
                        .map_err(|_| out_of_range("narrow local index", idx as i64))?;
                    narrow.serialize(writer)?;
                    idx.serialize(writer)
                }
                LocalForm::Wide => {
                    opcodes::WIDE.serialize(writer)?;
                    narrow.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        fn with_index<W: WriteBytesExt>(opcode: u8, idx: u16, writer: &mut W) -> Result<()> {
            opcode.serialize(writer)?;
            idx.serialize(writer)
        }

        match self {
            Instruction::Nop => opcodes::NOP.serialize(writer),
            Instruction::AConstNull => opcodes::ACONST_NULL.serialize(writer),
            Instruction::IConst(n @ -1..=5) => ((opcodes::ICONST_0 as i8 + n) as u8).serialize(writer),
            Instruction::LConst(n @ 0..=1) => (opcodes::LCONST_0 + n).serialize(writer),
            Instruction::FConst(n @ 0..=2) => (opcodes::FCONST_0 + n).serialize(writer),
            Instruction::DConst(n @ 0..=1) => (opcodes::DCONST_0 + n).serialize(writer),
            Instruction::IConst(n) => Err(out_of_range("iconst", *n as i64)),
            Instruction::LConst(n) => Err(out_of_range("lconst", *n as i64)),
            Instruction::FConst(n) => Err(out_of_range("fconst", *n as i64)),
            Instruction::DConst(n) => Err(out_of_range("dconst", *n as i64)),
            Instruction::BiPush(b) => {
                opcodes::BIPUSH.serialize(writer)?;
                b.serialize(writer)
            }
            Instruction::SiPush(s) => {
                opcodes::SIPUSH.serialize(writer)?;
                s.serialize(writer)
            }
            Instruction::Ldc(idx) => {
                let idx = u8::try_from(*idx).map_err(|_| out_of_range("ldc index", *idx as i64))?;
                opcodes::LDC.serialize(writer)?;
                idx.serialize(writer)
            }
            Instruction::LdcW(idx) => with_index(opcodes::LDC_W, *idx, writer),
            Instruction::Ldc2W(idx) => with_index(opcodes::LDC2_W, *idx, writer),
            Instruction::Load(kind, idx, form) => {
                let (implicit, narrow) = match kind {
                    ValueKind::Int => (opcodes::ILOAD_0, opcodes::ILOAD),
                    ValueKind::Long => (opcodes::LLOAD_0, opcodes::LLOAD),
                    ValueKind::Float => (opcodes::FLOAD_0, opcodes::FLOAD),
                    ValueKind::Double => (opcodes::DLOAD_0, opcodes::DLOAD),
                    ValueKind::Reference => (opcodes::ALOAD_0, opcodes::ALOAD),
                };
                serialize_local(*idx, *form, implicit, narrow, writer)
            }
            Instruction::Store(kind, idx, form) => {
                let (implicit, narrow) = match kind {
                    ValueKind::Int => (opcodes::ISTORE_0, opcodes::ISTORE),
                    ValueKind::Long => (opcodes::LSTORE_0, opcodes::LSTORE),
                    ValueKind::Float => (opcodes::FSTORE_0, opcodes::FSTORE),
                    ValueKind::Double => (opcodes::DSTORE_0, opcodes::DSTORE),
                    ValueKind::Reference => (opcodes::ASTORE_0, opcodes::ASTORE),
                };
                serialize_local(*idx, *form, implicit, narrow, writer)
            }
            Instruction::IInc {
                index,
                increment,
                wide: false,
            } => {
                let index = u8::try_from(*index)
                    .map_err(|_| out_of_range("iinc index", *index as i64))?;
                let increment = i8::try_from(*increment)
                    .map_err(|_| out_of_range("iinc increment", *increment as i64))?;
                opcodes::IINC.serialize(writer)?;
                index.serialize(writer)?;
                increment.serialize(writer)
            }
            Instruction::IInc {
                index,
                increment,
                wide: true,
            } => {
                opcodes::WIDE.serialize(writer)?;
                opcodes::IINC.serialize(writer)?;
                index.serialize(writer)?;
                increment.serialize(writer)
            }
            Instruction::ArrayLoad(kind) => (opcodes::IALOAD + kind.opcode_offset()).serialize(writer),
            Instruction::ArrayStore(kind) => (opcodes::IASTORE + kind.opcode_offset()).serialize(writer),
            Instruction::Pop => opcodes::POP.serialize(writer),
            Instruction::Pop2 => opcodes::POP2.serialize(writer),
            Instruction::Dup => opcodes::DUP.serialize(writer),
            Instruction::DupX1 => opcodes::DUP_X1.serialize(writer),
            Instruction::DupX2 => opcodes::DUP_X2.serialize(writer),
            Instruction::Dup2 => opcodes::DUP2.serialize(writer),
            Instruction::Dup2X1 => opcodes::DUP2_X1.serialize(writer),
            Instruction::Dup2X2 => opcodes::DUP2_X2.serialize(writer),
            Instruction::Swap => opcodes::SWAP.serialize(writer),
            Instruction::Arithmetic(kind, op) => {
                let base = match op {
                    ArithmeticOp::Add => opcodes::IADD,
                    ArithmeticOp::Sub => opcodes::ISUB,
                    ArithmeticOp::Mul => opcodes::IMUL,
                    ArithmeticOp::Div => opcodes::IDIV,
                    ArithmeticOp::Rem => opcodes::IREM,
                };
                (base + kind.opcode_offset()).serialize(writer)
            }
            Instruction::Neg(kind) => (opcodes::INEG + kind.opcode_offset()).serialize(writer),
            Instruction::Shift(kind, typ) => {
                let base = match typ {
                    ShiftType::Left => opcodes::ISHL,
                    ShiftType::ArithmeticRight => opcodes::ISHR,
                    ShiftType::LogicalRight => opcodes::IUSHR,
                };
                (base + kind.integral_offset()?).serialize(writer)
            }
            Instruction::Bitwise(kind, op) => {
                let base = match op {
                    BitwiseOp::And => opcodes::IAND,
                    BitwiseOp::Or => opcodes::IOR,
                    BitwiseOp::Xor => opcodes::IXOR,
                };
                (base + kind.integral_offset()?).serialize(writer)
            }
            Instruction::Convert(from, to) => {
                let opcode = match (from, to) {
                    (NumericKind::Int, NumericKind::Long) => opcodes::I2L,
                    (NumericKind::Int, NumericKind::Float) => opcodes::I2F,
                    (NumericKind::Int, NumericKind::Double) => opcodes::I2D,
                    (NumericKind::Long, NumericKind::Int) => opcodes::L2I,
                    (NumericKind::Long, NumericKind::Float) => opcodes::L2F,
                    (NumericKind::Long, NumericKind::Double) => opcodes::L2D,
                    (NumericKind::Float, NumericKind::Int) => opcodes::F2I,
                    (NumericKind::Float, NumericKind::Long) => opcodes::F2L,
                    (NumericKind::Float, NumericKind::Double) => opcodes::F2D,
                    (NumericKind::Double, NumericKind::Int) => opcodes::D2I,
                    (NumericKind::Double, NumericKind::Long) => opcodes::D2L,
                    (NumericKind::Double, NumericKind::Float) => opcodes::D2F,
                    (from, _) => {
                        let msg = format!("No conversion from {:?} to itself", from);
                        return Err(Error::new(ErrorKind::InvalidInput, msg));
                    }
                };
                opcode.serialize(writer)
            }
            Instruction::I2B => opcodes::I2B.serialize(writer),
            Instruction::I2C => opcodes::I2C.serialize(writer),
            Instruction::I2S => opcodes::I2S.serialize(writer),
            Instruction::LCmp => opcodes::LCMP.serialize(writer),
            Instruction::FCmp(CompareMode::L) => opcodes::FCMPL.serialize(writer),
            Instruction::FCmp(CompareMode::G) => opcodes::FCMPG.serialize(writer),
            Instruction::DCmp(CompareMode::L) => opcodes::DCMPL.serialize(writer),
            Instruction::DCmp(CompareMode::G) => opcodes::DCMPG.serialize(writer),
            Instruction::GetStatic(idx) => with_index(opcodes::GETSTATIC, *idx, writer),
            Instruction::PutStatic(idx) => with_index(opcodes::PUTSTATIC, *idx, writer),
            Instruction::GetField(idx) => with_index(opcodes::GETFIELD, *idx, writer),
            Instruction::PutField(idx) => with_index(opcodes::PUTFIELD, *idx, writer),
            Instruction::Invoke(InvokeType::Virtual, idx) => {
                with_index(opcodes::INVOKEVIRTUAL, *idx, writer)
            }
            Instruction::Invoke(InvokeType::Special, idx) => {
                with_index(opcodes::INVOKESPECIAL, *idx, writer)
            }
            Instruction::Invoke(InvokeType::Static, idx) => {
                with_index(opcodes::INVOKESTATIC, *idx, writer)
            }
            Instruction::Invoke(InvokeType::Interface(count), idx) => {
                with_index(opcodes::INVOKEINTERFACE, *idx, writer)?;
                count.serialize(writer)?;
                0u8.serialize(writer)
            }
            Instruction::New(idx) => with_index(opcodes::NEW, *idx, writer),
            Instruction::NewArray(base_type) => {
                opcodes::NEWARRAY.serialize(writer)?;
                array_type_code(*base_type).serialize(writer)
            }
            Instruction::ANewArray(idx) => with_index(opcodes::ANEWARRAY, *idx, writer),
            Instruction::MultiANewArray(idx, dimensions) => {
                with_index(opcodes::MULTIANEWARRAY, *idx, writer)?;
                dimensions.serialize(writer)
            }
            Instruction::ArrayLength => opcodes::ARRAYLENGTH.serialize(writer),
            Instruction::CheckCast(idx) => with_index(opcodes::CHECKCAST, *idx, writer),
            Instruction::InstanceOf(idx) => with_index(opcodes::INSTANCEOF, *idx, writer),
            Instruction::MonitorEnter => opcodes::MONITORENTER.serialize(writer),
            Instruction::MonitorExit => opcodes::MONITOREXIT.serialize(writer),
        }
    }
}

/// `atype` operand of `newarray`
pub fn array_type_code(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Boolean => 4,
        BaseType::Char => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Byte => 8,
        BaseType::Short => 9,
        BaseType::Int => 10,
        BaseType::Long => 11,
    }
}

fn out_of_range(what: &str, value: i64) -> Error {
    let msg = format!("{} {} cannot be encoded", what, value);
    Error::new(ErrorKind::InvalidData, msg)
}

/// Branching JVM bytecode instruction
///
/// `Lbl` is the representation of jump targets: label handles while compiling, offsets relative
/// to the start of the instruction once the method is resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    GotoW(Lbl),
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len() - 1`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    Return(Option<ValueKind>), // covers `xreturn` and `return`
    AThrow,
}

impl<Lbl> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
        )
    }

    /// Non-fallthrough targets, in encoding order (switch defaults first)
    pub fn jump_targets(&self) -> Vec<&Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::GotoW(lbl) => vec![lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter()).collect(),
            BranchInstruction::LookupSwitch { default, targets } => std::iter::once(default)
                .chain(targets.iter().map(|(_, target)| target))
                .collect(),
            BranchInstruction::Return(_) | BranchInstruction::AThrow => vec![],
        }
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> std::result::Result<Lbl2, E>,
    ) -> std::result::Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;
        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            GotoW(lbl) => GotoW(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&mut map_label)
                    .collect::<std::result::Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_label(lbl)?)))
                    .collect::<std::result::Result<_, E>>()?,
            },
            Return(kind) => Return(*kind),
            AThrow => AThrow,
        })
    }

    /// Size in bytes, when the instruction starts at `offset` in the code array
    ///
    /// Only switches depend on the offset: their operands must be 4-byte aligned relative to the
    /// start of the code array, so there is a 0-3 byte padding after the opcode.
    pub fn size_at(&self, offset: usize) -> usize {
        match self {
            BranchInstruction::Return(_) | BranchInstruction::AThrow => 1,

            BranchInstruction::Goto(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::GotoW(_) => 5,

            BranchInstruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 4 * (3 + targets.len())
            }

            BranchInstruction::LookupSwitch { targets, .. } => {
                1 + switch_padding(offset) + 8 * (1 + targets.len())
            }
        }
    }
}

/// Padding needed after a switch opcode at `offset`
pub fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

impl BranchInstruction<i32> {
    /// Serialize the instruction, given its offset in the code array
    pub fn serialize_at<W: WriteBytesExt>(&self, offset: usize, writer: &mut W) -> Result<()> {
        fn narrow<W: WriteBytesExt>(opcode: u8, jump: i32, writer: &mut W) -> Result<()> {
            let jump = i16::try_from(jump).map_err(|_| out_of_range("branch offset", jump as i64))?;
            opcode.serialize(writer)?;
            jump.serialize(writer)
        }

        match self {
            BranchInstruction::If(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => opcodes::IFEQ,
                    OrdComparison::NE => opcodes::IFNE,
                    OrdComparison::LT => opcodes::IFLT,
                    OrdComparison::GE => opcodes::IFGE,
                    OrdComparison::GT => opcodes::IFGT,
                    OrdComparison::LE => opcodes::IFLE,
                };
                narrow(opcode, *lbl, writer)
            }
            BranchInstruction::IfICmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => opcodes::IF_ICMPEQ,
                    OrdComparison::NE => opcodes::IF_ICMPNE,
                    OrdComparison::LT => opcodes::IF_ICMPLT,
                    OrdComparison::GE => opcodes::IF_ICMPGE,
                    OrdComparison::GT => opcodes::IF_ICMPGT,
                    OrdComparison::LE => opcodes::IF_ICMPLE,
                };
                narrow(opcode, *lbl, writer)
            }
            BranchInstruction::IfACmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => opcodes::IF_ACMPEQ,
                    EqComparison::NE => opcodes::IF_ACMPNE,
                };
                narrow(opcode, *lbl, writer)
            }
            BranchInstruction::IfNull(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => opcodes::IFNULL,
                    EqComparison::NE => opcodes::IFNONNULL,
                };
                narrow(opcode, *lbl, writer)
            }
            BranchInstruction::Goto(lbl) => narrow(opcodes::GOTO, *lbl, writer),
            BranchInstruction::GotoW(lbl) => {
                opcodes::GOTO_W.serialize(writer)?;
                lbl.serialize(writer)
            }
            BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                opcodes::TABLESWITCH.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
                Ok(())
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                opcodes::LOOKUPSWITCH.serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
                Ok(())
            }
            BranchInstruction::Return(kind) => {
                let opcode = match kind {
                    Some(ValueKind::Int) => opcodes::IRETURN,
                    Some(ValueKind::Long) => opcodes::LRETURN,
                    Some(ValueKind::Float) => opcodes::FRETURN,
                    Some(ValueKind::Double) => opcodes::DRETURN,
                    Some(ValueKind::Reference) => opcodes::ARETURN,
                    None => opcodes::RETURN,
                };
                opcode.serialize(writer)
            }
            BranchInstruction::AThrow => opcodes::ATHROW.serialize(writer),
        }
    }
}

/// Either kind of instruction, as it sits in a method body
#[derive(Clone, Debug, PartialEq)]
pub enum CodeInstruction<Constant, Lbl> {
    Simple(Instruction<Constant>),
    Branch(BranchInstruction<Lbl>),
}

impl<C, L> CodeInstruction<C, L> {
    /// Size in bytes, when the instruction starts at `offset` in the code array
    pub fn size_at(&self, offset: usize) -> usize {
        match self {
            CodeInstruction::Simple(insn) => insn.width(),
            CodeInstruction::Branch(insn) => insn.size_at(offset),
        }
    }

    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        match self {
            CodeInstruction::Simple(_) => true,
            CodeInstruction::Branch(insn) => insn.falls_through(),
        }
    }

    pub fn as_branch(&self) -> Option<&BranchInstruction<L>> {
        match self {
            CodeInstruction::Simple(_) => None,
            CodeInstruction::Branch(insn) => Some(insn),
        }
    }
}

impl CodeInstruction<u16, i32> {
    pub fn serialize_at<W: WriteBytesExt>(&self, offset: usize, writer: &mut W) -> Result<()> {
        match self {
            CodeInstruction::Simple(insn) => insn.serialize(writer),
            CodeInstruction::Branch(insn) => insn.serialize_at(offset, writer),
        }
    }
}

/// How a local variable index is encoded
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LocalForm {
    /// Index is part of the opcode (`iload_0` through `iload_3`)
    Implicit,

    /// One byte index
    Narrow,

    /// Two byte index, after a `wide` prefix
    Wide,
}

/// Kind of value moved by loads, stores, and returns
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Prefix letter used in mnemonics
    pub fn prefix(self) -> char {
        match self {
            ValueKind::Int => 'i',
            ValueKind::Long => 'l',
            ValueKind::Float => 'f',
            ValueKind::Double => 'd',
            ValueKind::Reference => 'a',
        }
    }
}

impl Width for ValueKind {
    fn width(&self) -> usize {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }
}

/// Element kind of array loads and stores
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte, // also used for `boolean` arrays
    Char,
    Short,
}

impl ArrayKind {
    fn opcode_offset(self) -> u8 {
        match self {
            ArrayKind::Int => 0,
            ArrayKind::Long => 1,
            ArrayKind::Float => 2,
            ArrayKind::Double => 3,
            ArrayKind::Reference => 4,
            ArrayKind::Byte => 5,
            ArrayKind::Char => 6,
            ArrayKind::Short => 7,
        }
    }
}

/// Kind of value in arithmetic instructions
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumericKind {
    fn opcode_offset(self) -> u8 {
        match self {
            NumericKind::Int => 0,
            NumericKind::Long => 1,
            NumericKind::Float => 2,
            NumericKind::Double => 3,
        }
    }

    fn integral_offset(self) -> Result<u8> {
        match self {
            NumericKind::Int => Ok(0),
            NumericKind::Long => Ok(1),
            other => {
                let msg = format!("{:?} is not an integral kind", other);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Arithmetic binary operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Bitwise binary operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

#[cfg(test)]
mod test {
    use super::*;

    fn bytes(insn: Instruction<u16>) -> Vec<u8> {
        insn.to_bytes().unwrap()
    }

    #[test]
    fn local_encodings() {
        assert_eq!(bytes(Instruction::Load(ValueKind::Int, 2, LocalForm::Implicit)), vec![0x1c]);
        assert_eq!(bytes(Instruction::Load(ValueKind::Reference, 0, LocalForm::Implicit)), vec![0x2a]);
        assert_eq!(bytes(Instruction::Store(ValueKind::Long, 7, LocalForm::Narrow)), vec![0x37, 7]);
        assert_eq!(
            bytes(Instruction::Load(ValueKind::Double, 300, LocalForm::Wide)),
            vec![0xc4, 0x18, 0x01, 0x2c]
        );
        assert!(Instruction::<u16>::Load(ValueKind::Int, 300, LocalForm::Narrow)
            .to_bytes()
            .is_err());
    }

    #[test]
    fn increment_sizes_match_encodings() {
        let narrow = Instruction::<u16>::IInc {
            index: 4,
            increment: -3,
            wide: false,
        };
        let wide = Instruction::<u16>::IInc {
            index: 300,
            increment: 200,
            wide: true,
        };
        assert_eq!(narrow.width(), 3);
        assert_eq!(bytes(narrow), vec![0x84, 4, 0xfd]);
        assert_eq!(wide.width(), 6);
        assert_eq!(bytes(wide), vec![0xc4, 0x84, 0x01, 0x2c, 0x00, 0xc8]);
    }

    #[test]
    fn grouped_opcodes() {
        assert_eq!(bytes(Instruction::IConst(-1)), vec![0x02]);
        assert_eq!(bytes(Instruction::IConst(5)), vec![0x08]);
        assert_eq!(bytes(Instruction::Arithmetic(NumericKind::Double, ArithmeticOp::Add)), vec![0x63]);
        assert_eq!(bytes(Instruction::Arithmetic(NumericKind::Long, ArithmeticOp::Rem)), vec![0x71]);
        assert_eq!(bytes(Instruction::Shift(NumericKind::Long, ShiftType::LogicalRight)), vec![0x7d]);
        assert_eq!(bytes(Instruction::Bitwise(NumericKind::Int, BitwiseOp::Xor)), vec![0x82]);
        assert_eq!(bytes(Instruction::Convert(NumericKind::Double, NumericKind::Float)), vec![0x90]);
        assert_eq!(bytes(Instruction::ArrayStore(ArrayKind::Short)), vec![0x56]);
        assert_eq!(bytes(Instruction::NewArray(BaseType::Int)), vec![0xbc, 10]);
        assert!(Instruction::<u16>::Shift(NumericKind::Float, ShiftType::Left).to_bytes().is_err());
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        let switch = BranchInstruction::TableSwitch {
            default: 20,
            low: 0,
            targets: vec![10, 15],
        };
        assert_eq!(switch.size_at(0), 1 + 3 + 4 * 5);
        assert_eq!(switch.size_at(3), 1 + 4 * 5);

        let mut encoded = vec![];
        switch.serialize_at(1, &mut encoded).unwrap();
        assert_eq!(encoded.len(), switch.size_at(1));
        assert_eq!(&encoded[..3], &[0xaa, 0, 0]);
    }

    #[test]
    fn branch_targets() {
        let switch = BranchInstruction::LookupSwitch {
            default: 'd',
            targets: vec![(1, 'a'), (5, 'b')],
        };
        assert_eq!(switch.jump_targets(), vec![&'d', &'a', &'b']);
        assert!(!switch.falls_through());
        assert!(BranchInstruction::If(OrdComparison::LT, 'x').falls_through());
        assert!(BranchInstruction::<char>::Return(None).jump_targets().is_empty());

        let too_far = BranchInstruction::Goto(40_000);
        assert!(too_far.serialize_at(0, &mut vec![]).is_err());
    }
}

//! Instruction evaluators
//!
//! Every instruction mnemonic maps to an [`InstructionKind`] through [`lookup`]. Evaluating a
//! node of that kind checks and converts its operands into a [`CodeInstruction`] whose size is
//! known right away. Separately, [`frame_difference`] describes what any such instruction does to
//! the stack. It only looks at the evaluated instruction, so the analyzer can ask for it in
//! whatever order it visits the code.
//!
//! Families of instructions live in their own modules: each exposes a `lookup` for its mnemonics,
//! the evaluation of the kinds that take operands, and the stack effects.

mod arithmetic;
mod constants;
mod control;
mod locals;
mod objects;
mod stack;

use super::{Error, InstructionNode, LabelId, LabelTable, LocalVariableResolver};
use crate::jvm::bytecode::{
    BranchInstruction, CodeInstruction, Instruction, InvokeType, NumericKind, ValueKind,
};
use crate::jvm::verifier::{FrameDifference, InstructionId, Primitive};
use crate::jvm::{BinaryName, Constant, MethodDescriptor, UnqualifiedName};

pub use constants::LdcForm;

/// Instruction as the analyzer and encoder see it: constants are still symbolic and jump targets
/// are labels
pub type SymbolicInstruction = CodeInstruction<Constant, LabelId>;

/// Result of evaluating one instruction node
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluatedInstruction {
    pub instruction: SymbolicInstruction,

    /// Encoded size in bytes, at the offset the instruction was evaluated at
    pub size: usize,
}

/// What evaluators can see of the method being compiled
pub struct EvaluationContext<'a> {
    pub this_class: &'a BinaryName,
    pub method_name: &'a UnqualifiedName,
    pub descriptor: &'a MethodDescriptor<BinaryName>,
    pub locals: &'a mut LocalVariableResolver,
    pub labels: &'a LabelTable,

    /// Position of the instruction in the method body
    pub instruction: InstructionId,

    /// Bytecode offset of the instruction
    pub offset: usize,
}

impl<'a> EvaluationContext<'a> {
    /// Resolve a jump target
    fn jump_target(&self, node: &InstructionNode, name: &str) -> Result<LabelId, Error> {
        self.labels.lookup(name).ok_or_else(|| Error::UnknownJump {
            instruction: self.instruction,
            position: node.position,
            target: name.to_owned(),
            label: None,
        })
    }
}

/// Families of instructions, grouped by how their operands get evaluated
#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    /// No operands (`iadd`, `dup`, `i2l`, `arraylength`, `athrow`, ...)
    Plain(SymbolicInstruction),

    /// Return, checked against the method return type
    Return(Option<ValueKind>),

    BiPush,
    SiPush,
    Ldc(LdcForm),

    /// Load from a local, with the index already known for the `xload_<n>` forms
    Load(ValueKind, Option<u16>),

    /// Store to a local, with the index already known for the `xstore_<n>` forms
    Store(ValueKind, Option<u16>),

    Increment,

    /// Field access (the constant in the template is filled in with the field)
    Field(Instruction<()>),

    Invoke(InvokeType),

    /// Instruction with a class operand (`new`, `anewarray`, `checkcast`, `instanceof`)
    Class(Instruction<()>),

    NewArray,
    MultiANewArray,

    /// Branch with a single target (the label in the template is filled in)
    Jump(BranchInstruction<()>),

    TableSwitch,
    LookupSwitch,
}

/// Find the kind of instruction a mnemonic refers to
pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    constants::lookup(mnemonic)
        .or_else(|| locals::lookup(mnemonic))
        .or_else(|| stack::lookup(mnemonic))
        .or_else(|| arithmetic::lookup(mnemonic))
        .or_else(|| control::lookup(mnemonic))
        .or_else(|| objects::lookup(mnemonic))
}

impl InstructionKind {
    /// Turn a node into an instruction, checking its operands
    pub fn evaluate(
        &self,
        ctx: &mut EvaluationContext,
        node: &InstructionNode,
    ) -> Result<EvaluatedInstruction, Error> {
        let instruction = match self {
            InstructionKind::Plain(instruction) => {
                node.reject_wide()?;
                node.expect_operands(0)?;
                instruction.clone()
            }
            InstructionKind::Return(kind) => control::evaluate_return(ctx, node, *kind)?,
            InstructionKind::BiPush => constants::evaluate_bipush(node)?,
            InstructionKind::SiPush => constants::evaluate_sipush(node)?,
            InstructionKind::Ldc(form) => constants::evaluate_ldc(node, *form)?,
            InstructionKind::Load(kind, implicit) => {
                locals::evaluate_load(ctx, node, *kind, *implicit)?
            }
            InstructionKind::Store(kind, implicit) => {
                locals::evaluate_store(ctx, node, *kind, *implicit)?
            }
            InstructionKind::Increment => locals::evaluate_increment(ctx, node)?,
            InstructionKind::Field(template) => objects::evaluate_field(node, template)?,
            InstructionKind::Invoke(invoke_type) => objects::evaluate_invoke(node, *invoke_type)?,
            InstructionKind::Class(template) => objects::evaluate_class(node, template)?,
            InstructionKind::NewArray => objects::evaluate_newarray(node)?,
            InstructionKind::MultiANewArray => objects::evaluate_multianewarray(node)?,
            InstructionKind::Jump(template) => control::evaluate_jump(ctx, node, template)?,
            InstructionKind::TableSwitch => control::evaluate_tableswitch(ctx, node)?,
            InstructionKind::LookupSwitch => control::evaluate_lookupswitch(ctx, node)?,
        };
        let size = instruction.size_at(ctx.offset);
        Ok(EvaluatedInstruction { instruction, size })
    }
}

/// Evaluate a node, looking up its kind from the mnemonic
pub fn evaluate(
    ctx: &mut EvaluationContext,
    node: &InstructionNode,
) -> Result<EvaluatedInstruction, Error> {
    match lookup(&node.mnemonic) {
        Some(kind) => kind.evaluate(ctx, node),
        None => Err(node.illegal("unknown instruction")),
    }
}

/// Effect of an evaluated instruction on the frame
pub fn frame_difference(instruction: &SymbolicInstruction) -> FrameDifference {
    use Instruction as I;

    let insn = match instruction {
        CodeInstruction::Branch(branch) => return control::difference(branch),
        CodeInstruction::Simple(insn) => insn,
    };
    match insn {
        I::Nop => FrameDifference::same(),
        I::AConstNull => FrameDifference::builder().push_null().build(),
        I::IConst(_) | I::BiPush(_) | I::SiPush(_) => constants::push(Primitive::Integer),
        I::LConst(_) => constants::push(Primitive::Long),
        I::FConst(_) => constants::push(Primitive::Float),
        I::DConst(_) => constants::push(Primitive::Double),
        I::Ldc(constant) | I::LdcW(constant) | I::Ldc2W(constant) => constants::ldc(constant),

        I::Load(kind, index, _) => locals::load(*kind, *index),
        I::Store(kind, index, _) => locals::store(*kind, *index),
        I::IInc { .. } => FrameDifference::same(),

        I::Pop => stack::pop(1),
        I::Pop2 => stack::pop(2),
        I::Dup => stack::dup(1, 0),
        I::DupX1 => stack::dup(1, 1),
        I::DupX2 => stack::dup(1, 2),
        I::Dup2 => stack::dup(2, 0),
        I::Dup2X1 => stack::dup(2, 1),
        I::Dup2X2 => stack::dup(2, 2),
        I::Swap => stack::swap(),

        I::Arithmetic(kind, _) | I::Bitwise(kind, _) => arithmetic::binary(*kind),
        I::Neg(kind) => arithmetic::convert(*kind, *kind),
        I::Shift(kind, _) => arithmetic::shift(*kind),
        I::Convert(from, to) => arithmetic::convert(*from, *to),
        I::I2B | I::I2C | I::I2S => arithmetic::convert(NumericKind::Int, NumericKind::Int),
        I::LCmp => arithmetic::compare(NumericKind::Long),
        I::FCmp(_) => arithmetic::compare(NumericKind::Float),
        I::DCmp(_) => arithmetic::compare(NumericKind::Double),

        I::ArrayLoad(kind) => objects::array_load(*kind),
        I::ArrayStore(kind) => objects::array_store(*kind),
        I::GetStatic(constant)
        | I::PutStatic(constant)
        | I::GetField(constant)
        | I::PutField(constant) => objects::field(insn, constant),
        I::Invoke(invoke_type, constant) => objects::invoke(*invoke_type, constant),
        I::New(constant) => objects::new(constant),
        I::NewArray(element_type) => objects::new_array(*element_type),
        I::ANewArray(constant) => objects::anewarray(constant),
        I::MultiANewArray(constant, dimensions) => objects::multianewarray(constant, *dimensions),
        I::ArrayLength => objects::array_length(),
        I::CheckCast(constant) => objects::checkcast(constant),
        I::InstanceOf(_) => objects::instanceof(),
        I::MonitorEnter | I::MonitorExit => objects::monitor(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::{LocalReference, Operand};
    use crate::jvm::bytecode::ArithmeticOp;
    use crate::jvm::{FieldType, Name};

    pub(super) struct Fixture {
        pub this_class: BinaryName,
        pub method_name: UnqualifiedName,
        pub descriptor: MethodDescriptor<BinaryName>,
        pub locals: LocalVariableResolver,
        pub labels: LabelTable,
    }

    impl Fixture {
        pub fn new(return_type: Option<FieldType<BinaryName>>) -> Fixture {
            let descriptor = MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type,
            };
            Fixture {
                this_class: BinaryName::STRING,
                method_name: UnqualifiedName::from_string(String::from("run")).unwrap(),
                locals: LocalVariableResolver::for_method(None, &descriptor),
                descriptor,
                labels: LabelTable::new(),
            }
        }

        pub fn evaluate(&mut self, node: InstructionNode) -> Result<EvaluatedInstruction, Error> {
            self.evaluate_at(node, 0)
        }

        pub fn evaluate_at(
            &mut self,
            node: InstructionNode,
            offset: usize,
        ) -> Result<EvaluatedInstruction, Error> {
            let mut ctx = EvaluationContext {
                this_class: &self.this_class,
                method_name: &self.method_name,
                descriptor: &self.descriptor,
                locals: &mut self.locals,
                labels: &self.labels,
                instruction: InstructionId(0),
                offset,
            };
            evaluate(&mut ctx, &node)
        }
    }

    #[test]
    fn dispatch() {
        assert_eq!(
            lookup("dadd"),
            Some(InstructionKind::Plain(CodeInstruction::Simple(Instruction::Arithmetic(
                NumericKind::Double,
                ArithmeticOp::Add
            ))))
        );
        assert_eq!(lookup("iload_2"), Some(InstructionKind::Load(ValueKind::Int, Some(2))));
        assert_eq!(lookup("areturn"), Some(InstructionKind::Return(Some(ValueKind::Reference))));
        assert_eq!(lookup("jsr"), None);
        assert_eq!(lookup("iload_4"), None);

        let mut fixture = Fixture::new(None);
        assert!(matches!(
            fixture.evaluate(InstructionNode::new("frobnicate")),
            Err(Error::IllegalInstruction { .. })
        ));
        assert!(matches!(
            fixture.evaluate(InstructionNode::new("iadd").with(Operand::Number(1))),
            Err(Error::IllegalInstruction { .. })
        ));
        assert!(matches!(
            fixture.evaluate(InstructionNode::new("iadd").with_wide()),
            Err(Error::IllegalInstruction { .. })
        ));
    }

    #[test]
    fn stack_balance() {
        let delta = |mnemonic: &str| -> isize {
            let kind = lookup(mnemonic).unwrap();
            match kind {
                InstructionKind::Plain(instruction) => frame_difference(&instruction).slot_delta(),
                other => panic!("{:?} is not a plain instruction", other),
            }
        };

        assert_eq!(delta("dadd"), -2);
        assert_eq!(delta("iadd"), -1);
        assert_eq!(delta("lshl"), -1);
        assert_eq!(delta("lcmp"), -3);
        assert_eq!(delta("dcmpg"), -3);
        assert_eq!(delta("i2l"), 1);
        assert_eq!(delta("d2i"), -1);
        assert_eq!(delta("fneg"), 0);
        assert_eq!(delta("lconst_1"), 2);
        assert_eq!(delta("aconst_null"), 1);
        assert_eq!(delta("dup2_x2"), 2);
        assert_eq!(delta("pop2"), -2);
        assert_eq!(delta("swap"), 0);
        assert_eq!(delta("laload"), 0);
        assert_eq!(delta("dastore"), -4);
        assert_eq!(delta("arraylength"), 0);
        assert_eq!(delta("monitorenter"), -1);
        assert_eq!(delta("athrow"), -1);
        assert_eq!(delta("nop"), 0);
    }

    #[test]
    fn loads_and_stores_balance() {
        let mut fixture = Fixture::new(None);
        let store = fixture
            .evaluate(
                InstructionNode::new("dstore").with(Operand::Local(LocalReference::Name(
                    String::from("total"),
                ))),
            )
            .unwrap();
        assert_eq!(frame_difference(&store.instruction).slot_delta(), -2);

        let load = fixture.evaluate(InstructionNode::new("iload_0")).unwrap();
        assert_eq!(load.size, 1);
        assert_eq!(frame_difference(&load.instruction).slot_delta(), 1);
    }
}

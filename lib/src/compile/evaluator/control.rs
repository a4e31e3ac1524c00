use super::{EvaluationContext, InstructionKind, SymbolicInstruction};
use crate::compile::{Error, InstructionNode, LabelId, Operand};
use crate::jvm::bytecode::{
    BranchInstruction, CodeInstruction, EqComparison, OrdComparison, ValueKind,
};
use crate::jvm::verifier::{ExpectedElement, FrameDifference, Primitive};
use crate::jvm::{BinaryName, FieldType, ReturnType};

pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    use BranchInstruction::*;

    let jump = |template| Some(InstructionKind::Jump(template));
    match mnemonic {
        "ifeq" => jump(If(OrdComparison::EQ, ())),
        "ifne" => jump(If(OrdComparison::NE, ())),
        "iflt" => jump(If(OrdComparison::LT, ())),
        "ifge" => jump(If(OrdComparison::GE, ())),
        "ifgt" => jump(If(OrdComparison::GT, ())),
        "ifle" => jump(If(OrdComparison::LE, ())),
        "if_icmpeq" => jump(IfICmp(OrdComparison::EQ, ())),
        "if_icmpne" => jump(IfICmp(OrdComparison::NE, ())),
        "if_icmplt" => jump(IfICmp(OrdComparison::LT, ())),
        "if_icmpge" => jump(IfICmp(OrdComparison::GE, ())),
        "if_icmpgt" => jump(IfICmp(OrdComparison::GT, ())),
        "if_icmple" => jump(IfICmp(OrdComparison::LE, ())),
        "if_acmpeq" => jump(IfACmp(EqComparison::EQ, ())),
        "if_acmpne" => jump(IfACmp(EqComparison::NE, ())),
        "ifnull" => jump(IfNull(EqComparison::EQ, ())),
        "ifnonnull" => jump(IfNull(EqComparison::NE, ())),
        "goto" => jump(Goto(())),
        "goto_w" => jump(GotoW(())),
        "tableswitch" => Some(InstructionKind::TableSwitch),
        "lookupswitch" => Some(InstructionKind::LookupSwitch),
        "ireturn" => Some(InstructionKind::Return(Some(ValueKind::Int))),
        "lreturn" => Some(InstructionKind::Return(Some(ValueKind::Long))),
        "freturn" => Some(InstructionKind::Return(Some(ValueKind::Float))),
        "dreturn" => Some(InstructionKind::Return(Some(ValueKind::Double))),
        "areturn" => Some(InstructionKind::Return(Some(ValueKind::Reference))),
        "return" => Some(InstructionKind::Return(None)),
        "athrow" => Some(InstructionKind::Plain(CodeInstruction::Branch(AThrow))),
        _ => None,
    }
}

/// What a return instruction hands back to the caller
fn returned(kind: Option<ValueKind>) -> ReturnType<BinaryName> {
    match kind {
        None => ReturnType::Void,
        Some(ValueKind::Int) => ReturnType::Value(FieldType::int()),
        Some(ValueKind::Long) => ReturnType::Value(FieldType::long()),
        Some(ValueKind::Float) => ReturnType::Value(FieldType::float()),
        Some(ValueKind::Double) => ReturnType::Value(FieldType::double()),
        Some(ValueKind::Reference) => ReturnType::AnyReference,
    }
}

/// Return, which must agree with the return type of the method
pub fn evaluate_return(
    ctx: &EvaluationContext,
    node: &InstructionNode,
    kind: Option<ValueKind>,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(0)?;
    let expected = ReturnType::from(ctx.descriptor.return_type.clone());
    let actual = returned(kind);
    if !expected.accepts(&actual) {
        return Err(Error::ReturnTypeMismatch {
            position: node.position,
            expected,
            actual,
        });
    }
    Ok(CodeInstruction::Branch(BranchInstruction::Return(kind)))
}

pub fn evaluate_jump(
    ctx: &EvaluationContext,
    node: &InstructionNode,
    template: &BranchInstruction<()>,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    node.expect_operands(1)?;
    let target = ctx.jump_target(node, node.label(0)?)?;
    let branch = template.map_labels(|_| Ok::<LabelId, Error>(target))?;
    Ok(CodeInstruction::Branch(branch))
}

/// `tableswitch <low> <target>... <default>`
///
/// Targets are for `low`, `low + 1`, ... in order.
pub fn evaluate_tableswitch(
    ctx: &EvaluationContext,
    node: &InstructionNode,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    let low: i32 = node.integer(0, "low key")?;
    if node.operands.len() < 3 {
        return Err(node.illegal("expected a low key, at least one target, and a default"));
    }

    let last = node.operands.len() - 1;
    let mut targets = vec![];
    for idx in 1..last {
        targets.push(ctx.jump_target(node, node.label(idx)?)?);
    }
    let default = ctx.jump_target(node, node.label(last)?)?;
    if low.checked_add(targets.len() as i32 - 1).is_none() {
        return Err(node.illegal("too many targets for the low key"));
    }

    Ok(CodeInstruction::Branch(BranchInstruction::TableSwitch {
        default,
        low,
        targets,
    }))
}

/// `lookupswitch (<key> <target>)... <default>`
///
/// Keys may be written in any order, but must be distinct.
pub fn evaluate_lookupswitch(
    ctx: &EvaluationContext,
    node: &InstructionNode,
) -> Result<SymbolicInstruction, Error> {
    node.reject_wide()?;
    if node.operands.len() % 2 == 0 {
        return Err(node.illegal("expected key and target pairs, then a default"));
    }

    let last = node.operands.len() - 1;
    let mut targets: Vec<(i32, LabelId)> = vec![];
    for idx in (0..last).step_by(2) {
        let key: i32 = match node.operand(idx)? {
            Operand::Number(_) => node.integer(idx, "key")?,
            _ => return Err(node.illegal(format!("operand {} should be a key", idx + 1))),
        };
        targets.push((key, ctx.jump_target(node, node.label(idx + 1)?)?));
    }
    let default = ctx.jump_target(node, node.label(last)?)?;

    targets.sort_by_key(|(key, _)| *key);
    if let Some(pair) = targets.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(node.illegal(format!("key {} appears more than once", pair[0].0)));
    }

    Ok(CodeInstruction::Branch(BranchInstruction::LookupSwitch {
        default,
        targets,
    }))
}

pub fn difference(branch: &BranchInstruction<LabelId>) -> FrameDifference {
    let builder = FrameDifference::builder();
    match branch {
        BranchInstruction::If(_, _)
        | BranchInstruction::TableSwitch { .. }
        | BranchInstruction::LookupSwitch { .. } => builder.pop_primitive(Primitive::Integer),
        BranchInstruction::IfICmp(_, _) => builder
            .pop_primitive(Primitive::Integer)
            .pop_primitive(Primitive::Integer),
        BranchInstruction::IfACmp(_, _) => builder.pop_object_ref().pop_object_ref(),
        BranchInstruction::IfNull(_, _) | BranchInstruction::AThrow => builder.pop_object_ref(),
        BranchInstruction::Goto(_) | BranchInstruction::GotoW(_) | BranchInstruction::Return(None) => {
            return FrameDifference::same()
        }
        BranchInstruction::Return(Some(kind)) => builder.pop(match kind {
            ValueKind::Int => ExpectedElement::Primitive(Primitive::Integer),
            ValueKind::Long => ExpectedElement::Primitive(Primitive::Long),
            ValueKind::Float => ExpectedElement::Primitive(Primitive::Float),
            ValueKind::Double => ExpectedElement::Primitive(Primitive::Double),
            ValueKind::Reference => ExpectedElement::ObjectRef,
        }),
    }
    .build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::evaluator::test::Fixture;
    use crate::compile::SourcePosition;
    use crate::jvm::verifier::InstructionId;
    use crate::jvm::RefType;

    fn label(name: &str) -> Operand {
        Operand::Label(name.to_owned())
    }

    fn declare(fixture: &mut Fixture, names: &[&str]) -> Vec<LabelId> {
        names
            .iter()
            .map(|name| {
                fixture
                    .labels
                    .declare(name, SourcePosition::default(), InstructionId(0))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn return_contract() {
        let object = Some(FieldType::object(BinaryName::STRING));
        let mut fixture = Fixture::new(object);
        assert!(fixture.evaluate(InstructionNode::new("areturn")).is_ok());
        assert!(matches!(
            fixture.evaluate(InstructionNode::new("ireturn")),
            Err(Error::ReturnTypeMismatch { .. })
        ));

        let array = Some(FieldType::Ref(RefType::array(FieldType::int())));
        assert!(Fixture::new(array).evaluate(InstructionNode::new("areturn")).is_ok());

        let mut fixture = Fixture::new(Some(FieldType::long()));
        assert!(fixture.evaluate(InstructionNode::new("lreturn")).is_ok());
        match fixture.evaluate(InstructionNode::new("dreturn")) {
            Err(Error::ReturnTypeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, ReturnType::Value(FieldType::long()));
                assert_eq!(actual, ReturnType::Value(FieldType::double()));
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut fixture = Fixture::new(Some(FieldType::boolean()));
        assert!(fixture.evaluate(InstructionNode::new("ireturn")).is_ok());
        assert!(fixture.evaluate(InstructionNode::new("return")).is_err());
        assert!(Fixture::new(None).evaluate(InstructionNode::new("areturn")).is_err());
    }

    #[test]
    fn jumps() {
        let mut fixture = Fixture::new(None);
        let ids = declare(&mut fixture, &["loop"]);

        let goto = fixture
            .evaluate(InstructionNode::new("goto").with(label("loop")))
            .unwrap();
        assert_eq!(goto.instruction, CodeInstruction::Branch(BranchInstruction::Goto(ids[0])));

        match fixture.evaluate(InstructionNode::new("ifnull").with(label("missing"))) {
            Err(Error::UnknownJump { target, label, .. }) => {
                assert_eq!(target, "missing");
                assert_eq!(label, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn switches() {
        let mut fixture = Fixture::new(None);
        let ids = declare(&mut fixture, &["a", "b", "fallback"]);

        let table = fixture
            .evaluate_at(
                InstructionNode::new("tableswitch")
                    .with(Operand::Number(10))
                    .with(label("a"))
                    .with(label("b"))
                    .with(label("fallback")),
                2,
            )
            .unwrap();
        assert_eq!(table.size, 1 + 1 + 4 * 5);
        assert_eq!(
            table.instruction,
            CodeInstruction::Branch(BranchInstruction::TableSwitch {
                default: ids[2],
                low: 10,
                targets: vec![ids[0], ids[1]],
            })
        );

        let lookup = fixture
            .evaluate(
                InstructionNode::new("lookupswitch")
                    .with(Operand::Number(7))
                    .with(label("b"))
                    .with(Operand::Number(-3))
                    .with(label("a"))
                    .with(label("fallback")),
            )
            .unwrap();
        assert_eq!(
            lookup.instruction,
            CodeInstruction::Branch(BranchInstruction::LookupSwitch {
                default: ids[2],
                targets: vec![(-3, ids[0]), (7, ids[1])],
            })
        );

        let duplicate = InstructionNode::new("lookupswitch")
            .with(Operand::Number(1))
            .with(label("a"))
            .with(Operand::Number(1))
            .with(label("b"))
            .with(label("fallback"));
        assert!(matches!(fixture.evaluate(duplicate), Err(Error::IllegalInstruction { .. })));

        let no_targets = InstructionNode::new("tableswitch")
            .with(Operand::Number(0))
            .with(label("fallback"));
        assert!(fixture.evaluate(no_targets).is_err());
    }
}

use super::{EvaluationContext, InstructionKind, SymbolicInstruction};
use crate::compile::{Error, InstructionNode, LocalReference, LocalVariableInfo, MAX_LOCALS};
use crate::jvm::bytecode::{CodeInstruction, Instruction, LocalForm, ValueKind};
use crate::jvm::verifier::{ExpectedElement, FrameDifference, Primitive};
use crate::jvm::{BinaryName, FieldType};
use crate::util::Width;

fn value_kind(prefix: char) -> Option<ValueKind> {
    match prefix {
        'i' => Some(ValueKind::Int),
        'l' => Some(ValueKind::Long),
        'f' => Some(ValueKind::Float),
        'd' => Some(ValueKind::Double),
        'a' => Some(ValueKind::Reference),
        _ => None,
    }
}

pub fn lookup(mnemonic: &str) -> Option<InstructionKind> {
    if mnemonic == "iinc" {
        return Some(InstructionKind::Increment);
    }

    let mut chars = mnemonic.chars();
    let kind = value_kind(chars.next()?)?;
    let (operation, implicit) = match chars.as_str().split_once('_') {
        None => (chars.as_str(), None),
        Some((operation, n)) => match n {
            "0" | "1" | "2" | "3" => (operation, n.parse::<u16>().ok()),
            _ => return None,
        },
    };
    match operation {
        "load" => Some(InstructionKind::Load(kind, implicit)),
        "store" => Some(InstructionKind::Store(kind, implicit)),
        _ => None,
    }
}

/// Expectation on a value moved by a load or store
///
/// References can be uninitialized: constructors start with `aload_0` of an uninitialized
/// `this`.
fn expected(kind: ValueKind) -> ExpectedElement {
    match kind {
        ValueKind::Int => ExpectedElement::Primitive(Primitive::Integer),
        ValueKind::Long => ExpectedElement::Primitive(Primitive::Long),
        ValueKind::Float => ExpectedElement::Primitive(Primitive::Float),
        ValueKind::Double => ExpectedElement::Primitive(Primitive::Double),
        ValueKind::Reference => ExpectedElement::AnyReference,
    }
}

fn default_type(kind: ValueKind) -> FieldType<BinaryName> {
    match kind {
        ValueKind::Int => FieldType::int(),
        ValueKind::Long => FieldType::long(),
        ValueKind::Float => FieldType::float(),
        ValueKind::Double => FieldType::double(),
        ValueKind::Reference => FieldType::object(BinaryName::OBJECT),
    }
}

/// Pick the encoding of a local operand
///
/// The one-byte forms only exist for the `_<n>` mnemonics, and `wide` is never implied.
fn local_form(
    node: &InstructionNode,
    local: &LocalVariableInfo,
    kind: ValueKind,
    implicit: bool,
) -> Result<LocalForm, Error> {
    if local.index as usize + kind.width() > MAX_LOCALS {
        return Err(node.illegal(format!(
            "'{}' at slot {} does not fit in {} local slots",
            node.mnemonic, local.index, MAX_LOCALS
        )));
    }
    if implicit {
        node.reject_wide()?;
        Ok(LocalForm::Implicit)
    } else if node.wide {
        Ok(LocalForm::Wide)
    } else if local.requires_wide() {
        Err(node.illegal(format!(
            "local index {} does not fit in one byte, use 'wide {}'",
            local.index, node.mnemonic
        )))
    } else {
        Ok(LocalForm::Narrow)
    }
}

fn reference(node: &InstructionNode, implicit: Option<u16>) -> Result<LocalReference, Error> {
    match implicit {
        Some(index) => {
            node.expect_operands(0)?;
            Ok(LocalReference::Index(index))
        }
        None => {
            node.expect_operands(1)?;
            node.local(0).cloned()
        }
    }
}

pub fn evaluate_load(
    ctx: &mut EvaluationContext,
    node: &InstructionNode,
    kind: ValueKind,
    implicit: Option<u16>,
) -> Result<SymbolicInstruction, Error> {
    let reference = reference(node, implicit)?;
    let local = if implicit.is_some() {
        ctx.locals.resolve(&reference, &node.mnemonic, node.position)?
    } else {
        ctx.locals.resolve_load(&reference, node)?
    };
    let form = local_form(node, local, kind, implicit.is_some())?;
    Ok(CodeInstruction::Simple(Instruction::Load(kind, local.index, form)))
}

pub fn evaluate_store(
    ctx: &mut EvaluationContext,
    node: &InstructionNode,
    kind: ValueKind,
    implicit: Option<u16>,
) -> Result<SymbolicInstruction, Error> {
    let reference = reference(node, implicit)?;
    let local = ctx
        .locals
        .resolve_or_declare(&reference, node, default_type(kind))?;
    let form = local_form(node, &local, kind, implicit.is_some())?;
    Ok(CodeInstruction::Simple(Instruction::Store(kind, local.index, form)))
}

/// `iinc` comes in a narrow form (unsigned byte index, signed byte increment, 3 bytes) and a
/// `wide` form (two byte index and increment, 6 bytes)
pub fn evaluate_increment(
    ctx: &mut EvaluationContext,
    node: &InstructionNode,
) -> Result<SymbolicInstruction, Error> {
    node.expect_operands(2)?;
    let local = ctx
        .locals
        .resolve(node.local(0)?, &node.mnemonic, node.position)?;
    let index = local.index;
    let increment: i16 = node.integer(1, "increment")?;

    if !node.wide {
        if local.requires_wide() {
            return Err(node.illegal(format!(
                "local index {} does not fit in one byte, use 'wide iinc'",
                index
            )));
        }
        if i8::try_from(increment).is_err() {
            return Err(node.illegal(format!(
                "increment {} does not fit in a signed byte, use 'wide iinc'",
                increment
            )));
        }
    }
    Ok(CodeInstruction::Simple(Instruction::IInc {
        index,
        increment,
        wide: node.wide,
    }))
}

pub fn load(kind: ValueKind, index: u16) -> FrameDifference {
    FrameDifference::builder()
        .load_local(index, expected(kind))
        .build()
}

pub fn store(kind: ValueKind, index: u16) -> FrameDifference {
    FrameDifference::builder()
        .pop(expected(kind))
        .store_local(index)
        .build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::evaluator::test::Fixture;
    use crate::compile::Operand;

    fn iinc(index: u16, increment: i64) -> InstructionNode {
        InstructionNode::new("iinc")
            .with(Operand::Local(LocalReference::Index(index)))
            .with(Operand::Number(increment))
    }

    fn declare(fixture: &mut Fixture, index: u16) {
        let store = InstructionNode::new("istore")
            .with_wide()
            .with(Operand::Local(LocalReference::Index(index)));
        fixture.evaluate(store).unwrap();
    }

    #[test]
    fn increment_encodings() {
        let mut fixture = Fixture::new(None);
        declare(&mut fixture, 300);
        declare(&mut fixture, 4);

        assert!(matches!(fixture.evaluate(iinc(300, 1)), Err(Error::IllegalInstruction { .. })));
        assert!(matches!(fixture.evaluate(iinc(4, 200)), Err(Error::IllegalInstruction { .. })));
        assert_eq!(fixture.evaluate(iinc(300, 1).with_wide()).unwrap().size, 6);
        assert_eq!(fixture.evaluate(iinc(4, 200).with_wide()).unwrap().size, 6);
        assert_eq!(fixture.evaluate(iinc(4, -128)).unwrap().size, 3);
        assert!(matches!(
            fixture.evaluate(iinc(7, 1)),
            Err(Error::UnknownLocalVariable { .. })
        ));
        assert!(fixture.evaluate(iinc(4, 40000).with_wide()).is_err());
    }

    #[test]
    fn local_forms() {
        let mut fixture = Fixture::new(None);
        declare(&mut fixture, 300);

        let narrow = fixture
            .evaluate(InstructionNode::new("iload").with(Operand::Local(LocalReference::Index(0))))
            .unwrap();
        assert_eq!(narrow.size, 2);

        let far = InstructionNode::new("iload").with(Operand::Local(LocalReference::Index(300)));
        assert!(matches!(fixture.evaluate(far.clone()), Err(Error::IllegalInstruction { .. })));
        assert_eq!(fixture.evaluate(far.with_wide()).unwrap().size, 4);

        assert!(fixture.evaluate(InstructionNode::new("iload_0").with_wide()).is_err());
        assert!(matches!(
            fixture.evaluate(InstructionNode::new("fload_3")),
            Err(Error::UnknownLocalVariable { .. })
        ));
        assert_eq!(fixture.evaluate(InstructionNode::new("fstore_3")).unwrap().size, 1);
        assert_eq!(fixture.evaluate(InstructionNode::new("fload_3")).unwrap().size, 1);
    }

    #[test]
    fn wide_values_in_the_last_slot() {
        let mut fixture = Fixture::new(None);
        declare(&mut fixture, 65534);

        let slot = Operand::Local(LocalReference::Index(65534));
        let int = InstructionNode::new("iload").with_wide().with(slot.clone());
        assert_eq!(fixture.evaluate(int).unwrap().size, 4);
        let long = InstructionNode::new("lstore").with_wide().with(slot);
        assert!(matches!(fixture.evaluate(long), Err(Error::IllegalInstruction { .. })));
    }
}

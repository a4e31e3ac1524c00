use super::{Error, InstructionNode, LocalDeclaration, LocalReference, SourcePosition};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, ParseDescriptor, RenderDescriptor};
use crate::util::Width;

/// Number of local slots a method can have (`max_locals` is an unsigned 16-bit field)
pub const MAX_LOCALS: usize = u16::MAX as usize;

/// Local variable, as resolved from its uses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableInfo {
    pub name: String,
    pub index: u16,

    /// Type given when the local was declared
    ///
    /// This is informational: what the slot actually holds at some point is tracked by the
    /// analyzer.
    pub descriptor: FieldType<BinaryName>,
    pub is_parameter: bool,
}

impl LocalVariableInfo {
    /// Does addressing this local need the `wide` prefix?
    pub fn requires_wide(&self) -> bool {
        self.index > u8::MAX as u16
    }
}

impl Width for LocalVariableInfo {
    fn width(&self) -> usize {
        self.descriptor.width()
    }
}

/// Maps local references in instructions to slots
///
/// Parameters are registered up front. Other locals get declared by the first store into them.
#[derive(Clone, Debug, Default)]
pub struct LocalVariableResolver {
    locals: Vec<LocalVariableInfo>,

    /// Warn about narrow loads that have a one-byte form
    pub warn_short_form_loads: bool,
}

impl LocalVariableResolver {
    pub fn new() -> LocalVariableResolver {
        LocalVariableResolver {
            locals: vec![],
            warn_short_form_loads: true,
        }
    }

    /// Resolver with the parameters of a method registered
    ///
    /// `this_class` is `None` for static methods. Parameters are named `arg00000`, `arg00001`, ...
    pub fn for_method(
        this_class: Option<&BinaryName>,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> LocalVariableResolver {
        let mut resolver = LocalVariableResolver::new();
        let mut index: u16 = 0;
        if let Some(this_class) = this_class {
            resolver.locals.push(LocalVariableInfo {
                name: String::from("this"),
                index,
                descriptor: FieldType::object(this_class.clone()),
                is_parameter: true,
            });
            index += 1;
        }
        for (param_idx, parameter) in descriptor.parameters.iter().enumerate() {
            resolver.locals.push(LocalVariableInfo {
                name: format!("arg{:05}", param_idx),
                index,
                descriptor: parameter.clone(),
                is_parameter: true,
            });
            index += parameter.width() as u16;
        }
        resolver
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariableInfo> {
        self.locals.iter()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &LocalVariableInfo> {
        self.locals.iter().filter(|local| local.is_parameter)
    }

    fn find(&self, reference: &LocalReference) -> Option<&LocalVariableInfo> {
        match reference {
            LocalReference::Index(index) => self.locals.iter().find(|local| local.index == *index),
            LocalReference::Name(name) => self.locals.iter().find(|local| &local.name == name),
        }
    }

    /// Look up an existing local
    pub fn resolve(
        &self,
        reference: &LocalReference,
        opcode: &str,
        position: SourcePosition,
    ) -> Result<&LocalVariableInfo, Error> {
        self.find(reference)
            .ok_or_else(|| Error::UnknownLocalVariable {
                position,
                reference: reference.to_string(),
                opcode: opcode.to_owned(),
            })
    }

    /// Look up the local read by a load instruction
    pub fn resolve_load(
        &self,
        reference: &LocalReference,
        node: &InstructionNode,
    ) -> Result<&LocalVariableInfo, Error> {
        let local = self.resolve(reference, &node.mnemonic, node.position)?;
        if self.warn_short_form_loads && !node.wide && local.index <= 3 {
            log::warn!(
                "{}: local '{}' is read with '{}', but '{}_{}' is shorter",
                node.position,
                local.name,
                node.mnemonic,
                node.mnemonic,
                local.index
            );
        }
        Ok(local)
    }

    /// Look up the local written by a store, declaring it if it is new
    ///
    /// New locals get the type from the inline declaration if there is one, otherwise
    /// `default_type`. Named locals are put in the first slot past every existing local.
    pub fn resolve_or_declare(
        &mut self,
        reference: &LocalReference,
        node: &InstructionNode,
        default_type: FieldType<BinaryName>,
    ) -> Result<LocalVariableInfo, Error> {
        let declaration = node.declaration.as_ref();
        if let Some(existing) = self.find(reference) {
            if let Some(LocalDeclaration { name, .. }) = declaration {
                if name != &existing.name {
                    log::warn!(
                        "{}: local {} is already named '{}', ignoring the name '{}'",
                        node.position,
                        existing.index,
                        existing.name,
                        name
                    );
                }
            }
            return Ok(existing.clone());
        }

        let descriptor = match declaration.and_then(|decl| decl.descriptor.as_ref()) {
            None => default_type,
            Some(descriptor) => {
                FieldType::parse(descriptor).map_err(|err| Error::BadDescriptor {
                    position: node.position,
                    descriptor: descriptor.clone(),
                    message: err.to_string(),
                })?
            }
        };

        let (name, index) = match reference {
            LocalReference::Index(index) => {
                let name = match declaration {
                    Some(decl) => decl.name.clone(),
                    None => format!("local{:05}", index),
                };
                (name, *index as usize)
            }
            LocalReference::Name(name) => {
                if let Some(decl) = declaration.filter(|decl| &decl.name != name) {
                    log::warn!(
                        "{}: local is referred to as '{}' but declared as '{}'",
                        node.position,
                        name,
                        decl.name
                    );
                }
                (name.clone(), self.next_index())
            }
        };
        if index + descriptor.width() > MAX_LOCALS {
            return Err(node.illegal(format!(
                "local '{}' of type {} at slot {} does not fit in {} local slots",
                name,
                descriptor.render(),
                index,
                MAX_LOCALS
            )));
        }

        let local = LocalVariableInfo {
            name,
            index: index as u16,
            descriptor,
            is_parameter: false,
        };
        log::debug!(
            "{}: declared local '{}' at slot {} with type {}",
            node.position,
            local.name,
            local.index,
            local.descriptor.render()
        );
        self.locals.push(local.clone());
        Ok(local)
    }

    /// First slot past every local (the second slot of a category 2 local is never handed out)
    pub fn next_index(&self) -> usize {
        self.locals
            .iter()
            .map(|local| local.index as usize + local.width())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compile::Operand;

    fn descriptor(params: Vec<FieldType<BinaryName>>) -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: params,
            return_type: None,
        }
    }

    #[test]
    fn parameters_take_their_width() {
        let resolver = LocalVariableResolver::for_method(
            Some(&BinaryName::STRING),
            &descriptor(vec![FieldType::long(), FieldType::int()]),
        );
        let slots: Vec<(String, u16)> = resolver
            .parameters()
            .map(|local| (local.name.clone(), local.index))
            .collect();
        assert_eq!(
            slots,
            vec![
                (String::from("this"), 0),
                (String::from("arg00000"), 1),
                (String::from("arg00001"), 3),
            ]
        );
        assert_eq!(resolver.next_index(), 4);
    }

    #[test]
    fn named_locals_past_the_last_slot() {
        let mut resolver = LocalVariableResolver::for_method(None, &descriptor(vec![]));
        let store = InstructionNode::new("istore").with_wide();
        resolver
            .resolve_or_declare(&LocalReference::Index(65534), &store, FieldType::int())
            .unwrap();
        assert_eq!(resolver.next_index(), 65535);

        let named = LocalReference::Name(String::from("x"));
        let store = InstructionNode::new("istore").with(Operand::Local(named.clone()));
        assert!(matches!(
            resolver.resolve_or_declare(&named, &store, FieldType::int()),
            Err(Error::IllegalInstruction { .. })
        ));
    }

    #[test]
    fn resolution() {
        let resolver =
            LocalVariableResolver::for_method(None, &descriptor(vec![FieldType::double()]));
        let position = SourcePosition::default();

        assert_eq!(
            resolver.resolve(&LocalReference::Index(0), "dload", position).unwrap().name,
            "arg00000"
        );
        assert!(matches!(
            resolver.resolve(&LocalReference::Index(1), "iload", position),
            Err(Error::UnknownLocalVariable { ref opcode, .. }) if opcode == "iload"
        ));
        assert!(resolver
            .resolve(&LocalReference::Name(String::from("count")), "iload", position)
            .is_err());
    }

    #[test]
    fn stores_declare_locals() {
        let mut resolver =
            LocalVariableResolver::for_method(None, &descriptor(vec![FieldType::long()]));

        let named = LocalReference::Name(String::from("count"));
        let store = InstructionNode::new("istore").with(Operand::Local(named.clone()));
        let count = resolver.resolve_or_declare(&named, &store, FieldType::int()).unwrap();
        assert_eq!(count.index, 2);
        assert_eq!(resolver.resolve_or_declare(&named, &store, FieldType::int()).unwrap(), count);

        let far = LocalReference::Index(300);
        let store = InstructionNode::new("astore")
            .with_wide()
            .declaring("names", Some(String::from("[Ljava/lang/String;")));
        let names = resolver
            .resolve_or_declare(&far, &store, FieldType::object(BinaryName::OBJECT))
            .unwrap();
        assert_eq!(names.name, "names");
        assert!(names.requires_wide());
        assert_eq!(names.descriptor.render(), "[Ljava/lang/String;");

        let last = LocalReference::Index(65534);
        let store = InstructionNode::new("lstore").with_wide();
        assert!(matches!(
            resolver.resolve_or_declare(&last, &store, FieldType::long()),
            Err(Error::IllegalInstruction { .. })
        ));
        let store = InstructionNode::new("istore").with_wide();
        assert_eq!(
            resolver.resolve_or_declare(&last, &store, FieldType::int()).unwrap().index,
            65534
        );

        let bad = InstructionNode::new("istore").declaring("x", Some(String::from("Q")));
        assert!(matches!(
            resolver.resolve_or_declare(&LocalReference::Index(9), &bad, FieldType::int()),
            Err(Error::BadDescriptor { .. })
        ));
    }
}

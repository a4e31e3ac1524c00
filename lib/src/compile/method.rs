use super::analyzer::{Analyzer, InstructionInfo};
use super::evaluator::{evaluate, EvaluatedInstruction, EvaluationContext};
use super::{Error, InstructionNode, LabelId, LabelTable, LocalVariableResolver, SourcePosition};
use crate::jvm::bytecode::{BranchInstruction, CodeInstruction, Instruction};
use crate::jvm::verifier::*;
use crate::jvm::*;
use crate::util::Width;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Local slots the parameters of a method may take, `this` included
const MAX_PARAMETER_SLOTS: usize = 255;

/// One line of a method body
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Label { name: String, position: SourcePosition },
    Instruction(InstructionNode),
}

/// Method to compile, as it comes out of the parser
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSource {
    /// Class the method belongs to
    pub class: BinaryName,
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub position: SourcePosition,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileSettings {
    /// Add a `return` at the end of `void` methods whose body would otherwise fall off the end
    pub append_implicit_return: bool,

    /// Warn about `iload 1` and friends, which have a shorter `iload_1` form
    pub warn_short_form_loads: bool,
}

impl Default for CompileSettings {
    fn default() -> Self {
        CompileSettings {
            append_implicit_return: true,
            warn_short_form_loads: true,
        }
    }
}

/// A method body, evaluated, checked, and encoded
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledMethod {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,
    pub max_stack: usize,
    pub max_locals: usize,
    pub instructions: Vec<InstructionInfo>,
    pub labels: LabelTable,

    /// Frame on entry to every reachable label
    pub label_frames: BTreeMap<LabelId, Frame>,

    /// Entries of the `StackMapTable` attribute
    pub stack_map: Vec<StackMapFrame<ResolvedType>>,

    /// Contents of the `Code` attribute's code array
    pub code: Vec<u8>,
}

impl CompiledMethod {
    /// Frame on entry to a named label (`None` if the label is unknown or unreachable)
    pub fn label_frame(&self, name: &str) -> Option<&Frame> {
        self.labels
            .lookup(name)
            .and_then(|label| self.label_frames.get(&label))
    }

    /// Serialized `StackMapTable` entries (without the attribute header)
    pub fn stack_map_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut bytes = vec![];
        (self.stack_map.len() as u16).serialize(&mut bytes)?;
        for entry in &self.stack_map {
            entry.serialize(&mut bytes)?;
        }
        Ok(bytes)
    }
}

/// Compiles method bodies, one at a time
pub struct MethodCompiler<'a> {
    settings: &'a CompileSettings,
}

impl<'a> MethodCompiler<'a> {
    pub fn new(settings: &'a CompileSettings) -> MethodCompiler<'a> {
        MethodCompiler { settings }
    }

    /// Compile a method, interning the constants it uses into the class constant pool
    pub fn compile(
        &self,
        source: &MethodSource,
        pool: &mut ConstantPool,
    ) -> Result<CompiledMethod, Error> {
        let bad_descriptor = |descriptor: &str, message: String| Error::BadDescriptor {
            position: source.position,
            descriptor: descriptor.to_owned(),
            message,
        };
        let name = UnqualifiedName::from_string(source.name.clone())
            .map_err(|message| bad_descriptor(&source.name, message))?;
        let descriptor = MethodDescriptor::parse(&source.descriptor)
            .map_err(|err| bad_descriptor(&source.descriptor, err.to_string()))?;
        let is_static = source.access_flags.contains(MethodAccessFlags::STATIC);
        if name.is_init() && (is_static || descriptor.return_type.is_some()) {
            let message = String::from("constructors must be non-static and return void");
            return Err(bad_descriptor(&source.descriptor, message));
        }
        if descriptor.parameter_length(!is_static) > MAX_PARAMETER_SLOTS {
            let message = format!("parameters take more than {} local slots", MAX_PARAMETER_SLOTS);
            return Err(bad_descriptor(&source.descriptor, message));
        }
        log::info!("compiling {}.{}{}", source.class, name, source.descriptor);

        let labels = self.declare_labels(source)?;
        let mut locals = LocalVariableResolver::for_method(
            if is_static { None } else { Some(&source.class) },
            &descriptor,
        );
        locals.warn_short_form_loads = self.settings.warn_short_form_loads;

        let mut body = BodyBuilder {
            labels,
            instructions: vec![],
            offset: 0,
            block: LabelId::START,
            after_branch: false,
        };
        let nodes = source.body.iter().filter_map(|statement| match statement {
            Statement::Instruction(node) => Some(node),
            Statement::Label { .. } => None,
        });
        for node in nodes {
            let id = InstructionId(body.instructions.len());
            let evaluated = {
                let mut ctx = EvaluationContext {
                    this_class: &source.class,
                    method_name: &name,
                    descriptor: &descriptor,
                    locals: &mut locals,
                    labels: &body.labels,
                    instruction: id,
                    offset: body.offset,
                };
                evaluate(&mut ctx, node)?
            };
            body.push(node.mnemonic.clone(), node.position, evaluated);
        }

        if self.settings.append_implicit_return
            && descriptor.return_type.is_none()
            && body.needs_return()
        {
            let position = body
                .instructions
                .last()
                .map_or(source.position, |insn| insn.position);
            log::debug!("{}: appending implicit return", position);
            let evaluated = EvaluatedInstruction {
                instruction: CodeInstruction::Branch(BranchInstruction::Return(None)),
                size: 1,
            };
            body.push(String::from("return"), position, evaluated);
        }

        if body.offset > u16::MAX as usize {
            return Err(Error::BranchOutOfRange {
                instruction: InstructionId(body.instructions.len() - 1),
                position: source.position,
                message: format!("method code is {} bytes long, more than 65535", body.offset),
            });
        }

        let BodyBuilder {
            labels,
            instructions,
            offset: code_length,
            ..
        } = body;

        let initial = entry_frame(&source.class, is_static, &name, &descriptor);
        let analysis = Analyzer::new(&instructions, &labels, &source.class).analyze(initial.clone())?;

        let unreachable = unreachable_ranges(&instructions, &analysis.label_frames);
        let stack_map = build_stack_map_table(
            &instructions,
            &labels,
            &analysis.label_frames,
            &unreachable,
            &initial,
            pool,
        )?;
        let mut code = encode(&instructions, &labels, code_length, pool)?;

        // The JVM checks unreachable code too, so it gets replaced by code that type checks
        let mut max_stack = analysis.max_stack;
        for range in &unreachable {
            log::debug!("replacing unreachable code at {}..{} with `athrow`", range.start, range.end);
            code[range.start..range.end - 1].fill(opcodes::NOP);
            code[range.end - 1] = opcodes::ATHROW;
            max_stack = max_stack.max(1);
        }

        log::info!(
            "compiled {}: {} bytes of code, {} stack map entries",
            name,
            code.len(),
            stack_map.len()
        );
        Ok(CompiledMethod {
            name,
            descriptor,
            access_flags: source.access_flags,
            max_stack,
            max_locals: analysis.max_locals,
            instructions,
            labels,
            label_frames: analysis.label_frames,
            stack_map,
            code,
        })
    }

    /// Declare every label up front so jumps can refer to labels further down
    fn declare_labels(&self, source: &MethodSource) -> Result<LabelTable, Error> {
        let mut labels = LabelTable::new();
        let mut instruction_count = 0;
        for statement in &source.body {
            match statement {
                Statement::Label { name, position } => {
                    labels.declare(name, *position, InstructionId(instruction_count))?;
                }
                Statement::Instruction(_) => instruction_count += 1,
            }
        }
        Ok(labels)
    }
}

/// Instructions evaluated so far, and the block they are being added to
struct BodyBuilder {
    labels: LabelTable,
    instructions: Vec<InstructionInfo>,
    offset: usize,
    block: LabelId,

    /// The previous instruction was a branch
    after_branch: bool,
}

impl BodyBuilder {
    fn push(&mut self, mnemonic: String, position: SourcePosition, evaluated: EvaluatedInstruction) {
        let id = InstructionId(self.instructions.len());
        if let Some(label) = self.labels.block_label(id) {
            self.block = label;
        } else if self.after_branch {
            self.block = self.labels.declare_anonymous(position, id);
        }
        self.after_branch = evaluated.instruction.as_branch().is_some();

        log::trace!("{} {} at offset {}", id, mnemonic, self.offset);
        let size = evaluated.size;
        self.instructions.push(InstructionInfo {
            id,
            mnemonic,
            position,
            offset: self.offset,
            block: self.block,
            evaluated,
        });
        self.offset += size;
    }

    /// Would execution run past the last instruction?
    fn needs_return(&self) -> bool {
        let end = InstructionId(self.instructions.len());
        let falls_through = self
            .instructions
            .last()
            .map_or(true, |insn| insn.evaluated.instruction.falls_through());
        falls_through || self.labels.block_label(end).is_some()
    }
}

/// Frame on entry to a method: `this` (if any) then the parameters in the locals, and an empty
/// stack
pub fn entry_frame(
    this_class: &BinaryName,
    is_static: bool,
    name: &UnqualifiedName,
    descriptor: &MethodDescriptor<BinaryName>,
) -> Frame {
    let mut frame = Frame::new();
    let mut index: u16 = 0;
    if !is_static {
        let this = if name.is_init() {
            StackElementType::UninitializedThis
        } else {
            StackElementType::Reference(RefType::Object(this_class.clone()))
        };
        frame.set_local(index, StackElement::new(this, None));
        index += 1;
    }
    for parameter in &descriptor.parameters {
        let element = StackElement::new(StackElementType::from(parameter.clone()), None);
        let width = element.width() as u16;
        frame.set_local(index, element);
        index += width;
    }
    frame
}

/// Bytecode ranges of the blocks that no path reaches
fn unreachable_ranges(
    instructions: &[InstructionInfo],
    label_frames: &BTreeMap<LabelId, Frame>,
) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = vec![];
    let mut previous_block = None;
    for insn in instructions {
        if label_frames.contains_key(&insn.block) {
            previous_block = None;
            continue;
        }
        let end = insn.offset + insn.evaluated.size;
        match ranges.last_mut() {
            Some(range) if previous_block == Some(insn.block) => range.end = end,
            _ => ranges.push(insn.offset..end),
        }
        previous_block = Some(insn.block);
    }
    ranges
}

/// Stack map entries for every label that is the target of a jump, and for every unreachable
/// block
///
/// Unreachable blocks are encoded as `nop`s followed by `athrow`, so their entry has no locals
/// and just a `java/lang/Throwable` on the stack.
fn build_stack_map_table(
    instructions: &[InstructionInfo],
    labels: &LabelTable,
    label_frames: &BTreeMap<LabelId, Frame>,
    unreachable: &[Range<usize>],
    initial: &Frame,
    pool: &mut ConstantPool,
) -> Result<Vec<StackMapFrame<ResolvedType>>, Error> {
    let jump_targets: BTreeSet<LabelId> = instructions
        .iter()
        .filter_map(|insn| insn.evaluated.instruction.as_branch())
        .flat_map(|branch| branch.jump_targets())
        .copied()
        .collect();

    let targets = jump_targets.into_iter().filter_map(|label| {
        let frame = label_frames.get(&label)?;
        let offset = instructions.get(labels.get(label).instruction.0)?.offset;
        Some((offset, frame))
    });

    let mut throwing = Frame::new();
    throwing.stack.push(StackElement::new(
        StackElementType::Reference(RefType::Object(BinaryName::THROWABLE)),
        None,
    ));
    let unreachable = unreachable.iter().map(|range| (range.start, &throwing));

    let mut resolved = vec![];
    for (offset, entry) in build_stack_map(initial, targets.chain(unreachable)) {
        log::trace!("stack map entry at {}: {:?}", offset, entry);
        let entry = entry.try_map(|ty| {
            ty.try_map(
                &mut |class: &RefType<BinaryName>| pool.class(class),
                &mut |site: &InstructionId| Ok(instructions[site.0].offset as u16),
            )
        })?;
        resolved.push(entry);
    }
    Ok(resolved)
}

/// Resolve constants and labels, then serialize the code array
fn encode(
    instructions: &[InstructionInfo],
    labels: &LabelTable,
    code_length: usize,
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, Error> {
    let target_offset = |label: &LabelId| -> Option<usize> {
        let instruction = labels.get(*label).instruction.0;
        instructions.get(instruction).map(|insn| insn.offset)
    };

    let mut code = Vec::with_capacity(code_length);
    for insn in instructions {
        let out_of_range = |message: String| Error::BranchOutOfRange {
            instruction: insn.id,
            position: insn.position,
            message,
        };

        let resolved: CodeInstruction<u16, i32> = match &insn.evaluated.instruction {
            CodeInstruction::Simple(simple) => {
                let simple = simple.map_constant(|constant| pool.intern(constant).map(|idx| idx.0))?;
                if let Instruction::Ldc(index) = &simple {
                    if *index > u8::MAX as u16 {
                        return Err(out_of_range(format!(
                            "constant pool index {} does not fit in `ldc`, use `ldc_w`",
                            index
                        )));
                    }
                }
                CodeInstruction::Simple(simple)
            }
            CodeInstruction::Branch(branch) => {
                let branch = branch.map_labels(|label| match target_offset(label) {
                    Some(target) => Ok(target as i32 - insn.offset as i32),
                    None => Err(Error::UnknownJump {
                        instruction: insn.id,
                        position: insn.position,
                        target: labels.get(*label).name.clone(),
                        label: Some(*label),
                    }),
                })?;
                let narrow_jump = match &branch {
                    BranchInstruction::If(_, jump)
                    | BranchInstruction::IfICmp(_, jump)
                    | BranchInstruction::IfACmp(_, jump)
                    | BranchInstruction::IfNull(_, jump)
                    | BranchInstruction::Goto(jump) => Some(*jump),
                    _ => None,
                };
                if let Some(jump) = narrow_jump {
                    if i16::try_from(jump).is_err() {
                        return Err(out_of_range(format!(
                            "`{}` jumps {} bytes, which needs a wide jump",
                            insn.mnemonic, jump
                        )));
                    }
                }
                CodeInstruction::Branch(branch)
            }
        };
        resolved.serialize_at(insn.offset, &mut code)?;
    }
    Ok(code)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entry_frames() {
        let class = BinaryName::from_string(String::from("demo/Point")).unwrap();
        let descriptor = MethodDescriptor::parse("(JLjava/lang/String;)V").unwrap();
        let name = UnqualifiedName::from_string(String::from("move")).unwrap();

        let frame = entry_frame(&class, false, &name, &descriptor);
        let locals: Vec<StackElementType> = frame.locals.iter().map(|local| local.ty.clone()).collect();
        assert_eq!(
            locals,
            vec![
                StackElementType::Reference(RefType::Object(class.clone())),
                StackElementType::Long,
                StackElementType::Top,
                StackElementType::Reference(RefType::Object(BinaryName::STRING)),
            ]
        );
        assert_eq!(frame.stack_depth(), 0);

        let frame = entry_frame(&class, true, &name, &descriptor);
        assert_eq!(frame.locals_len(), 3);

        let frame = entry_frame(&class, false, &UnqualifiedName::INIT, &descriptor);
        assert_eq!(frame.locals[0].ty, StackElementType::UninitializedThis);
    }
}

use super::evaluator::{frame_difference, EvaluatedInstruction};
use super::{Error, LabelId, LabelTable, SourcePosition};
use crate::jvm::verifier::*;
use crate::jvm::BinaryName;
use crate::util::Width;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One instruction of the method body, once evaluated
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionInfo {
    pub id: InstructionId,
    pub mnemonic: String,
    pub position: SourcePosition,

    /// Bytecode offset
    pub offset: usize,

    /// Label of the block this instruction is part of
    pub block: LabelId,

    pub evaluated: EvaluatedInstruction,
}

/// Outcome of analysing a method
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    /// Frame on entry to every reachable label
    pub label_frames: BTreeMap<LabelId, Frame>,

    /// Maximum depth of the stack, in slots
    pub max_stack: usize,

    /// Maximum number of local slots
    pub max_locals: usize,
}

/// Abstract interpreter checking the stack discipline of a method body
///
/// ### Frames at labels
///
/// A proper verifier would merge the frames reaching a label and iterate to a fixpoint. We don't:
/// the first frame to reach a label is recorded, and every other path reaching that label must
/// bring a compatible frame (see [`Frame::check_compatible`]). A loop whose back edge disagrees
/// with the frame on entry to the loop is rejected instead of widening the loop header's frame.
///
/// The one exception is the class of references, which compatibility ignores but the stack map
/// table does not. Those get widened at labels (see [`Frame::join_references`]), and the block
/// is simulated again so that the wider types flow on.
///
/// ### Visiting order
///
/// Blocks are simulated from the start of the method, following fall-through and jumps. Pending
/// blocks are processed in the order they were first reached. Each block is simulated with the
/// frame that first reached it, and again only if references in that frame got widened.
pub struct Analyzer<'a> {
    instructions: &'a [InstructionInfo],
    labels: &'a LabelTable,

    /// Class of `this`, needed when an uninitialized `this` gets initialized
    this_class: &'a BinaryName,

    /// Frames at the start of blocks (keyed by the first instruction of the block)
    block_frames: HashMap<InstructionId, Frame>,

    /// Blocks which have a frame, but haven't been simulated yet
    pending: VecDeque<InstructionId>,

    max_stack: usize,
    max_locals: usize,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        instructions: &'a [InstructionInfo],
        labels: &'a LabelTable,
        this_class: &'a BinaryName,
    ) -> Analyzer<'a> {
        Analyzer {
            instructions,
            labels,
            this_class,
            block_frames: HashMap::new(),
            pending: VecDeque::new(),
            max_stack: 0,
            max_locals: 0,
        }
    }

    /// Simulate every reachable block, starting from the entry frame
    pub fn analyze(mut self, initial: Frame) -> Result<Analysis, Error> {
        log::info!(
            "analysing {} instructions with entry frame {}",
            self.instructions.len(),
            initial
        );
        if self.instructions.is_empty() {
            return Err(Error::FallOffEnd {
                instruction: None,
                position: SourcePosition::default(),
            });
        }

        self.max_locals = initial.locals_len();
        self.propagate(LabelId::START, initial, None)?;
        while let Some(leader) = self.pending.pop_front() {
            self.simulate_block(leader)?;
        }

        let mut label_frames = BTreeMap::new();
        for (id, label) in self.labels.iter() {
            match self.block_frames.get(&label.instruction) {
                Some(frame) => {
                    label_frames.insert(id, frame.clone());
                }
                None if label.instruction.0 < self.instructions.len()
                    && self.labels.block_label(label.instruction) == Some(id) =>
                {
                    let count = self.instructions.iter().filter(|i| i.block == id).count();
                    log::warn!(
                        "{}: block '{}' is unreachable ({} instructions)",
                        label.position,
                        label.name,
                        count
                    );
                }
                None => (),
            }
        }

        log::info!(
            "analysis done: max stack {}, max locals {}",
            self.max_stack,
            self.max_locals
        );
        Ok(Analysis {
            label_frames,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
        })
    }

    /// Record a frame reaching a label, or check it against the frame already recorded
    ///
    /// `source` is the jumping instruction, and is `None` for fall-through.
    fn propagate(
        &mut self,
        label: LabelId,
        frame: Frame,
        source: Option<&InstructionInfo>,
    ) -> Result<(), Error> {
        let target = self.labels.get(label);
        let leader = target.instruction;
        if leader.0 >= self.instructions.len() {
            return Err(match source {
                Some(insn) => Error::UnknownJump {
                    instruction: insn.id,
                    position: insn.position,
                    target: target.name.clone(),
                    label: Some(label),
                },
                None => Error::FallOffEnd {
                    instruction: None,
                    position: target.position,
                },
            });
        }

        if let Some(expected) = self.block_frames.get_mut(&leader) {
            log::debug!("checking frame at '{}': {}", target.name, frame);
            expected.check_compatible(&frame).map_err(|mismatch| match mismatch {
                FrameMismatch::StackSize { .. } => Error::StackSizeDifferent {
                    label,
                    name: target.name.clone(),
                    position: target.position,
                    expected: expected.clone(),
                    actual: frame.clone(),
                },
                mismatch => Error::PropagationMismatch {
                    label,
                    name: target.name.clone(),
                    position: target.position,
                    expected: expected.clone(),
                    actual: frame.clone(),
                    mismatch,
                },
            })?;

            // Re-simulate so that the wider references reach the labels further on
            if expected.join_references(&frame) {
                log::debug!("widened references at '{}': {}", target.name, expected);
                if !self.pending.contains(&leader) {
                    self.pending.push_back(leader);
                }
            }
            return Ok(());
        }

        log::debug!("recording frame at '{}': {}", target.name, frame);
        self.block_frames.insert(leader, frame);
        self.pending.push_back(leader);
        Ok(())
    }

    fn simulate_block(&mut self, leader: InstructionId) -> Result<(), Error> {
        let mut frame = match self.block_frames.get(&leader) {
            Some(frame) => frame.clone(),
            None => return Ok(()),
        };
        log::debug!("simulating block at {}", leader);

        let instructions = self.instructions;
        let mut idx = leader.0;
        loop {
            let insn = &instructions[idx];
            self.apply(insn, &mut frame)?;
            log::trace!("{} {}: {}", insn.id, insn.mnemonic, frame);
            self.max_stack = self.max_stack.max(frame.stack_depth());
            self.max_locals = self.max_locals.max(frame.locals_len());

            let instruction = &insn.evaluated.instruction;
            if let Some(branch) = instruction.as_branch() {
                for target in branch.jump_targets() {
                    self.propagate(*target, frame.clone(), Some(insn))?;
                }
            }
            if !instruction.falls_through() {
                return Ok(());
            }

            idx += 1;
            if idx == instructions.len() {
                return Err(Error::FallOffEnd {
                    instruction: Some(insn.id),
                    position: insn.position,
                });
            }
            if let Some(next_block) = self.labels.block_label(InstructionId(idx)) {
                return self.propagate(next_block, frame, None);
            }
        }
    }

    /// Simulate one instruction
    fn apply(&self, insn: &InstructionInfo, frame: &mut Frame) -> Result<(), Error> {
        let change = match frame_difference(&insn.evaluated.instruction) {
            FrameDifference::Same => return Ok(()),
            FrameDifference::Change(change) => change,
        };

        let mut popped: Vec<Vec<StackElement>> = Vec::with_capacity(change.pops.len());
        for expected in &change.pops {
            popped.push(self.pop(insn, frame, expected)?);
        }

        if let Some(idx) = change.initialize {
            if let Some(receiver) = popped.get(idx).and_then(|group| group.first()) {
                frame.initialize(&receiver.ty, self.this_class);
            }
        }
        if let Some(index) = change.store {
            if let Some(value) = popped.first().and_then(|group| group.first()) {
                frame.set_local(index, value.clone());
            }
        }

        let produced = Some(insn.id);
        for pushed in &change.pushes {
            let ty = match pushed {
                PushedElement::Primitive(primitive) => StackElementType::from(*primitive),
                PushedElement::Null => StackElementType::Null,
                PushedElement::ObjectRef => StackElementType::ObjectRef,
                PushedElement::Reference(ref_type) => StackElementType::Reference(ref_type.clone()),
                PushedElement::Uninitialized(class) => StackElementType::Uninitialized {
                    class: class.clone(),
                    site: insn.id,
                },
                PushedElement::Popped(idx) => {
                    for element in popped.get(*idx).into_iter().flatten() {
                        frame.stack.push(element.clone());
                    }
                    continue;
                }
                PushedElement::Local { index, expected } => {
                    let actual = frame
                        .local(*index)
                        .map_or(StackElementType::Top, |local| local.ty.clone());
                    if !expected.accepts(&actual) {
                        return Err(Error::LocalElementMismatch {
                            instruction: insn.id,
                            position: insn.position,
                            index: *index,
                            expected: expected.clone(),
                            actual,
                        });
                    }
                    actual
                }
            };
            frame.stack.push(StackElement::new(ty, produced));
        }
        Ok(())
    }

    /// Pop values matching an expectation, returned in stack order
    fn pop(
        &self,
        insn: &InstructionInfo,
        frame: &mut Frame,
        expected: &ExpectedElement,
    ) -> Result<Vec<StackElement>, Error> {
        let slots = expected.width();
        let mut group = vec![];
        let mut taken = 0;
        while taken < slots {
            let element = match frame.stack.pop() {
                Some((_, _, element)) => element,
                None => {
                    return Err(Error::StackUnderflow {
                        instruction: insn.id,
                        position: insn.position,
                        mnemonic: insn.mnemonic.clone(),
                        expected: expected.clone(),
                    })
                }
            };
            taken += element.width();

            let fits = match expected {
                ExpectedElement::Slots(_) => taken <= slots,
                _ => expected.accepts(&element.ty),
            };
            if !fits {
                return Err(Error::StackElementMismatch {
                    instruction: insn.id,
                    position: insn.position,
                    mnemonic: insn.mnemonic.clone(),
                    producer: element.producer,
                    expected: expected.clone(),
                    actual: element.ty,
                });
            }
            group.push(element);
        }
        group.reverse();
        Ok(group)
    }
}

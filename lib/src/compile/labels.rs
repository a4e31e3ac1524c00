use super::{Error, SourcePosition};
use crate::jvm::verifier::InstructionId;
use std::collections::HashMap;
use std::fmt;

/// Handle to a label of the method being compiled
#[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct LabelId(pub usize);

impl LabelId {
    /// Label for the first instruction in the method
    pub const START: LabelId = LabelId(0);
}

impl fmt::Debug for LabelId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Program point that can be jumped to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelInfo {
    pub name: String,
    pub position: SourcePosition,

    /// First instruction after the label (one past the last instruction if the label is at the
    /// end of the method)
    pub instruction: InstructionId,

    /// Generated to start a block after a branch, rather than declared in the source
    pub anonymous: bool,
}

/// Labels of one method
///
/// The start label is always present. Named labels are unique, anonymous labels are named after
/// the instruction they point to.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelTable {
    labels: Vec<LabelInfo>,
    names: HashMap<String, LabelId>,
}

impl Default for LabelTable {
    fn default() -> Self {
        LabelTable::new()
    }
}

impl LabelTable {
    pub fn new() -> LabelTable {
        LabelTable {
            labels: vec![LabelInfo {
                name: String::from("<start>"),
                position: SourcePosition::default(),
                instruction: InstructionId(0),
                anonymous: true,
            }],
            names: HashMap::new(),
        }
    }

    /// Declare a named label right before `instruction`
    pub fn declare(
        &mut self,
        name: &str,
        position: SourcePosition,
        instruction: InstructionId,
    ) -> Result<LabelId, Error> {
        if self.names.contains_key(name) {
            return Err(Error::DuplicateLabel {
                name: name.to_owned(),
                position,
            });
        }
        let id = self.push(LabelInfo {
            name: name.to_owned(),
            position,
            instruction,
            anonymous: false,
        });
        self.names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Generate a label for a block that nothing names
    pub fn declare_anonymous(&mut self, position: SourcePosition, instruction: InstructionId) -> LabelId {
        self.push(LabelInfo {
            name: format!("<block at {}>", instruction.0),
            position,
            instruction,
            anonymous: true,
        })
    }

    fn push(&mut self, label: LabelInfo) -> LabelId {
        let id = LabelId(self.labels.len());
        self.labels.push(label);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<LabelId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: LabelId) -> &LabelInfo {
        &self.labels[id.0]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &LabelInfo)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (LabelId(idx), label))
    }

    /// Labels pointing at an instruction, in declaration order
    pub fn labels_at(&self, instruction: InstructionId) -> impl Iterator<Item = LabelId> + '_ {
        self.iter()
            .filter(move |(_, label)| label.instruction == instruction)
            .map(|(id, _)| id)
    }

    /// Label used to refer to the block starting at an instruction
    pub fn block_label(&self, instruction: InstructionId) -> Option<LabelId> {
        self.labels_at(instruction).next()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn declarations() {
        let mut labels = LabelTable::new();
        let position = SourcePosition::new(3, 1, 20);
        let head = labels.declare("head", position, InstructionId(0)).unwrap();
        let tail = labels.declare("tail", position, InstructionId(4)).unwrap();

        assert_eq!(labels.lookup("head"), Some(head));
        assert_eq!(labels.lookup("missing"), None);
        assert_eq!(labels.block_label(InstructionId(0)), Some(LabelId::START));
        assert_eq!(labels.labels_at(InstructionId(0)).collect::<Vec<_>>(), vec![LabelId::START, head]);
        assert_eq!(labels.get(tail).instruction, InstructionId(4));

        assert!(matches!(
            labels.declare("tail", position, InstructionId(5)),
            Err(Error::DuplicateLabel { .. })
        ));

        let anonymous = labels.declare_anonymous(position, InstructionId(2));
        assert!(labels.get(anonymous).anonymous);
        assert_eq!(labels.lookup(&labels.get(anonymous).name.clone()), None);
    }
}

//! Compilation of method bodies
//!
//! A method arrives as a list of labels and [`InstructionNode`]s. Compiling it happens in a few
//! passes:
//!
//!   1. labels are declared up front, so that jumps can refer to labels further down
//!   2. every node is evaluated into an instruction (see [`evaluator`]), which fixes its size and
//!      so the bytecode offset of the next instruction
//!   3. the [`Analyzer`] simulates the effect of every reachable instruction on the frame and
//!      checks that every path into a label agrees on the frame there
//!   4. the frames at jump targets become the stack map table, and the instructions are resolved
//!      against the constant pool and encoded
//!
//! Steps 1, 2, and 4 are driven by [`MethodCompiler`].

mod analyzer;
mod errors;
pub mod evaluator;
mod labels;
mod locals;
mod method;
mod node;

pub use analyzer::*;
pub use errors::*;
pub use labels::*;
pub use locals::*;
pub use method::*;
pub use node::*;

//! Abstract frames used to check the stack discipline of a method
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _frame_
//! (represented using [`Frame`]) and the set of frames for all possible jump targets in a method
//! is the _stack map table_ (see [`build_stack_map`]).
//!
//! Every instruction declares its effect on the frame as a [`FrameDifference`]: what it expects to
//! pop and what it pushes. The values in a frame are [`StackElement`]s, which remember the
//! instruction that produced them so that errors can point at the culprit.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod frame_difference;
mod stack_map;
mod types;

pub use frame::*;
pub use frame_difference::*;
pub use stack_map::*;
pub use types::*;

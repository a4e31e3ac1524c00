//! Backend of an assembler for JVM bytecode
//!
//! Method bodies written as symbolic instructions are checked for stack and local variable
//! consistency along every control flow path, then encoded into a code array along with the
//! stack map table the JVM verifier needs.

pub mod compile;
pub mod jvm;
pub mod util;

//! Models of the JVM pieces a method body is made of
//!
//! This covers names and descriptors, the bytecode instructions themselves (symbolic or resolved
//! against a constant pool), the constant pool, and the abstract frames used to verify methods
//! and build their stack map tables.
//!
//! ### Simple example
//!
//! Encoding the instruction `getstatic java/lang/System.out:Ljava/io/PrintStream;` needs the
//! field reference to be interned in a constant pool first:
//!
//! ```
//! use jalc::jvm::*;
//! use jalc::jvm::bytecode::Instruction;
//!
//! # fn encode() -> std::io::Result<()> {
//! let system = BinaryName::from_string(String::from("java/lang/System")).unwrap();
//! let print_stream = BinaryName::from_string(String::from("java/io/PrintStream")).unwrap();
//! let out = FieldRef {
//!     class: system,
//!     name: UnqualifiedName::from_string(String::from("out")).unwrap(),
//!     descriptor: FieldType::object(print_stream),
//! };
//!
//! let mut pool = ConstantPool::new();
//! let symbolic = Instruction::GetStatic(Constant::Field(out));
//! let resolved = symbolic
//!     .map_constant(|constant| pool.intern(constant).map(|index| index.0))
//!     .expect("pool has plenty of space");
//!
//! assert_eq!(resolved.to_bytes()?, vec![0xb2, 0x00, 0x06]);
//! # Ok(())
//! # }
//! # encode().unwrap();
//! ```

mod access_flags;
mod binary_format;
pub mod bytecode;
mod constants;
mod descriptors;
mod names;
pub mod opcodes;
pub mod verifier;

pub use access_flags::*;
pub use binary_format::*;
pub use constants::*;
pub use descriptors::*;
pub use names::*;

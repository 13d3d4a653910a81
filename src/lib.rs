//! A bytecode interpreter for Atto, a little dynamically-typed scripting
//! language.
//!
//! Source text is compiled in a single pass — no AST is ever built — straight
//! into a [Chunk][chunk::Chunk] of bytecode, which the [VM][vm::VM] then
//! executes against an operand stack and a global name table. The overall
//! shape follows the bytecode half of [Crafting Interpreters][book].
//!
//! [book]: https://craftinginterpreters.com/

pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod error;
pub mod scanner;
pub mod strings;
pub mod value;
pub mod vm;

mod byte_enum;

pub use error::InterpretationError;

/// The result of compiling or interpreting Atto source code.
pub type Result<T> = std::result::Result<T, InterpretationError>;

/// Re-exports common items.
///
/// The compiler, the VM, and the disassembler share a small vocabulary of
/// types; this module collects them so the rest of the crate (and embedders)
/// can import them in one line:
pub mod prelude {
    pub use crate::chunk::{Chunk, OpCode};
    pub use crate::error::InterpretationError;
    pub use crate::value::Value;
}

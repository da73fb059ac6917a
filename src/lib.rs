//! Single-pass JIT compiler for a tiny Lisp, targeting x86-64 Linux.
//!
//! A source program is read as s-expressions, translated directly into
//! machine code written into an executable memory region, and invoked
//! as a native function. Compiled code returns a tagged-immediate value
//! in the return register; pairs are bump-allocated from a
//! caller-provided heap addressed through `rsi`.
//!
//! ```no_run
//! use lisp_jit::prelude::*;
//!
//! let jit = Jit::default();
//! let unit = jit.compile("(let ((x 2) (y 3)) (+ x y))").unwrap();
//! let mut heap = jit.heap();
//! assert_eq!(Value::decode(unit.run(&mut heap)), Value::Fixnum(5));
//! ```

pub mod asm;
pub mod ast;
pub mod compiler;
pub mod consts;
pub mod env;
pub mod error;
pub mod jit;
pub mod memory;
pub mod reader;
pub mod value;

pub mod prelude {
    pub use crate::asm::{Emitter, Register};
    pub use crate::ast::AstNode;
    pub use crate::compiler::Compiler;
    pub use crate::env::{Bindings, Scope};
    pub use crate::error::CompileError;
    pub use crate::jit::{Executable, Jit, Params};
    pub use crate::memory::{BufferState, EntryFn, ExecBuffer, Heap};
    pub use crate::reader::Reader;
    pub use crate::value::{Value, Word};
}

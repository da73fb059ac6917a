//! Compilation driver and invocation
//!
//! Thin client over the pipeline: read a source string, compile it into
//! a fresh executable region, flip the region's protection, and hand
//! back a unit that can be invoked against a caller-owned heap.

use crate::asm::Emitter;
use crate::compiler::Compiler;
use crate::consts::{DEFAULT_CODE_CAPACITY, DEFAULT_HEAP_WORDS};
use crate::error::CompileError;
use crate::memory::{ExecBuffer, Heap};
use crate::reader::Reader;
use crate::value::Word;

use itertools::Itertools;
use tracing::debug;

use std::fmt;

/// Compilation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    code_capacity: usize,
    heap_words: usize,
}

impl Params {
    pub const DEFAULT: Self = Self {
        code_capacity: DEFAULT_CODE_CAPACITY,
        heap_words: DEFAULT_HEAP_WORDS,
    };

    /// Capacity of the executable region, in bytes.
    pub const fn code_capacity(&self) -> usize {
        self.code_capacity
    }

    /// Size of the heaps this configuration produces, in words.
    pub const fn heap_words(&self) -> usize {
        self.heap_words
    }

    pub const fn with_code_capacity(mut self, capacity: usize) -> Self {
        self.code_capacity = capacity;
        self
    }

    pub const fn with_heap_words(mut self, words: usize) -> Self {
        self.heap_words = words;
        self
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Turns source text into executable units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jit {
    params: Params,
}

impl Jit {
    pub const fn new(params: Params) -> Self {
        Self { params }
    }

    /// Compile one unit of source: a `(labels …)` program or a bare
    /// expression. The returned unit owns its region, already flipped
    /// to executable.
    pub fn compile(&self, source: &str) -> Result<Executable, CompileError> {
        let node = match Reader::new(source).read() {
            Some(node) => node,
            None => panic!("no form in source"),
        };

        let mut buffer = ExecBuffer::new(self.params.code_capacity);
        let len = {
            let mut compiler = Compiler::new(Emitter::new(&mut buffer));
            compiler.compile_program(&node)?;
            compiler.position()
        };
        debug!("compiled {} bytes", len);

        buffer.make_executable();
        Ok(Executable { buffer, len })
    }

    /// Fresh zeroed heap sized per the parameters.
    pub fn heap(&self) -> Heap {
        Heap::with_words(self.params.heap_words)
    }
}

/// A finished unit: the executable region and its emitted length.
pub struct Executable {
    buffer: ExecBuffer,
    len: usize,
}

impl Executable {
    /// The emitted machine code.
    pub fn code(&self) -> &[u8] {
        self.buffer.code(self.len)
    }

    /// Invoke the entry with `heap` as the allocation region.
    ///
    /// The compiled code bump-allocates pairs through the heap base with
    /// no bounds check; the heap must be sized for the executed path,
    /// two words per `cons` performed.
    pub fn run(&self, heap: &mut Heap) -> Word {
        // Safety: the region holds a complete unit ending in `ret`, and
        // the entry follows the sysv64 convention the type states.
        unsafe { (self.buffer.as_entry())(heap.base_ptr()) }
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Executable {{ {} }}",
            self.code()
                .iter()
                .format_with(" ", |byte, f| f(&format_args!("{:02x}", byte)))
        )
    }
}

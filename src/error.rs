//! Compile-time error implementation

use thiserror::Error;

/// Compile-time diagnostics reported back to the caller.
///
/// Only name-resolution failures are recoverable. Everything else the
/// pipeline can hit (a malformed form past the reader, encoder misuse,
/// a refused mapping, an exhausted code region) asserts instead:
/// compilation either produces a complete executable buffer or aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A variable reference with no binding in the locals chain.
    #[error("Unbound variable {0}")]
    UnboundVariable(String),
    /// A `labelcall` target with no binding in the labels chain.
    #[error("Unbound label {0}")]
    UnboundLabel(String),
}

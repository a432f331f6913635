//! VM Error Types
//!
//! Defines every error condition produced by the decoder, the disassembler
//! and the interpreter loop. All of them are terminal for the current run.

use thiserror::Error;

use crate::native::NativeError;

/// Which pool an operand indexed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Constant,
    Name,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Constant => write!(f, "constant"),
            PoolKind::Name => write!(f, "name"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VmError {
    // Decoding
    #[error("truncated instruction at offset {offset}: {available} byte(s) left, 2 needed")]
    Decode { offset: usize, available: usize },

    #[error("{opname} at offset {offset} needs {width} extension byte(s), only {available} left")]
    TruncatedExtension {
        opname: &'static str,
        offset: usize,
        width: usize,
        available: usize,
    },

    #[error("unsupported opcode {opcode} ({name}) at offset {offset}")]
    UnsupportedOpcode {
        opcode: u8,
        name: &'static str,
        offset: usize,
    },

    // Pools
    #[error("{pool} pool index {index} out of range (size {len})")]
    PoolIndex {
        pool: PoolKind,
        index: usize,
        len: usize,
    },

    #[error("{context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    // Stack
    #[error("stack underflow: {needed} value(s) needed, {available} available")]
    StackUnderflow { needed: usize, available: usize },

    #[error("stack overflow (capacity {0})")]
    StackOverflow(usize),

    // Environment
    #[error("name '{0}' is not defined")]
    UnresolvedName(String),

    // Calls
    #[error("'{0}' object is not callable")]
    NotCallable(&'static str),

    #[error("{callee}() failed: {source}")]
    NativeCall {
        callee: String,
        #[source]
        source: NativeError,
    },

    #[error("{function}() takes {expected} positional argument(s) but {given} were given")]
    ArityMismatch {
        function: String,
        expected: usize,
        given: usize,
    },

    #[error("maximum call depth exceeded ({0})")]
    CallDepthExceeded(usize),
}

impl VmError {
    /// Underflow for a single pop on an empty stack
    pub(crate) fn empty_stack() -> Self {
        VmError::StackUnderflow {
            needed: 1,
            available: 0,
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;

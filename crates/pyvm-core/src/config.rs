//! VM Configuration
//!
//! Defines runtime limits and encoding knobs for the virtual machine.
//! Configuration specifies constraints only; enforcement is handled by the VM.

use serde::{Deserialize, Serialize};

use crate::bytecode::decoder::OperandExtensions;

/// Where `CALL` finds its argument count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgCountSource {
    /// `constants[operand]` holds the count
    #[default]
    ConstantPool,
    /// The operand is the count itself (CPython 3.12 encoding)
    Operand,
}

/// VM Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum evaluation stack depth
    pub max_stack_size: usize,

    /// Maximum nesting of function calls
    pub max_call_depth: usize,

    /// Interpretation of the `CALL` operand
    pub arg_count_source: ArgCountSource,

    /// Opcodes followed by extra bytes after their operand
    pub operand_extensions: OperandExtensions,

    /// Keep a drainable per-instruction trace
    pub record_trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_stack_size: 10_000,
            max_call_depth: 256,
            arg_count_source: ArgCountSource::default(),
            operand_extensions: OperandExtensions::default(),
            record_trace: false,
        }
    }
}

impl VmConfig {
    /// Create a new configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }
}

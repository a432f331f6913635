//! Bytecode Instruction Representation
//!
//! A decoded instruction as produced by the decoder.
//! This layer contains no execution semantics.

use super::opcode::{self, OpCode};

/// Decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode
    pub offset: usize,
    /// Raw opcode byte
    pub opcode: u8,
    pub operand: u8,
    /// Bytes consumed, including operand-extension bytes
    pub size: usize,
}

impl Instruction {
    /// Offset of the following instruction
    pub fn next_offset(&self) -> usize {
        self.offset + self.size
    }

    /// Executable opcode, if this instruction is in the supported subset
    pub fn op(&self) -> Option<OpCode> {
        OpCode::from_u8(self.opcode)
    }

    pub fn name(&self) -> &'static str {
        opcode::name(self.opcode)
    }
}

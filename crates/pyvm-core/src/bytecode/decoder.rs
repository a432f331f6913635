//! Instruction Decoder
//!
//! Maps (instruction bytes, offset) to a decoded [`Instruction`]. Shared by
//! the disassembler and the interpreter so both walk the stream identically.
//!
//! The base encoding is two bytes, opcode then operand. Some opcodes are
//! followed by extra bytes whose content the VM ignores; in CPython 3.12
//! these are inline cache slots (`CALL` carries three, i.e. six bytes). The
//! widths live in an [`OperandExtensions`] table rather than in the loop so
//! another encoding version only needs a different table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::instruction::Instruction;
use super::opcode::{self, OpCode};
use crate::error::{VmError, VmResult};

/// Base width of every instruction
pub const INSTRUCTION_WIDTH: usize = 2;

/// Trailing bytes consumed by `CALL` in the 3.12 encoding
pub const CALL_EXTENSION_WIDTH: usize = 6;

/// Opcode -> number of trailing bytes after the operand
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "BTreeMap<String, usize>", into = "BTreeMap<String, usize>")]
pub struct OperandExtensions {
    widths: BTreeMap<u8, usize>,
}

impl Default for OperandExtensions {
    fn default() -> Self {
        let mut widths = BTreeMap::new();
        widths.insert(OpCode::Call as u8, CALL_EXTENSION_WIDTH);
        OperandExtensions { widths }
    }
}

impl OperandExtensions {
    /// Table with no extension opcodes
    pub fn none() -> Self {
        OperandExtensions {
            widths: BTreeMap::new(),
        }
    }

    /// Set the extension width of an opcode; zero removes it
    pub fn set(&mut self, opcode: u8, width: usize) {
        if width == 0 {
            self.widths.remove(&opcode);
        } else {
            self.widths.insert(opcode, width);
        }
    }

    pub fn width(&self, opcode: u8) -> usize {
        self.widths.get(&opcode).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        self.widths.iter().map(|(op, width)| (*op, *width))
    }
}

impl TryFrom<BTreeMap<String, usize>> for OperandExtensions {
    type Error = String;

    fn try_from(table: BTreeMap<String, usize>) -> Result<Self, Self::Error> {
        let mut extensions = OperandExtensions::none();
        for (name, width) in table {
            let op = opcode::from_name(&name)
                .or_else(|| name.parse::<u8>().ok())
                .ok_or_else(|| format!("unknown opcode in operand_extensions: {}", name))?;
            extensions.set(op, width);
        }
        Ok(extensions)
    }
}

impl From<OperandExtensions> for BTreeMap<String, usize> {
    fn from(extensions: OperandExtensions) -> Self {
        extensions
            .iter()
            .map(|(op, width)| (opcode::name(op).to_string(), width))
            .collect()
    }
}

/// Decode the instruction starting at `offset`
pub fn decode(
    code: &[u8],
    offset: usize,
    extensions: &OperandExtensions,
) -> VmResult<Instruction> {
    let available = code.len().saturating_sub(offset);
    if available < INSTRUCTION_WIDTH {
        return Err(VmError::Decode { offset, available });
    }

    let opcode = code[offset];
    let operand = code[offset + 1];

    let width = extensions.width(opcode);
    let remaining = available - INSTRUCTION_WIDTH;
    if remaining < width {
        return Err(VmError::TruncatedExtension {
            opname: opcode::name(opcode),
            offset,
            width,
            available: remaining,
        });
    }

    Ok(Instruction {
        offset,
        opcode,
        operand,
        size: INSTRUCTION_WIDTH + width,
    })
}

/// Iterator over every instruction of a byte stream
pub struct Decoder<'a> {
    code: &'a [u8],
    offset: usize,
    extensions: &'a OperandExtensions,
    failed: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(code: &'a [u8], extensions: &'a OperandExtensions) -> Self {
        Decoder {
            code,
            offset: 0,
            extensions,
            failed: false,
        }
    }
}

impl Iterator for Decoder<'_> {
    type Item = VmResult<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        match decode(self.code, self.offset, self.extensions) {
            Ok(instr) => {
                self.offset = instr.next_offset();
                Some(Ok(instr))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

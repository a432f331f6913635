//! Disassembler
//!
//! Walks a code object with the shared decoder and yields one record per
//! instruction, resolving pool operands for display. It never touches a
//! stack or an environment.

use std::fmt;
use std::rc::Rc;

use super::code::CodeObject;
use super::decoder::{Decoder, OperandExtensions};
use super::opcode::{self, OpCode, OperandKind};
use crate::error::VmResult;
use crate::vm::value::Value;

/// Pool entry an operand refers to
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Constant(Value),
    Name(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Constant(value) => f.write_str(&value.repr()),
            Argument::Name(name) => f.write_str(name),
        }
    }
}

/// One line of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct DisassembledInstruction {
    pub offset: usize,
    pub opcode: u8,
    pub opname: &'static str,
    pub operand: u8,
    pub size: usize,
    pub argument: Option<Argument>,
}

impl fmt::Display for DisassembledInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}: {} {}", self.offset, self.opname, self.operand)?;
        if let Some(arg) = &self.argument {
            write!(f, "\t# {}", arg)?;
        }
        Ok(())
    }
}

/// Lazy instruction listing of one code object
pub struct Disassembler<'a> {
    code: &'a CodeObject,
    decoder: Decoder<'a>,
    failed: bool,
}

impl<'a> Disassembler<'a> {
    pub fn new(code: &'a CodeObject, extensions: &'a OperandExtensions) -> Self {
        Disassembler {
            code,
            decoder: Decoder::new(code.code(), extensions),
            failed: false,
        }
    }

    fn resolve(&self, opcode: u8, operand: u8) -> VmResult<Option<Argument>> {
        let index = operand as usize;
        let kind = OpCode::from_u8(opcode).map(OpCode::operand_kind);
        Ok(match kind {
            Some(OperandKind::Constant) => {
                Some(Argument::Constant(self.code.constants().get(index)?.clone()))
            }
            Some(OperandKind::Name) => {
                Some(Argument::Name(self.code.names().get(index)?.to_string()))
            }
            Some(OperandKind::Plain) | None => None,
        })
    }
}

impl Iterator for Disassembler<'_> {
    type Item = VmResult<DisassembledInstruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let record = self.decoder.next()?.and_then(|instr| {
            let argument = self.resolve(instr.opcode, instr.operand)?;
            Ok(DisassembledInstruction {
                offset: instr.offset,
                opcode: instr.opcode,
                opname: opcode::name(instr.opcode),
                operand: instr.operand,
                size: instr.size,
                argument,
            })
        });
        self.failed = record.is_err();
        Some(record)
    }
}

/// Header block describing a code object's metadata and pools
pub struct CodeSummary<'a>(pub &'a CodeObject);

impl fmt::Display for CodeSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.0;
        writeln!(f, "Disassembling code object: {}", code.name())?;
        writeln!(f, "Filename: {}", code.filename())?;
        writeln!(f, "First Line Number: {}", code.first_line())?;
        writeln!(f, "Constants:")?;
        for (i, value) in code.constants().iter().enumerate() {
            writeln!(f, "{:4}: {}: {}", i, value.type_name(), value.repr())?;
        }
        writeln!(f, "Names:")?;
        for (i, name) in code.names().iter().enumerate() {
            writeln!(f, "{:4}: {}", i, name)?;
        }
        Ok(())
    }
}

/// Code objects held in the constant pool
pub fn nested_code(code: &CodeObject) -> impl Iterator<Item = &Rc<CodeObject>> {
    code.constants().iter().filter_map(Value::as_code)
}

/// Full text listing: summary, instructions, then nested code when `recursive`
pub fn listing(
    code: &CodeObject,
    extensions: &OperandExtensions,
    recursive: bool,
) -> VmResult<String> {
    let mut out = String::new();
    write_listing(&mut out, code, extensions, recursive)?;
    Ok(out)
}

fn write_listing(
    out: &mut String,
    code: &CodeObject,
    extensions: &OperandExtensions,
    recursive: bool,
) -> VmResult<()> {
    out.push_str(&CodeSummary(code).to_string());
    out.push_str("Bytecode:\n");
    for record in Disassembler::new(code, extensions) {
        out.push_str(&format!("{}\n", record?));
    }
    if recursive {
        for inner in nested_code(code) {
            out.push('\n');
            write_listing(out, inner, extensions, true)?;
        }
    }
    Ok(())
}

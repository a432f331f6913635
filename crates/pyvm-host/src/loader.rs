//! Code Object Loader
//!
//! Builds code objects from a JSON document and validates them before they
//! reach the VM. Instructions are given either as raw bytes or as an
//! assembly list of `["OPNAME", operand]` pairs; the assembler pads each
//! instruction with the same operand-extension bytes the decoder expects.
//!
//! ```json
//! {
//!   "name": "<module>",
//!   "filename": "hello.py",
//!   "constants": [1, 1],
//!   "names": ["print", "x"],
//!   "code": [["LOAD_CONST", 0], ["STORE_NAME", 1], ["PUSH_NULL", 0],
//!            ["LOAD_NAME", 0], ["LOAD_NAME", 1], ["CALL", 1]]
//! }
//! ```
//!
//! Validation is structural only: every instruction must decode and every
//! pool operand of a supported opcode must be in range.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use pyvm_core::bytecode::opcode::{self, OpCode, OperandKind};
use pyvm_core::bytecode::Decoder;
use pyvm_core::{CodeObject, OperandExtensions, Value, VmError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed code object document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown opcode '{opname}' in code object {code}")]
    UnknownOpcode { code: String, opname: String },

    #[error("code object {code} failed validation: {source}")]
    Invalid {
        code: String,
        #[source]
        source: VmError,
    },
}

/// Serialized form of a code object
#[derive(Debug, Deserialize)]
pub struct CodeDocument {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default = "default_first_line")]
    pub first_line: u32,
    #[serde(default)]
    pub arg_count: usize,
    #[serde(default)]
    pub constants: Vec<ConstantDocument>,
    #[serde(default)]
    pub names: Vec<String>,
    pub code: InstructionsDocument,
}

fn default_name() -> String {
    "<module>".to_string()
}

fn default_first_line() -> u32 {
    1
}

/// Constant pool entry; JSON shape selects the value kind
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ConstantDocument {
    Null,
    Integer(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<ConstantDocument>),
    Code(Box<CodeDocument>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InstructionsDocument {
    Bytes(Vec<u8>),
    Assembly(Vec<AsmInstruction>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AsmInstruction {
    WithOperand(String, u8),
    Bare(String),
}

impl AsmInstruction {
    fn parts(&self) -> (&str, u8) {
        match self {
            AsmInstruction::WithOperand(name, operand) => (name, *operand),
            AsmInstruction::Bare(name) => (name, 0),
        }
    }
}

impl CodeDocument {
    /// Build and validate the code object, nested code included
    pub fn into_code(self, extensions: &OperandExtensions) -> Result<CodeObject, LoadError> {
        let mut constants = Vec::with_capacity(self.constants.len());
        for constant in self.constants {
            constants.push(constant.into_value(extensions)?);
        }

        let bytes = match self.code {
            InstructionsDocument::Bytes(bytes) => bytes,
            InstructionsDocument::Assembly(lines) => assemble(&self.name, &lines, extensions)?,
        };

        let code = CodeObject::new(
            self.name,
            self.filename,
            self.first_line,
            constants,
            self.names,
            bytes,
        )
        .with_arg_count(self.arg_count);

        validate(&code, extensions).map_err(|source| LoadError::Invalid {
            code: code.name().to_string(),
            source,
        })?;
        debug!(
            code = code.name(),
            bytes = code.code().len(),
            constants = code.constants().len(),
            names = code.names().len(),
            "loaded code object"
        );
        Ok(code)
    }
}

impl ConstantDocument {
    fn into_value(self, extensions: &OperandExtensions) -> Result<Value, LoadError> {
        Ok(match self {
            ConstantDocument::Null => Value::None,
            ConstantDocument::Integer(n) => Value::Integer(n),
            ConstantDocument::Float(x) => Value::Float(x),
            ConstantDocument::Str(s) => Value::Str(s),
            ConstantDocument::Tuple(items) => Value::Tuple(
                items
                    .into_iter()
                    .map(|item| item.into_value(extensions))
                    .collect::<Result<_, _>>()?,
            ),
            ConstantDocument::Code(doc) => Value::CodeRef(Rc::new(doc.into_code(extensions)?)),
        })
    }
}

/// Encode assembly lines, padding extension opcodes with zero bytes
pub fn assemble(
    code_name: &str,
    lines: &[AsmInstruction],
    extensions: &OperandExtensions,
) -> Result<Vec<u8>, LoadError> {
    let mut bytes = Vec::with_capacity(lines.len() * 2);
    for line in lines {
        let (opname, operand) = line.parts();
        let op = opcode::from_name(opname).ok_or_else(|| LoadError::UnknownOpcode {
            code: code_name.to_string(),
            opname: opname.to_string(),
        })?;
        bytes.push(op);
        bytes.push(operand);
        bytes.resize(bytes.len() + extensions.width(op), 0);
    }
    Ok(bytes)
}

/// Structural check: every instruction decodes and pool operands are in range
pub fn validate(code: &CodeObject, extensions: &OperandExtensions) -> Result<(), VmError> {
    for instr in Decoder::new(code.code(), extensions) {
        let instr = instr?;
        let index = instr.operand as usize;
        match OpCode::from_u8(instr.opcode).map(OpCode::operand_kind) {
            Some(OperandKind::Constant) => {
                code.constants().get(index)?;
            }
            Some(OperandKind::Name) => {
                code.names().get(index)?;
            }
            Some(OperandKind::Plain) | None => {}
        }
    }
    Ok(())
}

/// Load a code object from a JSON string
pub fn load_str(json: &str, extensions: &OperandExtensions) -> Result<Rc<CodeObject>, LoadError> {
    let doc: CodeDocument = serde_json::from_str(json)?;
    Ok(Rc::new(doc.into_code(extensions)?))
}

/// Load a code object from a JSON file
pub fn load_path(path: &Path, extensions: &OperandExtensions) -> Result<Rc<CodeObject>, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&text, extensions)
}

//! Code Objects
//!
//! A compiled program unit: metadata, constant pool, name pool and the raw
//! instruction bytes. Built once by a loader and never mutated afterwards.

use crate::vm::memory::{ConstantPool, NamePool};
use crate::vm::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    name: String,
    filename: String,
    first_line: u32,
    arg_count: usize,
    constants: ConstantPool,
    names: NamePool,
    code: Vec<u8>,
}

impl CodeObject {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        first_line: u32,
        constants: Vec<Value>,
        names: Vec<String>,
        code: Vec<u8>,
    ) -> Self {
        CodeObject {
            name: name.into(),
            filename: filename.into(),
            first_line,
            arg_count: 0,
            constants: ConstantPool::new(constants),
            names: NamePool::new(names),
            code,
        }
    }

    /// Set the number of positional parameters the code expects
    pub fn with_arg_count(mut self, arg_count: usize) -> Self {
        self.arg_count = arg_count;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn names(&self) -> &NamePool {
        &self.names
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

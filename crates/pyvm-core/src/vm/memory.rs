//! VM Memory Model
//!
//! The global environment plus the two read-only pools a code object
//! carries. Pools are index-addressed; the environment is name-addressed.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{PoolKind, VmError, VmResult};
use crate::native::BuiltinTable;
use super::value::Value;

/// Environment handle shared between a run and the functions it creates
pub type SharedGlobals = Rc<RefCell<Globals>>;

/// Global (module-level) name bindings
#[derive(Debug, Default)]
pub struct Globals {
    bindings: IndexMap<String, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment pre-populated with every builtin
    pub fn seeded(builtins: &BuiltinTable) -> Self {
        let mut globals = Globals::new();
        globals.seed_from(builtins);
        globals
    }

    /// Copy every builtin into the environment, overwriting same-named bindings
    pub fn seed_from(&mut self, builtins: &BuiltinTable) {
        for (name, native) in builtins.iter() {
            self.bindings
                .insert(name.to_string(), Value::Native(Rc::clone(native)));
        }
        debug!(count = builtins.len(), "seeded globals from builtins");
    }

    pub fn lookup(&self, name: &str) -> VmResult<Value> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnresolvedName(name.to_string()))
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Remove a binding, returning the value it held
    pub fn unbind(&mut self, name: &str) -> VmResult<Value> {
        self.bindings
            .shift_remove(name)
            .ok_or_else(|| VmError::UnresolvedName(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bindings in the order they were first made
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn into_shared(self) -> SharedGlobals {
        Rc::new(RefCell::new(self))
    }
}

/// Constant pool (read-only)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    values: Vec<Value>,
}

impl ConstantPool {
    pub fn new(values: Vec<Value>) -> Self {
        ConstantPool { values }
    }

    pub fn get(&self, index: usize) -> VmResult<&Value> {
        self.values.get(index).ok_or(VmError::PoolIndex {
            pool: PoolKind::Constant,
            index,
            len: self.values.len(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Name pool (read-only)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePool {
    names: Vec<String>,
}

impl NamePool {
    pub fn new(names: Vec<String>) -> Self {
        NamePool { names }
    }

    pub fn get(&self, index: usize) -> VmResult<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or(VmError::PoolIndex {
                pool: PoolKind::Name,
                index,
                len: self.names.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

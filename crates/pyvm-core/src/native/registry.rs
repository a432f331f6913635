//! Builtins Table
//!
//! Name -> native callable table supplied by the host. The VM reads it once,
//! when a global environment is seeded.

use std::rc::Rc;

use indexmap::IndexMap;

use super::function::{NativeFunction, NativeResult};
use crate::vm::value::Value;

#[derive(Debug, Default, Clone)]
pub struct BuiltinTable {
    entries: IndexMap<String, Rc<NativeFunction>>,
}

impl BuiltinTable {
    /// New table is empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable under its own name, replacing any previous entry
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[Value]) -> NativeResult<Value> + 'static,
    {
        self.insert(Rc::new(NativeFunction::new(name, func)));
    }

    pub fn insert(&mut self, native: Rc<NativeFunction>) {
        self.entries.insert(native.name().to_string(), native);
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<NativeFunction>> {
        self.entries.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Rc<NativeFunction>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether `value` is this table's own callable for `name`
    ///
    /// A binding that merely shadows a builtin name is not.
    pub fn provides(&self, name: &str, value: &Value) -> bool {
        match (self.entries.get(name), value) {
            (Some(entry), Value::Native(native)) => Rc::ptr_eq(entry, native),
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<NativeFunction>)> {
        self.entries.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Native callables
//!
//! Opaque host functions the VM can invoke through `CALL`. The VM never
//! looks inside; it passes the ordered argument list and pushes the result.

use std::fmt;

use thiserror::Error;

use crate::vm::value::Value;

/// Failure reported by a native callable
#[derive(Debug, Error)]
pub enum NativeError {
    #[error("takes {expected} argument(s) but {given} were given")]
    Arity { expected: usize, given: usize },

    #[error("unsupported operand type: {0}")]
    Type(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type NativeResult<T> = Result<T, NativeError>;

type NativeFn = dyn Fn(&[Value]) -> NativeResult<Value>;

/// A named host callable
pub struct NativeFunction {
    name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> NativeResult<Value> + 'static,
    {
        NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> NativeResult<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeFunction").field(&self.name).finish()
    }
}

/// Check an exact argument count
pub fn expect_arity(args: &[Value], expected: usize) -> NativeResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(NativeError::Arity {
            expected,
            given: args.len(),
        })
    }
}

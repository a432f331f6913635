//! Runtime Value Representation
//!
//! Defines the values the virtual machine can hold on its stack, in its
//! constant pools and in the global environment.

use std::fmt;
use std::rc::Rc;

use crate::bytecode::code::CodeObject;
use crate::native::NativeFunction;

use super::memory::SharedGlobals;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),

    Float(f64),

    Str(String),

    /// The language-level `None`
    None,

    Tuple(Vec<Value>),

    /// Nested code object, usually a function body
    CodeRef(Rc<CodeObject>),

    /// Code bound to the environment it was created in
    Function(Function),

    /// Host-supplied callable
    Native(Rc<NativeFunction>),

    /// Absent slot; also the `PUSH_NULL` marker
    Undefined,
}

/// A function value.
///
/// The environment is aliased, not copied: bindings made after the function
/// was created are visible when it runs.
#[derive(Clone)]
pub struct Function {
    pub code: Rc<CodeObject>,
    pub captured_globals: SharedGlobals,
}

impl Function {
    pub fn new(code: Rc<CodeObject>, captured_globals: SharedGlobals) -> Self {
        Function {
            code,
            captured_globals,
        }
    }

    pub fn name(&self) -> &str {
        self.code.name()
    }
}

impl fmt::Debug for Function {
    // The environment may contain this function; printing it would recurse.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("code", &self.code.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::CodeRef(a), Value::CodeRef(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Function(a), Value::Function(b)) => {
                Rc::ptr_eq(&a.code, &b.code) && Rc::ptr_eq(&a.captured_globals, &b.captured_globals)
            }
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Undefined, Value::Undefined) => true,
            _ => false,
        }
    }
}

impl Value {
    /// Name of the value's type as the source language spells it
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::None => "NoneType",
            Value::Tuple(_) => "tuple",
            Value::CodeRef(_) => "code",
            Value::Function(_) => "function",
            Value::Native(_) => "builtin_function_or_method",
            Value::Undefined => "NULL",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&Rc<CodeObject>> {
        match self {
            Value::CodeRef(code) => Some(code),
            _ => None,
        }
    }

    /// `repr()`-style rendering: strings are quoted
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            _ => self.to_string(),
        }
    }
}

/// `str()`-style rendering
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::None => f.write_str("None"),
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                if inner.len() == 1 {
                    write!(f, "({},)", inner[0])
                } else {
                    write!(f, "({})", inner.join(", "))
                }
            }
            Value::CodeRef(code) => write!(
                f,
                "<code object {}, file \"{}\", line {}>",
                code.name(),
                code.filename(),
                code.first_line()
            ),
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Native(native) => write!(f, "<built-in function {}>", native.name()),
            Value::Undefined => f.write_str("<NULL>"),
        }
    }
}

/// Floats print with a trailing `.0` when integral, like the source language
fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

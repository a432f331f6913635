//! Builtins provider
//!
//! A small host-side builtins table. `print` writes to a caller-supplied
//! sink so embedders and tests can capture output.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use pyvm_core::native::{expect_arity, NativeError, NativeResult};
use pyvm_core::{BuiltinTable, Value};

/// Builtins printing to standard output
pub fn standard() -> BuiltinTable {
    with_output(Rc::new(RefCell::new(io::stdout())))
}

/// Builtins printing to `out`
pub fn with_output<W: Write + 'static>(out: Rc<RefCell<W>>) -> BuiltinTable {
    let mut table = BuiltinTable::new();
    table.register("print", move |args| print(&mut *out.borrow_mut(), args));
    table.register("len", len);
    table.register("repr", repr);
    table.register("str", stringify);
    table.register("abs", abs);
    table
}

fn print(out: &mut dyn Write, args: &[Value]) -> NativeResult<Value> {
    let line: Vec<String> = args.iter().map(Value::to_string).collect();
    writeln!(out, "{}", line.join(" "))?;
    out.flush()?;
    Ok(Value::None)
}

fn len(args: &[Value]) -> NativeResult<Value> {
    expect_arity(args, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Tuple(items) => items.len(),
        other => {
            return Err(NativeError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Integer(n as i64))
}

fn repr(args: &[Value]) -> NativeResult<Value> {
    expect_arity(args, 1)?;
    Ok(Value::Str(args[0].repr()))
}

fn stringify(args: &[Value]) -> NativeResult<Value> {
    match args {
        [] => Ok(Value::Str(String::new())),
        [value] => Ok(Value::Str(value.to_string())),
        _ => Err(NativeError::Arity {
            expected: 1,
            given: args.len(),
        }),
    }
}

fn abs(args: &[Value]) -> NativeResult<Value> {
    expect_arity(args, 1)?;
    match &args[0] {
        Value::Integer(n) => n
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| NativeError::Other("integer overflow in abs()".to_string())),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(NativeError::Type(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

pub mod function;
pub mod registry;

pub use function::{expect_arity, NativeError, NativeFunction, NativeResult};
pub use registry::BuiltinTable;

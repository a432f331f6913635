pub mod memory;
pub mod stack;
pub mod value;
pub mod vm;

pub use memory::{Globals, SharedGlobals};
pub use value::{Function, Value};
pub use vm::{TraceEntry, VirtualMachine};

//! pyvm host integration
//!
//! The collaborators the core leaves to its embedder: a loader that turns a
//! JSON code-object document into a validated [`CodeObject`], and a small
//! builtins table to seed the global environment with.
//!
//! [`CodeObject`]: pyvm_core::CodeObject

pub mod builtins;
pub mod loader;

pub use loader::{load_path, load_str, LoadError};

//! Sly: a security-first compiler and sandboxed runtime for the Sly
//! scripting language.
//!
//! The pipeline parses `.sly` sources into a positioned AST, runs three
//! static security analyses in parallel, lowers the validated AST to Python
//! with an enhanced source map, and executes the result in a
//! subprocess-isolated sandbox under token-based capability enforcement.

pub mod analyzer;
pub mod ast;
pub mod capability;
pub mod codegen;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod sandbox;

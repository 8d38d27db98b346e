//! Process-wide, read-mostly registries.
//!
//! All three tables are initialized once at startup and never written again:
//! the Allowed-Functions Registry (builtins the generator may emit), the
//! Safe-Attribute Registry (whitelisted `(type, attribute)` reads) and the
//! Stdlib Registry (named modules with per-symbol capability requirements and
//! taint summaries).

pub mod builtins;
pub mod safe_attrs;
pub mod stdlib;

pub use self::safe_attrs::SafeAttributeEntry;
pub use self::stdlib::{StdlibModule, StdlibSymbol};

/// Declared data-flow summary of a callable that the taint tracker cannot
/// see into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEffect {
    /// Neither introduces nor removes taint; result joins the arguments.
    Pure,
    /// Result is tainted with the named source kind.
    Source(&'static str),
    /// Passing a tainted argument is a critical violation of the named kind.
    Sink(&'static str),
    /// Result is sanitized regardless of argument taint.
    Sanitizer,
}

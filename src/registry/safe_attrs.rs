//! The Safe-Attribute Registry.
//!
//! Whitelist of `(type, attribute)` reads the runtime gate will serve.
//! Populated once at startup from the core entries plus one entry per stdlib
//! module symbol; read-only afterwards, so lookups need no locking. The same
//! table is serialized into the sandbox job so the Python-side gate enforces
//! exactly what the compiler assumed.
//!
//! Attributes following the host reflection convention (dunder-bounded
//! names) are rejected at the generator level and never reach this table.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::stdlib;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeAttributeEntry {
    pub type_name: String,
    pub attribute: String,
    pub allowed: bool,
    pub capabilities_required: Vec<String>,
}

fn entry(type_name: &str, attribute: &str, capabilities: &[&str]) -> SafeAttributeEntry {
    SafeAttributeEntry {
        type_name: type_name.to_owned(),
        attribute: attribute.to_owned(),
        allowed: true,
        capabilities_required: capabilities.iter().map(|c| (*c).to_owned()).collect(),
    }
}

static REGISTRY: Lazy<HashMap<(String, String), SafeAttributeEntry>> = Lazy::new(|| {
    let mut entries = vec![];

    // string methods
    for attribute in [
        "upper",
        "lower",
        "strip",
        "split",
        "join",
        "replace",
        "startswith",
        "endswith",
        "find",
    ] {
        entries.push(entry("string", attribute, &[]));
    }

    // compiled regex pattern objects
    for attribute in ["match", "search", "groups"] {
        entries.push(entry("regex_pattern", attribute, &["regex.match"]));
    }

    // datetime value objects
    for attribute in [
        "year", "month", "day", "hour", "minute", "second", "iso",
    ] {
        entries.push(entry("datetime_value", attribute, &[]));
    }

    // stdlib module namespaces: each exported symbol is a safe attribute of
    // its module, gated by the symbol's own capability at call time
    for module in stdlib::modules() {
        for symbol in module.symbols {
            let capabilities: Vec<&str> = symbol.required_capability.into_iter().collect();
            entries.push(entry(module.name, symbol.name, &capabilities));
        }
    }

    entries
        .into_iter()
        .map(|entry| {
            (
                (entry.type_name.clone(), entry.attribute.clone()),
                entry,
            )
        })
        .collect()
});

pub fn lookup(type_name: &str, attribute: &str) -> Option<&'static SafeAttributeEntry> {
    REGISTRY.get(&(type_name.to_owned(), attribute.to_owned()))
}

pub fn is_allowed(type_name: &str, attribute: &str) -> bool {
    lookup(type_name, attribute)
        .map(|entry| entry.allowed)
        .unwrap_or(false)
}

/// Snapshot of every entry, for serialization into the sandbox job.
pub fn entries() -> Vec<&'static SafeAttributeEntry> {
    let mut entries: Vec<_> = REGISTRY.values().collect();
    entries.sort_by(|a, b| {
        (&a.type_name, &a.attribute).cmp(&(&b.type_name, &b.attribute))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_methods_are_allowed() {
        assert!(is_allowed("string", "upper"));
        assert!(!is_allowed("string", "__class__"));
    }

    #[test]
    fn test_stdlib_symbols_are_module_attributes() {
        let entry = lookup("regex", "compile").unwrap();
        assert_eq!(entry.capabilities_required, vec!["regex.match"]);
    }

    #[test]
    fn test_unknown_attribute_is_denied() {
        assert!(!is_allowed("string", "mro"));
        assert!(!is_allowed("unknown_type", "anything"));
    }
}

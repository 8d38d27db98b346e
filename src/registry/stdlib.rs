//! The Stdlib Registry.
//!
//! Named modules with their exported symbols, the capability each symbol
//! requires and its taint summary. The import resolver consults this table
//! before falling back to the source tree, and the sandbox shim materializes
//! the same modules on the Python side.
//!
//! Capability requirements here are enforced at runtime even when static
//! analysis is disabled; `strict_security=false` turns off the analyzer, not
//! capability enforcement.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::CallEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdlibSymbol {
    pub name: &'static str,
    pub kind: ExportKind,
    pub required_capability: Option<&'static str>,
    pub effect: CallEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdlibModule {
    pub name: &'static str,
    pub symbols: &'static [StdlibSymbol],
}

impl StdlibModule {
    pub fn symbol(&self, name: &str) -> Option<&StdlibSymbol> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }

    /// Deduplicated capability types any of this module's symbols require.
    pub fn required_capabilities(&self) -> Vec<&'static str> {
        let mut capabilities: Vec<_> = self
            .symbols
            .iter()
            .filter_map(|symbol| symbol.required_capability)
            .collect();
        capabilities.sort_unstable();
        capabilities.dedup();
        capabilities
    }
}

const fn function(
    name: &'static str,
    required_capability: Option<&'static str>,
    effect: CallEffect,
) -> StdlibSymbol {
    StdlibSymbol {
        name,
        kind: ExportKind::Function,
        required_capability,
        effect,
    }
}

const fn constant(name: &'static str) -> StdlibSymbol {
    StdlibSymbol {
        name,
        kind: ExportKind::Constant,
        required_capability: None,
        effect: CallEffect::Pure,
    }
}

static MATH: StdlibModule = StdlibModule {
    name: "math",
    symbols: &[
        constant("pi"),
        constant("e"),
        function("floor", None, CallEffect::Pure),
        function("ceil", None, CallEffect::Pure),
        function("sqrt", None, CallEffect::Pure),
        function("pow", None, CallEffect::Pure),
        function("round", None, CallEffect::Pure),
    ],
};

static REGEX: StdlibModule = StdlibModule {
    name: "regex",
    symbols: &[
        function("compile", Some("regex.match"), CallEffect::Pure),
        function("match", Some("regex.match"), CallEffect::Pure),
        function("replace", Some("regex.match"), CallEffect::Pure),
        function("escape", None, CallEffect::Sanitizer),
    ],
};

static DATETIME: StdlibModule = StdlibModule {
    name: "datetime",
    symbols: &[
        function("now", Some("datetime.now"), CallEffect::Pure),
        function("timestamp", Some("datetime.now"), CallEffect::Pure),
    ],
};

static FS: StdlibModule = StdlibModule {
    name: "fs",
    symbols: &[
        function("read_file", Some("fs.read"), CallEffect::Source("filesystem")),
        function("write_file", Some("fs.write"), CallEffect::Sink("filesystem")),
        function("exists", Some("fs.read"), CallEffect::Pure),
        function("list_dir", Some("fs.read"), CallEffect::Source("filesystem")),
    ],
};

static NET: StdlibModule = StdlibModule {
    name: "net",
    symbols: &[
        function("fetch", Some("net.fetch"), CallEffect::Source("network")),
        function("post", Some("net.fetch"), CallEffect::Sink("network")),
    ],
};

static DB: StdlibModule = StdlibModule {
    name: "db",
    symbols: &[
        function("query", Some("db.query"), CallEffect::Sink("query")),
        function("execute", Some("db.query"), CallEffect::Sink("query")),
    ],
};

static MODULES: Lazy<HashMap<&'static str, &'static StdlibModule>> = Lazy::new(|| {
    let mut modules = HashMap::new();
    for module in [&MATH, &REGEX, &DATETIME, &FS, &NET, &DB] {
        modules.insert(module.name, module);
    }
    modules
});

pub fn lookup(name: &str) -> Option<&'static StdlibModule> {
    MODULES.get(name).copied()
}

pub fn symbol(module: &str, name: &str) -> Option<&'static StdlibSymbol> {
    lookup(module).and_then(|module| module.symbol(name))
}

pub fn modules() -> impl Iterator<Item = &'static StdlibModule> {
    MODULES.values().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_module() {
        let regex = lookup("regex").unwrap();
        assert_eq!(
            regex.symbol("compile").unwrap().required_capability,
            Some("regex.match")
        );
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn test_required_capabilities_are_deduplicated() {
        assert_eq!(FS.required_capabilities(), vec!["fs.read", "fs.write"]);
    }

    #[test]
    fn test_taint_roles() {
        assert_eq!(
            symbol("net", "fetch").unwrap().effect,
            CallEffect::Source("network")
        );
        assert_eq!(symbol("db", "query").unwrap().effect, CallEffect::Sink("query"));
        assert_eq!(symbol("regex", "escape").unwrap().effect, CallEffect::Sanitizer);
    }
}

//! Module/import resolution.
//!
//! Resolution order: stdlib registry, then the requesting unit's directory,
//! then user-configured extension paths. The resolver also surfaces a
//! module's required capabilities so the code generator can warn at compile
//! time about capabilities the runtime will demand.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::ast::Position;
use crate::registry::stdlib::{self, StdlibModule};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverErrorKind {
    UnknownModule { name: String },
    Cycle { chain: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverError {
    pub kind: ResolverErrorKind,
    pub position: Option<Position>,
}

impl ResolverError {
    pub fn unknown(name: &str, position: Option<Position>) -> Self {
        ResolverError {
            kind: ResolverErrorKind::UnknownModule {
                name: name.to_owned(),
            },
            position,
        }
    }

    pub fn cycle(chain: Vec<String>) -> Self {
        ResolverError {
            kind: ResolverErrorKind::Cycle { chain },
            position: None,
        }
    }
}

impl Display for ResolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ResolverErrorKind::UnknownModule { name } => {
                write!(f, "unknown module '{name}'")?;
            }
            ResolverErrorKind::Cycle { chain } => {
                write!(f, "circular import: {}", chain.join(" -> "))?;
            }
        }
        if let Some(position) = &self.position {
            write!(f, " ({position})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolverError {}

/// What an import name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleValue {
    Stdlib(&'static StdlibModule),
    Source(PathBuf),
}

impl ModuleValue {
    /// Capability types the module will demand at runtime (stdlib modules
    /// declare them per symbol; source modules demand none of their own).
    pub fn required_capabilities(&self) -> Vec<String> {
        match self {
            ModuleValue::Stdlib(module) => module
                .required_capabilities()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            ModuleValue::Source(_) => vec![],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    extension_paths: Vec<PathBuf>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    pub fn with_extension_paths(extension_paths: Vec<PathBuf>) -> Self {
        Resolver { extension_paths }
    }

    /// Resolve an import name for the given requesting unit.
    pub fn resolve(&self, name: &str, requesting: &Path) -> Result<ModuleValue, ResolverError> {
        trace!(
            "resolving module '{name}' for '{requesting}'",
            requesting = requesting.display()
        );

        if let Some(module) = stdlib::lookup(name) {
            return Ok(ModuleValue::Stdlib(module));
        }

        let file_name = format!("{name}.sly");
        let mut candidates = vec![];
        if let Some(dir) = requesting.parent() {
            candidates.push(dir.join(&file_name));
        }
        for extension in &self.extension_paths {
            candidates.push(extension.join(&file_name));
        }

        for candidate in candidates {
            if candidate.is_file() {
                debug!(
                    "module '{name}' resolved to source file '{path}'",
                    path = candidate.display()
                );
                return Ok(ModuleValue::Source(candidate));
            }
        }

        Err(ResolverError::unknown(name, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdlib_wins() {
        let resolver = Resolver::new();
        let value = resolver.resolve("math", Path::new("main.sly")).unwrap();
        assert!(matches!(value, ModuleValue::Stdlib(_)));
    }

    #[test]
    fn test_unknown_module() {
        let resolver = Resolver::new();
        let error = resolver
            .resolve("no_such_module", Path::new("main.sly"))
            .unwrap_err();
        assert!(matches!(
            error.kind,
            ResolverErrorKind::UnknownModule { .. }
        ));
    }

    #[test]
    fn test_source_tree_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join("helper.sly");
        std::fs::write(&helper, "x = 1;\n").unwrap();

        let resolver = Resolver::new();
        let requesting = dir.path().join("main.sly");
        let value = resolver.resolve("helper", &requesting).unwrap();
        assert_eq!(value, ModuleValue::Source(helper));
    }

    #[test]
    fn test_extension_path_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let ext = dir.path().join("lib");
        std::fs::create_dir_all(&ext).unwrap();
        std::fs::write(ext.join("shared.sly"), "x = 1;\n").unwrap();

        let resolver = Resolver::with_extension_paths(vec![ext.clone()]);
        let value = resolver
            .resolve("shared", Path::new("/elsewhere/main.sly"))
            .unwrap();
        assert_eq!(value, ModuleValue::Source(ext.join("shared.sly")));
    }

    #[test]
    fn test_stdlib_capabilities_surface() {
        let resolver = Resolver::new();
        let value = resolver.resolve("regex", Path::new("main.sly")).unwrap();
        assert_eq!(value.required_capabilities(), vec!["regex.match"]);
    }
}

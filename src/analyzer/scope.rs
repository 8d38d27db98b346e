use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Local,
    Parameter,
    Closure,
    Nonlocal,
    Global,
    Import,
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub id: usize,
    pub parent: Option<usize>,
    pub kind: ScopeKind,
    pub symbols: Vec<Symbol>,
}

/// Flattened view of all lexical scopes of one unit, kept in the analysis
/// cache alongside the violation list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub scopes: Vec<ScopeInfo>,
}

impl ScopeSummary {
    pub fn symbol_count(&self) -> usize {
        self.scopes.iter().map(|scope| scope.symbols.len()).sum()
    }
}

#[derive(Debug)]
struct Frame {
    id: usize,
    kind: ScopeKind,
    symbols: HashMap<String, SymbolKind>,
}

/// Lexical scope stack used during the AST walk.
///
/// Names resolve along the parent chain; a `nonlocal` declaration binds to
/// the nearest enclosing non-global scope defining the name.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
    summary: ScopeSummary,
}

impl ScopeStack {
    pub fn new() -> Self {
        let mut stack = ScopeStack {
            frames: vec![],
            summary: ScopeSummary::default(),
        };
        stack.push(ScopeKind::Global);
        stack
    }

    pub fn push(&mut self, kind: ScopeKind) -> usize {
        let id = self.summary.scopes.len();
        let parent = self.frames.last().map(|frame| frame.id);
        self.summary.scopes.push(ScopeInfo {
            id,
            parent,
            kind,
            symbols: vec![],
        });
        self.frames.push(Frame {
            id,
            kind,
            symbols: HashMap::new(),
        });
        id
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn current_id(&self) -> usize {
        self.frames.last().map(|frame| frame.id).unwrap_or(0)
    }

    pub fn in_function(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.kind == ScopeKind::Function)
    }

    /// Bind a name in the current frame.
    pub fn declare(&mut self, name: &str, kind: SymbolKind) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if frame.symbols.insert(name.to_owned(), kind).is_none() {
            self.summary.scopes[frame.id].symbols.push(Symbol {
                name: name.to_owned(),
                kind,
            });
        }
    }

    /// Whether the current frame already binds this name.
    pub fn declared_here(&self, name: &str) -> bool {
        self.frames
            .last()
            .map(|frame| frame.symbols.contains_key(name))
            .unwrap_or(false)
    }

    /// Resolve a name along the parent chain, adjusting the kind for the
    /// observer: a binding from an enclosing function is seen as a closure
    /// capture, a module-level binding as global.
    pub fn resolve(&self, name: &str) -> Option<SymbolKind> {
        let mut crossed_function = false;
        for frame in self.frames.iter().rev() {
            if let Some(kind) = frame.symbols.get(name) {
                return Some(match kind {
                    SymbolKind::Import => SymbolKind::Import,
                    SymbolKind::Builtin => SymbolKind::Builtin,
                    _ if crossed_function && frame.kind == ScopeKind::Global => {
                        SymbolKind::Global
                    }
                    _ if crossed_function => SymbolKind::Closure,
                    other => *other,
                });
            }
            if frame.kind == ScopeKind::Function {
                crossed_function = true;
            }
        }
        None
    }

    /// Find the nearest enclosing non-global scope (skipping the current
    /// function frame) that defines `name`, per `nonlocal` semantics.
    pub fn nonlocal_target(&self, name: &str) -> Option<usize> {
        let mut frames = self.frames.iter().rev();
        // skip frames of the current function, the `nonlocal` must bind outside it
        for frame in frames.by_ref() {
            if frame.kind == ScopeKind::Function {
                break;
            }
        }
        for frame in frames {
            if frame.kind == ScopeKind::Global {
                return None;
            }
            if frame.symbols.contains_key(name) {
                return Some(frame.id);
            }
        }
        None
    }

    pub fn into_summary(self) -> ScopeSummary {
        self.summary
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_along_parent_chain() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", SymbolKind::Local);
        scopes.push(ScopeKind::Function);
        assert_eq!(scopes.resolve("x"), Some(SymbolKind::Global));
        assert_eq!(scopes.resolve("missing"), None);
    }

    #[test]
    fn test_closure_capture_kind() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.declare("captured", SymbolKind::Local);
        scopes.push(ScopeKind::Function);
        assert_eq!(scopes.resolve("captured"), Some(SymbolKind::Closure));
    }

    #[test]
    fn test_nonlocal_target() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.declare("counter", SymbolKind::Local);
        scopes.push(ScopeKind::Function);
        assert!(scopes.nonlocal_target("counter").is_some());
        assert!(scopes.nonlocal_target("missing").is_none());
    }

    #[test]
    fn test_nonlocal_never_binds_global() {
        let mut scopes = ScopeStack::new();
        scopes.declare("g", SymbolKind::Local);
        scopes.push(ScopeKind::Function);
        assert!(scopes.nonlocal_target("g").is_none());
    }
}

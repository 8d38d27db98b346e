//! Hierarchical capability contexts and the thread-local current context.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::SystemTime;

use log::{debug, trace};
use serde::Serialize;

use super::{CapabilityError, CapabilityToken};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    Main,
    Sandbox,
    Repl,
    Test,
}

impl Display for ExecutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExecutionKind::Main => "main",
            ExecutionKind::Sandbox => "sandbox",
            ExecutionKind::Repl => "repl",
            ExecutionKind::Test => "test",
        })
    }
}

/// A scoped container of capability tokens with a parent link.
///
/// `has_capability` holds iff a valid token of the type is present here or in
/// an ancestor. The token map locks internally, making `add_capability`,
/// `has_capability`, `use_capability` and `get_all_capabilities` linearizable
/// with respect to one another.
#[derive(Debug)]
pub struct CapabilityContext {
    pub id: u64,
    parent: Option<Arc<CapabilityContext>>,
    tokens: Mutex<BTreeMap<String, CapabilityToken>>,
    pub execution_kind: ExecutionKind,
    pub owning_thread: ThreadId,
}

impl CapabilityContext {
    pub fn new(execution_kind: ExecutionKind) -> Arc<Self> {
        Arc::new(CapabilityContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
            tokens: Mutex::new(BTreeMap::new()),
            execution_kind,
            owning_thread: std::thread::current().id(),
        })
    }

    /// Create a child context inheriting this one's capabilities by lookup.
    pub fn child(self: &Arc<Self>, execution_kind: ExecutionKind) -> Arc<Self> {
        Arc::new(CapabilityContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: Some(Arc::clone(self)),
            tokens: Mutex::new(BTreeMap::new()),
            execution_kind,
            owning_thread: std::thread::current().id(),
        })
    }

    /// Canonical boundary against mis-configuration: the token is validated
    /// before it enters the context.
    pub fn add_capability(&self, token: CapabilityToken) -> Result<(), CapabilityError> {
        token.validate()?;
        trace!(
            "context {}: adding capability '{}'",
            self.id,
            token.token_type
        );
        let mut tokens = self.lock_tokens();
        tokens.insert(token.token_type.clone(), token);
        Ok(())
    }

    pub fn has_capability(&self, token_type: &str, check_parents: bool) -> bool {
        {
            let tokens = self.lock_tokens();
            if let Some(token) = tokens.get(token_type) {
                if token.is_valid() {
                    return true;
                }
            }
        }
        if check_parents {
            if let Some(parent) = &self.parent {
                return parent.has_capability(token_type, true);
            }
        }
        false
    }

    /// Check `operation` and `resource` against the named token and count the
    /// use. The token is consumed where it is found along the ancestor chain.
    pub fn use_capability(
        &self,
        token_type: &str,
        operation: &str,
        resource: &str,
    ) -> Result<(), CapabilityError> {
        {
            let mut tokens = self.lock_tokens();
            if let Some(token) = tokens.get_mut(token_type) {
                return Self::consume(token, operation, resource);
            }
        }
        match &self.parent {
            Some(parent) => parent.use_capability(token_type, operation, resource),
            None => Err(CapabilityError::Missing {
                capability: token_type.to_owned(),
            }),
        }
    }

    fn consume(
        token: &mut CapabilityToken,
        operation: &str,
        resource: &str,
    ) -> Result<(), CapabilityError> {
        if token.is_expired() {
            return Err(CapabilityError::Expired {
                capability: token.token_type.clone(),
            });
        }
        if token.usage_exhausted() {
            return Err(CapabilityError::UsageExceeded {
                capability: token.token_type.clone(),
                limit: token.constraints.max_usage_count.unwrap_or(0),
            });
        }
        if !token.allows_operation(operation) {
            return Err(CapabilityError::OperationNotAllowed {
                capability: token.token_type.clone(),
                operation: operation.to_owned(),
            });
        }
        if !token.matches_resource(resource) {
            return Err(CapabilityError::PatternMismatch {
                capability: token.token_type.clone(),
                resource: resource.to_owned(),
            });
        }

        token.usage_count += 1;
        Ok(())
    }

    /// Snapshot of the valid tokens, child entries shadowing parent entries.
    ///
    /// Expired entries seen during iteration are queued and removed only
    /// after iteration completes; the map is never mutated mid-walk.
    pub fn get_all_capabilities(&self, include_parents: bool) -> Vec<CapabilityToken> {
        let mut found = BTreeMap::new();
        self.collect_valid(include_parents, &mut found);
        found.into_values().collect()
    }

    fn collect_valid(&self, include_parents: bool, found: &mut BTreeMap<String, CapabilityToken>) {
        let mut expired = vec![];
        {
            let tokens = self.lock_tokens();
            for (token_type, token) in tokens.iter() {
                if token.is_valid() {
                    found
                        .entry(token_type.clone())
                        .or_insert_with(|| token.clone());
                } else if token.is_expired() {
                    expired.push(token_type.clone());
                }
            }
        }
        if !expired.is_empty() {
            let mut tokens = self.lock_tokens();
            for token_type in expired {
                debug!("context {}: dropping expired capability '{token_type}'", self.id);
                tokens.remove(&token_type);
            }
        }

        if include_parents {
            if let Some(parent) = &self.parent {
                parent.collect_valid(true, found);
            }
        }
    }

    /// Return a token even when expired or exhausted. Introspection only,
    /// never enforcement.
    pub fn get_capability_token_unchecked(&self, token_type: &str) -> Option<CapabilityToken> {
        {
            let tokens = self.lock_tokens();
            if let Some(token) = tokens.get(token_type) {
                return Some(token.clone());
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.get_capability_token_unchecked(token_type))
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CapabilityToken>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Vec<Arc<CapabilityContext>>> = const { RefCell::new(Vec::new()) };
}

/// Enter a context for the current thread; the returned guard restores the
/// previous context on drop, on every exit path.
#[must_use = "the context is exited when the guard drops"]
pub struct ContextGuard {
    _private: (),
}

pub fn enter_context(context: Arc<CapabilityContext>) -> ContextGuard {
    CURRENT.with(|current| current.borrow_mut().push(context));
    ContextGuard { _private: () }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| {
            current.borrow_mut().pop();
        });
    }
}

pub fn current_context() -> Option<Arc<CapabilityContext>> {
    CURRENT.with(|current| current.borrow().last().cloned())
}

/// Shape returned by [`describe_capability`].
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDescription {
    #[serde(rename = "type")]
    pub token_type: String,
    pub available: bool,
    pub usage_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_usage: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
}

/// `has_capability(name)` against the current context; `false` without one.
pub fn has_capability(name: &str) -> bool {
    current_context()
        .map(|context| context.has_capability(name, true))
        .unwrap_or(false)
}

/// Sorted, deduplicated capability names, inherited ones included; empty
/// without a current context.
pub fn list_capabilities() -> Vec<String> {
    let Some(context) = current_context() else {
        return vec![];
    };
    context
        .get_all_capabilities(true)
        .into_iter()
        .map(|token| token.token_type)
        .collect()
}

/// Description of one capability, expired tokens included (marked
/// unavailable); `None` without a current context or for an unknown name.
pub fn describe_capability(name: &str) -> Option<CapabilityDescription> {
    let context = current_context()?;
    let token = context.get_capability_token_unchecked(name)?;

    Some(CapabilityDescription {
        available: token.is_valid(),
        usage_count: token.usage_count,
        patterns: if token.constraints.resource_patterns.is_empty() {
            None
        } else {
            Some(token.constraints.resource_patterns.clone())
        },
        operations: if token.constraints.allowed_operations.is_empty() {
            None
        } else {
            Some(token.constraints.allowed_operations.iter().cloned().collect())
        },
        max_usage: token.constraints.max_usage_count,
        expires_at: token.constraints.expires_at,
        token_type: token.token_type,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::capability::Constraints;

    #[test]
    fn test_has_capability_traverses_parents() {
        let parent = CapabilityContext::new(ExecutionKind::Test);
        parent
            .add_capability(CapabilityToken::unrestricted("fs.read"))
            .unwrap();
        let child = parent.child(ExecutionKind::Sandbox);

        assert!(child.has_capability("fs.read", true));
        assert!(!child.has_capability("fs.read", false));
        assert!(!child.has_capability("fs.write", true));
    }

    #[test]
    fn test_add_rejects_expired_token() {
        let context = CapabilityContext::new(ExecutionKind::Test);
        let mut token = CapabilityToken::unrestricted("fs.read");
        token.constraints.expires_at = Some(SystemTime::now() - Duration::from_secs(1));
        assert!(matches!(
            context.add_capability(token),
            Err(CapabilityError::Expired { .. })
        ));
    }

    #[test]
    fn test_use_capability_checks_operation_and_resource() {
        let context = CapabilityContext::new(ExecutionKind::Test);
        let token = CapabilityToken::new(
            "file_access",
            Constraints {
                resource_patterns: vec!["/tmp/**".to_owned()],
                allowed_operations: ["read".to_owned()].into(),
                max_usage_count: None,
                expires_at: None,
            },
        );
        context.add_capability(token).unwrap();

        assert!(context.use_capability("file_access", "read", "/tmp/a").is_ok());
        assert!(matches!(
            context.use_capability("file_access", "write", "/tmp/a"),
            Err(CapabilityError::OperationNotAllowed { .. })
        ));
        assert!(matches!(
            context.use_capability("file_access", "read", "/etc/passwd"),
            Err(CapabilityError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_usage_limit_is_enforced_exactly() {
        let context = CapabilityContext::new(ExecutionKind::Test);
        context
            .add_capability(CapabilityToken::unrestricted("net.fetch").with_max_usage(3))
            .unwrap();

        for _ in 0..3 {
            context.use_capability("net.fetch", "fetch", "https://x").unwrap();
        }
        assert!(matches!(
            context.use_capability("net.fetch", "fetch", "https://x"),
            Err(CapabilityError::UsageExceeded { limit: 3, .. })
        ));
    }

    #[test]
    fn test_snapshot_purges_expired_but_unchecked_still_sees_them() {
        let context = CapabilityContext::new(ExecutionKind::Test);
        context
            .add_capability(CapabilityToken::unrestricted("fs.read"))
            .unwrap();
        {
            // bypass add-time validation to plant an already-expired token
            let mut tokens = context.lock_tokens();
            let mut expired = CapabilityToken::unrestricted("net.fetch");
            expired.constraints.expires_at = Some(SystemTime::now() - Duration::from_secs(1));
            tokens.insert("net.fetch".to_owned(), expired);
        }

        let snapshot = context.get_all_capabilities(true);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].token_type, "fs.read");

        // purged from the map, hence invisible to the unchecked accessor too
        assert!(context.get_capability_token_unchecked("net.fetch").is_none());
    }

    #[test]
    fn test_unchecked_accessor_reports_exhausted_tokens() {
        let context = CapabilityContext::new(ExecutionKind::Test);
        context
            .add_capability(CapabilityToken::unrestricted("net.fetch").with_max_usage(1))
            .unwrap();
        context.use_capability("net.fetch", "fetch", "x").unwrap();

        let token = context.get_capability_token_unchecked("net.fetch").unwrap();
        assert_eq!(token.usage_count, 1);
        assert!(!token.is_valid());
        assert!(!context.has_capability("net.fetch", true));
    }

    #[test]
    fn test_introspection_without_context() {
        assert!(!has_capability("fs.read"));
        assert!(list_capabilities().is_empty());
        assert!(describe_capability("fs.read").is_none());
    }

    #[test]
    fn test_context_guard_restores_previous() {
        let outer = CapabilityContext::new(ExecutionKind::Test);
        outer
            .add_capability(CapabilityToken::unrestricted("outer.cap"))
            .unwrap();

        let _outer_guard = enter_context(Arc::clone(&outer));
        assert!(has_capability("outer.cap"));

        {
            let inner = CapabilityContext::new(ExecutionKind::Test);
            let _inner_guard = enter_context(inner);
            assert!(!has_capability("outer.cap"));
        }

        assert!(has_capability("outer.cap"));
    }

    #[test]
    fn test_list_capabilities_includes_inherited() {
        let parent = CapabilityContext::new(ExecutionKind::Test);
        parent
            .add_capability(CapabilityToken::unrestricted("fs.read"))
            .unwrap();
        let child = parent.child(ExecutionKind::Sandbox);
        child
            .add_capability(CapabilityToken::unrestricted("net.fetch"))
            .unwrap();

        let _guard = enter_context(child);
        assert_eq!(list_capabilities(), vec!["fs.read", "net.fetch"]);
    }
}

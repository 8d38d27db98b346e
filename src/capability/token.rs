use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::ast::CapabilityDecl;

use super::{CapabilityError, ResourcePattern};

/// Constraints a token places on its use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Glob patterns for acceptable resources; empty means unconstrained.
    pub resource_patterns: Vec<String>,
    /// Operations the token permits; empty means unconstrained.
    pub allowed_operations: BTreeSet<String>,
    pub max_usage_count: Option<u64>,
    pub expires_at: Option<SystemTime>,
}

/// A value granting one kind of access under stated constraints.
///
/// Tokens are value types; identity is irrelevant. A token is valid while its
/// usage count stays under `max_usage_count` (when set) and `expires_at`
/// (when set) lies in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub token_type: String,
    pub constraints: Constraints,
    pub metadata: BTreeMap<String, String>,
    pub usage_count: u64,
}

impl CapabilityToken {
    pub fn new(token_type: impl Into<String>, constraints: Constraints) -> Self {
        CapabilityToken {
            token_type: token_type.into(),
            constraints,
            metadata: BTreeMap::new(),
            usage_count: 0,
        }
    }

    /// Unconstrained token of the given type.
    pub fn unrestricted(token_type: impl Into<String>) -> Self {
        Self::new(token_type, Constraints::default())
    }

    pub fn with_expiry(mut self, from_now: Duration) -> Self {
        self.constraints.expires_at = Some(SystemTime::now() + from_now);
        self
    }

    pub fn with_max_usage(mut self, count: u64) -> Self {
        self.constraints.max_usage_count = Some(count);
        self
    }

    /// Materialize a source-level `capability` block into a token.
    ///
    /// `resource` rules and `allow` targets both contribute resource
    /// patterns; `allow` operations become the allowed-operation set.
    pub fn from_declaration(decl: &CapabilityDecl) -> Self {
        let mut resource_patterns: Vec<String> = decl
            .resources
            .iter()
            .map(|rule| rule.pattern.clone())
            .collect();
        let mut allowed_operations = BTreeSet::new();
        for allow in &decl.allows {
            allowed_operations.insert(allow.operation.name.clone());
            if !allow.target.is_empty() && !resource_patterns.contains(&allow.target) {
                resource_patterns.push(allow.target.clone());
            }
        }

        Self::new(
            decl.name.name.clone(),
            Constraints {
                resource_patterns,
                allowed_operations,
                max_usage_count: None,
                expires_at: None,
            },
        )
    }

    pub fn is_expired(&self) -> bool {
        self.constraints
            .expires_at
            .map(|expires_at| SystemTime::now() >= expires_at)
            .unwrap_or(false)
    }

    pub fn usage_exhausted(&self) -> bool {
        self.constraints
            .max_usage_count
            .map(|limit| self.usage_count >= limit)
            .unwrap_or(false)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.usage_exhausted()
    }

    /// Shape check applied before a token enters a context.
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if self.token_type.is_empty()
            || !self
                .token_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(CapabilityError::InvalidToken {
                reason: format!("malformed capability type '{}'", self.token_type),
            });
        }
        for pattern in &self.constraints.resource_patterns {
            ResourcePattern::new(pattern)?;
        }
        if self.is_expired() {
            return Err(CapabilityError::Expired {
                capability: self.token_type.clone(),
            });
        }
        Ok(())
    }

    pub fn allows_operation(&self, operation: &str) -> bool {
        self.constraints.allowed_operations.is_empty()
            || self.constraints.allowed_operations.contains(operation)
    }

    pub fn matches_resource(&self, resource: &str) -> bool {
        if self.constraints.resource_patterns.is_empty() {
            return true;
        }
        self.constraints.resource_patterns.iter().any(|pattern| {
            ResourcePattern::new(pattern)
                .map(|pattern| pattern.matches(resource))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_token_is_valid() {
        let token = CapabilityToken::unrestricted("fs.read");
        assert!(token.is_valid());
        assert!(token.allows_operation("read"));
        assert!(token.matches_resource("/anything"));
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let mut token = CapabilityToken::unrestricted("fs.read");
        token.constraints.expires_at = Some(SystemTime::now() - Duration::from_secs(1));
        assert!(token.is_expired());
        assert!(!token.is_valid());
        assert!(token.validate().is_err());
    }

    #[test]
    fn test_usage_exhaustion() {
        let mut token = CapabilityToken::unrestricted("net.fetch").with_max_usage(2);
        assert!(token.is_valid());
        token.usage_count = 2;
        assert!(token.usage_exhausted());
        assert!(!token.is_valid());
    }

    #[test]
    fn test_malformed_type_is_rejected() {
        let token = CapabilityToken::unrestricted("no spaces allowed");
        assert!(matches!(
            token.validate(),
            Err(CapabilityError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_from_declaration() {
        use crate::ast::{parse, SourceUnit, Statement};

        let ast = parse(&SourceUnit::new(
            "test.sly",
            "capability file_access { resource \"/tmp/**\"; allow read \"/etc/hosts\"; }",
        ))
        .unwrap();
        let [Statement::Capability(decl)] = ast.nodes() else {
            panic!("expected capability declaration");
        };

        let token = CapabilityToken::from_declaration(decl);
        assert_eq!(token.token_type, "file_access");
        assert!(token.allows_operation("read"));
        assert!(!token.allows_operation("write"));
        assert!(token.matches_resource("/tmp/a/b"));
        assert!(token.matches_resource("/etc/hosts"));
        assert!(!token.matches_resource("/var/log"));
    }
}

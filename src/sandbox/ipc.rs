//! IPC frames between the parent and the sandbox child.
//!
//! The job travels to the child as one JSON document on stdin (tokens only,
//! never process-local handles); the child answers with one JSON report on
//! its real stdout while program output is captured separately.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityToken;
use crate::registry::SafeAttributeEntry;

use super::limits::SandboxLimits;

#[derive(Debug, Clone, Serialize)]
pub struct SandboxJob {
    /// Generated Python for the entry module.
    pub code: String,
    /// Generated Python for source-tree imports, by module name.
    pub modules: BTreeMap<String, String>,
    /// Serialized capability tokens granted to the execution.
    pub capabilities: Vec<CapabilityToken>,
    /// Snapshot of the Safe-Attribute Registry the child must enforce.
    pub safe_attributes: Vec<SafeAttributeEntry>,
    pub limits: SandboxLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeViolation {
    pub kind: String,
    pub message: String,
}

/// What the child itself reports back.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildReport {
    pub status: String,
    #[serde(default)]
    pub return_value: Option<serde_json::Value>,
    #[serde(default)]
    pub globals: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub violations: Vec<RuntimeViolation>,
    #[serde(default)]
    pub cpu_ms: u64,
    #[serde(default)]
    pub peak_memory_bytes: u64,
}

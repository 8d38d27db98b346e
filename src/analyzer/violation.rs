use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::ast::Position;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    DangerousCall,
    DynamicImport,
    ReflectionAbuse,
    ProcessExecution,
    FileAccess,
    NetworkAccess,
    CodeInjection,
    TaintedSink,
    ScopeError,
    StructureError,
    MissingCapability,
    AnalyzerFailure,
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ViolationKind::DangerousCall => "dangerous-call",
            ViolationKind::DynamicImport => "dynamic-import",
            ViolationKind::ReflectionAbuse => "reflection-abuse",
            ViolationKind::ProcessExecution => "process-execution",
            ViolationKind::FileAccess => "file-access",
            ViolationKind::NetworkAccess => "network-access",
            ViolationKind::CodeInjection => "code-injection",
            ViolationKind::TaintedSink => "tainted-sink",
            ViolationKind::ScopeError => "scope-error",
            ViolationKind::StructureError => "structure-error",
            ViolationKind::MissingCapability => "missing-capability",
            ViolationKind::AnalyzerFailure => "analyzer-failure",
        })
    }
}

/// A single finding from any of the analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    pub position: Position,
    pub cwe: Option<String>,
    pub suggestion: Option<String>,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        message: impl Into<String>,
        position: Position,
    ) -> Self {
        Violation {
            kind,
            severity,
            message: message.into(),
            position,
            cwe: None,
            suggestion: None,
        }
    }

    pub fn with_cwe(mut self, cwe: &str) -> Self {
        self.cwe = Some(cwe.to_owned());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Deterministic merge order for the parallel harness.
    pub fn sort_key(&self) -> (String, usize, usize, ViolationKind) {
        (
            self.position.file.clone(),
            self.position.line,
            self.position.column,
            self.kind,
        )
    }

    /// The flat JSON shape of the external violation report.
    pub fn report(&self) -> ViolationReport {
        ViolationReport {
            kind: self.kind,
            severity: self.severity,
            message: self.message.clone(),
            file: self.position.file.clone(),
            line: self.position.line,
            column: self.position.column,
            cwe: self.cwe.clone(),
            suggestion: self.suggestion.clone(),
        }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.severity, self.kind, self.message, self.position
        )?;
        if let Some(cwe) = &self.cwe {
            write!(f, " [{cwe}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationReport {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

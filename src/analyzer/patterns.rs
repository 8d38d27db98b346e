//! Pattern detector: precompiled rules evaluated against the source text.
//!
//! Every dangerous-identifier rule carries context predicates: matches
//! inside string literals are ignored (unless the rule targets string
//! content) and a set of safe-qualifier prefixes suppresses it, so
//! `regex.compile(…)` never trips the rule for bare `compile(…)`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Position, SourceUnit};

use super::violation::{Severity, Violation, ViolationKind};

pub struct PatternRule {
    pub id: &'static str,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub cwe: Option<&'static str>,
    pub message: &'static str,
    pub suggestion: Option<&'static str>,
    pattern: &'static str,
    /// Qualifiers whose member access makes the name safe (`regex.compile`).
    safe_qualifiers: &'static [&'static str],
    /// `allow` operations that, when declared by a capability block,
    /// legitimize the construct.
    gate_operations: &'static [&'static str],
    /// The rule inspects string contents itself; do not drop in-string hits.
    matches_strings: bool,
}

static RULES: &[PatternRule] = &[
    PatternRule {
        id: "dangerous-eval",
        kind: ViolationKind::DangerousCall,
        severity: Severity::Critical,
        cwe: Some("CWE-95"),
        message: "call to 'eval' executes arbitrary code",
        suggestion: Some("express the computation in the program instead of evaluating a string"),
        pattern: r"\beval\s*\(",
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: false,
    },
    PatternRule {
        id: "dangerous-exec",
        kind: ViolationKind::DangerousCall,
        severity: Severity::Critical,
        cwe: Some("CWE-95"),
        message: "call to 'exec' executes arbitrary code",
        suggestion: Some("express the computation in the program instead of executing a string"),
        pattern: r"\bexec\s*\(",
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: false,
    },
    PatternRule {
        id: "dangerous-compile",
        kind: ViolationKind::DangerousCall,
        severity: Severity::Error,
        cwe: Some("CWE-94"),
        message: "call to 'compile' constructs executable code",
        suggestion: None,
        pattern: r"\bcompile\s*\(",
        safe_qualifiers: &["regex", "re"],
        gate_operations: &[],
        matches_strings: false,
    },
    PatternRule {
        id: "dynamic-import",
        kind: ViolationKind::DynamicImport,
        severity: Severity::Critical,
        cwe: Some("CWE-829"),
        message: "dynamic import bypasses the module resolver",
        suggestion: Some("use a plain 'import name' statement"),
        pattern: r"\b__import__\s*\(|\bimportlib\b|\bimport_module\s*\(",
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: false,
    },
    PatternRule {
        id: "reflection-dunder",
        kind: ViolationKind::ReflectionAbuse,
        severity: Severity::Error,
        cwe: Some("CWE-470"),
        message: "double-underscore attributes traverse the runtime type graph",
        suggestion: None,
        pattern: r"\b__\w+__\b",
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: false,
    },
    PatternRule {
        id: "reflection-accessor",
        kind: ViolationKind::ReflectionAbuse,
        severity: Severity::Error,
        cwe: Some("CWE-470"),
        message: "reflective accessors are not available to programs",
        suggestion: None,
        pattern: r"\b(getattr|setattr|delattr|globals|locals|vars)\s*\(",
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: false,
    },
    PatternRule {
        id: "process-execution",
        kind: ViolationKind::ProcessExecution,
        severity: Severity::Critical,
        cwe: Some("CWE-78"),
        message: "shell or process execution without a declared capability",
        suggestion: Some("declare a capability with 'allow execute' for the commands needed"),
        pattern: r"\b(system|popen|spawn|subprocess|shell_exec)\s*\(",
        safe_qualifiers: &[],
        gate_operations: &["execute", "spawn", "run"],
        matches_strings: false,
    },
    PatternRule {
        id: "file-constructor",
        kind: ViolationKind::FileAccess,
        severity: Severity::Error,
        cwe: Some("CWE-73"),
        message: "direct file access without a declared capability",
        suggestion: Some("declare a capability with 'allow read' or 'allow write' and use the fs module"),
        pattern: r"\bopen\s*\(",
        safe_qualifiers: &["fs"],
        gate_operations: &["read", "write", "open"],
        matches_strings: false,
    },
    PatternRule {
        id: "network-constructor",
        kind: ViolationKind::NetworkAccess,
        severity: Severity::Error,
        cwe: Some("CWE-918"),
        message: "direct network access without a declared capability",
        suggestion: Some("declare a capability with 'allow fetch' and use the net module"),
        pattern: r"\b(socket|connect|bind|listen)\s*\(",
        safe_qualifiers: &["net"],
        gate_operations: &["fetch", "connect", "send"],
        matches_strings: false,
    },
    PatternRule {
        id: "sql-concatenation",
        kind: ViolationKind::CodeInjection,
        severity: Severity::Critical,
        cwe: Some("CWE-89"),
        message: "query string built by concatenation",
        suggestion: Some("pass values as query parameters instead of concatenating them"),
        pattern: r#""[^"]*\b(?i:select|insert|update|delete|drop)\b[^"]*"\s*\+"#,
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: true,
    },
    PatternRule {
        id: "command-concatenation",
        kind: ViolationKind::CodeInjection,
        severity: Severity::Critical,
        cwe: Some("CWE-78"),
        message: "command string built by concatenation",
        suggestion: Some("pass arguments separately instead of concatenating them"),
        pattern: r#""(?:rm |sudo |sh -c|/bin/|cmd\.exe)[^"]*"\s*\+"#,
        safe_qualifiers: &[],
        gate_operations: &[],
        matches_strings: true,
    },
];

static COMPILED: Lazy<Vec<(Regex, &'static PatternRule)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(rule.pattern)
                .unwrap_or_else(|error| panic!("rule '{}' has a bad pattern: {error}", rule.id));
            (regex, rule)
        })
        .collect()
});

/// Version stamp of the rule table; part of the analysis cache key.
pub const RULE_SET_VERSION: u32 = 3;

/// Run every rule against the unit.
///
/// `declared_operations` is the set of `allow` operations from the program's
/// capability blocks; rules gated on an operation are suppressed when it is
/// declared.
pub fn detect(unit: &SourceUnit, declared_operations: &BTreeSet<String>) -> Vec<Violation> {
    let text = &unit.stripped;
    let string_spans = string_spans(text);

    let mut violations = vec![];

    for (regex, rule) in COMPILED.iter() {
        if !rule.gate_operations.is_empty()
            && rule
                .gate_operations
                .iter()
                .any(|operation| declared_operations.contains(*operation))
        {
            continue;
        }

        for hit in regex.find_iter(text) {
            if !rule.matches_strings && inside_string(&string_spans, hit.start()) {
                continue;
            }
            if suppressed_by_qualifier(text, hit.start(), rule.safe_qualifiers) {
                continue;
            }

            let mut violation = Violation::new(
                rule.kind,
                rule.severity,
                rule.message,
                position_at(unit, hit.start()),
            );
            if let Some(cwe) = rule.cwe {
                violation = violation.with_cwe(cwe);
            }
            if let Some(suggestion) = rule.suggestion {
                violation = violation.with_suggestion(suggestion);
            }
            violations.push(violation);
        }
    }

    violations
}

fn string_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = vec![];
    let mut start = None;
    let mut escaped = false;

    for (offset, c) in text.char_indices() {
        match start {
            Some(from) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    spans.push((from, offset + 1));
                    start = None;
                }
            }
            None => {
                if c == '"' {
                    start = Some(offset);
                }
            }
        }
    }

    spans
}

fn inside_string(spans: &[(usize, usize)], offset: usize) -> bool {
    spans
        .iter()
        .any(|(start, end)| offset > *start && offset < *end)
}

/// `qualifier.name(…)` is safe when the qualifier is whitelisted for the rule.
fn suppressed_by_qualifier(text: &str, offset: usize, safe_qualifiers: &[&str]) -> bool {
    if safe_qualifiers.is_empty() {
        return false;
    }

    let before = text[..offset].trim_end();
    let Some(before) = before.strip_suffix('.') else {
        return false;
    };

    let qualifier: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .chars()
        .rev()
        .collect();

    safe_qualifiers.contains(&qualifier.as_str())
}

fn position_at(unit: &SourceUnit, offset: usize) -> Position {
    let before = &unit.stripped[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(newline) => offset - newline,
        None => offset + 1,
    };

    Position {
        file: unit.file.clone(),
        line,
        column,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_source(source: &str) -> Vec<Violation> {
        detect(&SourceUnit::new("test.sly", source), &BTreeSet::new())
    }

    #[test]
    fn test_eval_is_critical() {
        let violations = detect_source("result = eval(\"2+2\");");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Critical);
        assert_eq!(violations[0].cwe.as_deref(), Some("CWE-95"));
    }

    #[test]
    fn test_regex_compile_is_safe() {
        let violations = detect_source("import regex; p = regex.compile(\"\\\\d+\");");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_bare_compile_fires() {
        let violations = detect_source("code = compile(src);");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::DangerousCall);
    }

    #[test]
    fn test_eval_inside_string_is_ignored() {
        let violations = detect_source("s = \"do not eval(x) here\";");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_eval_in_comment_is_ignored() {
        let violations = detect_source("// eval(x)\ny = 1;");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_dunder_access_fires() {
        let violations = detect_source("k = obj.__class__;");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::ReflectionAbuse);
    }

    #[test]
    fn test_capability_gates_file_rule() {
        let source = "h = open(\"data.txt\");";
        assert_eq!(detect_source(source).len(), 1);

        let mut declared = BTreeSet::new();
        declared.insert("read".to_owned());
        let gated = detect(&SourceUnit::new("test.sly", source), &declared);
        assert!(gated.is_empty(), "{gated:?}");
    }

    #[test]
    fn test_sql_concatenation() {
        let violations = detect_source("q = \"SELECT * FROM users WHERE id = \" + user_id;");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].cwe.as_deref(), Some("CWE-89"));
    }

    #[test]
    fn test_position_points_at_the_call() {
        let violations = detect_source("x = 1;\ny = eval(\"2\");");
        assert_eq!(violations[0].position.line, 2);
        assert_eq!(violations[0].position.column, 5);
    }
}

//! Multi-pass static security analyzer.
//!
//! The three independent analyses (pattern detector, structural AST walker
//! and taint tracker) share a parallel driver and a bounded
//! cache. Workers only see immutable input; the cache is the single shared
//! writable structure and locks internally.

pub mod cache;
pub mod patterns;
pub mod scope;
pub mod taint;
pub mod violation;
pub mod walker;

pub use self::cache::{AnalysisCache, CacheEntry, CacheKey, ANALYZER_VERSION};
pub use self::patterns::RULE_SET_VERSION;
pub use self::scope::{ScopeSummary, Symbol, SymbolKind};
pub use self::taint::{Taint, TaintSummary, TaintTracker};
pub use self::violation::{Severity, Violation, ViolationKind, ViolationReport};
pub use self::walker::Walker;

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use log::{debug, warn};

use crate::ast::{Ast, Position, SourceUnit};

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Run the three analyses on the rayon pool; `false` selects the
    /// single-threaded fallback.
    pub parallel: bool,
    pub cache_capacity: usize,
    pub cache_dir: Option<PathBuf>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            parallel: true,
            cache_capacity: 256,
            cache_dir: std::env::var_os("CACHE_DIR").map(PathBuf::from),
        }
    }
}

/// Merged result of all three analyses over one source unit.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub violations: Vec<Violation>,
    pub scopes: ScopeSummary,
    pub taint: TaintSummary,
    pub from_cache: bool,
}

impl Analysis {
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations
            .iter()
            .map(|violation| violation.severity)
            .max()
    }

    /// Whether strict mode must refuse code generation for this unit.
    pub fn blocks_codegen(&self) -> bool {
        self.max_severity()
            .map(|severity| severity >= Severity::Error)
            .unwrap_or(false)
    }
}

pub struct Analyzer {
    cache: AnalysisCache,
    options: AnalysisOptions,
}

impl Analyzer {
    pub fn new(options: AnalysisOptions) -> Self {
        let cache = AnalysisCache::new(options.cache_capacity, options.cache_dir.clone());
        Analyzer { cache, options }
    }

    pub fn analyze(&self, unit: &SourceUnit, ast: &Ast) -> Analysis {
        let key = CacheKey {
            content_hash: unit.hash.clone(),
            analyzer_version: ANALYZER_VERSION,
            rule_set_version: RULE_SET_VERSION,
        };

        if let Some(entry) = self.cache.get(&key) {
            debug!("using cached analysis for '{}'", unit.file);
            return Analysis {
                violations: entry.violations,
                scopes: entry.scopes,
                taint: entry.taint,
                from_cache: true,
            };
        }

        let declared_operations = declared_operations(ast);

        let (pattern_violations, (walk, taint)) = if self.options.parallel {
            rayon::join(
                || guarded(unit, "pattern detector", || {
                    patterns::detect(unit, &declared_operations)
                }),
                || {
                    rayon::join(
                        || guarded(unit, "ast walker", || Walker::walk(ast)),
                        || guarded(unit, "taint tracker", || TaintTracker::track(ast)),
                    )
                },
            )
        } else {
            (
                guarded(unit, "pattern detector", || {
                    patterns::detect(unit, &declared_operations)
                }),
                (
                    guarded(unit, "ast walker", || Walker::walk(ast)),
                    guarded(unit, "taint tracker", || TaintTracker::track(ast)),
                ),
            )
        };

        let mut violations = vec![];
        let mut scopes = ScopeSummary::default();
        let mut taint_summary = TaintSummary::default();

        match pattern_violations {
            Ok(found) => violations.extend(found),
            Err(failure) => violations.push(failure),
        }
        match walk {
            Ok((summary, found)) => {
                scopes = summary;
                violations.extend(found);
            }
            Err(failure) => violations.push(failure),
        }
        match taint {
            Ok((summary, found)) => {
                taint_summary = summary;
                violations.extend(found);
            }
            Err(failure) => violations.push(failure),
        }

        // deterministic merge order, independent of which worker finished first
        violations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        violations.dedup();

        self.cache.put(
            key,
            CacheEntry {
                violations: violations.clone(),
                scopes: scopes.clone(),
                taint: taint_summary.clone(),
            },
        );

        Analysis {
            violations,
            scopes,
            taint: taint_summary,
            from_cache: false,
        }
    }
}

/// Run one analysis, converting an internal panic into a warning-severity
/// violation so the pipeline can continue.
fn guarded<T>(
    unit: &SourceUnit,
    what: &str,
    analysis: impl FnOnce() -> T,
) -> Result<T, Violation> {
    catch_unwind(AssertUnwindSafe(analysis)).map_err(|_| {
        warn!("{what} failed internally on '{}'", unit.file);
        Violation::new(
            ViolationKind::AnalyzerFailure,
            Severity::Warning,
            format!("{what} failed internally; its findings are unavailable"),
            Position {
                file: unit.file.clone(),
                line: 1,
                column: 1,
                offset: 0,
            },
        )
    })
}

/// `allow` operations named by the program's capability blocks.
fn declared_operations(ast: &Ast) -> BTreeSet<String> {
    ast.capability_decls()
        .iter()
        .flat_map(|decl| decl.allows.iter())
        .map(|allow| allow.operation.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalysisOptions {
            parallel: true,
            cache_capacity: 8,
            cache_dir: None,
        })
    }

    fn analyze(source: &str) -> Analysis {
        let unit = SourceUnit::new("test.sly", source);
        let ast = parse(&unit).unwrap();
        analyzer().analyze(&unit, &ast)
    }

    #[test]
    fn test_clean_program() {
        let analysis = analyze("x = 1 + 2 * 3;");
        assert!(analysis.violations.is_empty());
        assert!(!analysis.blocks_codegen());
        assert!(!analysis.from_cache);
    }

    #[test]
    fn test_eval_blocks_codegen() {
        let analysis = analyze("result = eval(\"2+2\");");
        assert_eq!(analysis.max_severity(), Some(Severity::Critical));
        assert!(analysis.blocks_codegen());
    }

    #[test]
    fn test_merge_is_sorted() {
        let analysis = analyze("break;\nresult = eval(\"2+2\");\ny = obj.__class__;");
        let keys: Vec<_> = analysis
            .violations
            .iter()
            .map(|violation| (violation.position.line, violation.position.column))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_second_run_hits_cache() {
        let analyzer = analyzer();
        let unit = SourceUnit::new("test.sly", "x = 1;");
        let ast = parse(&unit).unwrap();

        let first = analyzer.analyze(&unit, &ast);
        assert!(!first.from_cache);
        let second = analyzer.analyze(&unit, &ast);
        assert!(second.from_cache);
        assert_eq!(first.violations, second.violations);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let source = "result = eval(\"2+2\");\nbreak;\nimport net;\nimport db;\ndb.query(net.fetch(\"https://x\"));";
        let unit = SourceUnit::new("test.sly", source);
        let ast = parse(&unit).unwrap();

        let parallel = analyzer().analyze(&unit, &ast);
        let sequential = Analyzer::new(AnalysisOptions {
            parallel: false,
            cache_capacity: 8,
            cache_dir: None,
        })
        .analyze(&unit, &ast);

        assert_eq!(parallel.violations, sequential.violations);
    }

    #[test]
    fn test_stdlib_only_program_has_no_criticals() {
        let analysis = analyze(
            "import math;\nfunction area(r) { return math.pi * r * r; }\nprint(area(2));",
        );
        assert!(analysis
            .violations
            .iter()
            .all(|violation| violation.severity < Severity::Critical));
    }
}

//! The compile/run pipeline.
//!
//! Per source unit: parse, run the security analyses, then lower to Python,
//! in that order, with all three analyses complete before the generator
//! runs. Strict mode (the default, gated by `STRICT_SECURITY`) refuses code
//! generation when any violation of severity `error` or above was found;
//! disabling it skips the static analyses but never runtime capability
//! enforcement.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::analyzer::{Analysis, AnalysisOptions, Analyzer, Violation};
use crate::ast::{self, Ast, ParseError, SourceUnit, Statement};
use crate::capability::{enter_context, CapabilityContext, CapabilityToken, ExecutionKind};
use crate::codegen::{self, CodegenError, GeneratedModule};
use crate::registry::safe_attrs;
use crate::resolver::{ModuleValue, Resolver, ResolverError};
use crate::sandbox::{Sandbox, SandboxError, SandboxJob, SandboxLimits, SandboxResult};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Refuse codegen on violations ≥ error; `false` skips static analysis.
    pub strict: bool,
    /// Parallel analysis harness; `false` selects the sequential fallback.
    pub parallel: bool,
    /// Regenerate artifacts even when they are newer than the source.
    pub force: bool,
    pub extension_paths: Vec<PathBuf>,
    pub limits: SandboxLimits,
    pub cache_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            strict: true,
            parallel: true,
            force: false,
            extension_paths: vec![],
            limits: SandboxLimits::default(),
            cache_dir: None,
        }
    }
}

impl PipelineOptions {
    /// Defaults with `STRICT_SECURITY`, `CACHE_DIR`, `SANDBOX_TIMEOUT_MS`
    /// and `SANDBOX_MEMORY_BYTES` applied.
    pub fn from_env() -> Self {
        let strict = match std::env::var("STRICT_SECURITY") {
            Ok(value) => !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            ),
            Err(_) => true,
        };
        PipelineOptions {
            strict,
            limits: SandboxLimits::from_env(),
            cache_dir: std::env::var_os("CACHE_DIR").map(PathBuf::from),
            ..PipelineOptions::default()
        }
    }
}

#[derive(Debug)]
pub enum PipelineError {
    Io { path: PathBuf, error: std::io::Error },
    Parse(Box<ParseError>),
    Analysis(Vec<Violation>),
    Codegen(CodegenError),
    Resolver(ResolverError),
    Sandbox(SandboxError),
}

impl PipelineError {
    /// Process exit code for the CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Analysis(_) => 1,
            PipelineError::Parse(_) | PipelineError::Codegen(_) | PipelineError::Resolver(_) => 2,
            PipelineError::Sandbox(_) => 3,
            PipelineError::Io { .. } => 4,
        }
    }
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Io { path, error } => {
                write!(f, "io error on '{}': {error}", path.display())
            }
            PipelineError::Parse(error) => write!(f, "parse error: {error}"),
            PipelineError::Analysis(violations) => {
                let blocking = violations
                    .iter()
                    .filter(|violation| {
                        violation.severity >= crate::analyzer::Severity::Error
                    })
                    .count();
                write!(f, "{blocking} blocking security violation(s)")
            }
            PipelineError::Codegen(error) => write!(f, "codegen error: {error}"),
            PipelineError::Resolver(error) => write!(f, "resolver error: {error}"),
            PipelineError::Sandbox(error) => write!(f, "sandbox error: {error}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Fully processed source unit, ready to write or run.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub unit: SourceUnit,
    pub ast: Ast,
    pub generated: GeneratedModule,
    /// Generated code of source-tree dependencies, by import name.
    pub dependencies: BTreeMap<String, String>,
    /// Static findings plus compile-time capability warnings, merge-sorted.
    pub violations: Vec<Violation>,
}

pub struct Pipeline {
    options: PipelineOptions,
    analyzer: Analyzer,
    resolver: Resolver,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        let analyzer = Analyzer::new(AnalysisOptions {
            parallel: options.parallel,
            cache_dir: options.cache_dir.clone(),
            ..AnalysisOptions::default()
        });
        let resolver = Resolver::with_extension_paths(options.extension_paths.clone());
        Pipeline {
            options,
            analyzer,
            resolver,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the analyses over a unit, regardless of strict mode.
    pub fn analyze_source(&self, unit: &SourceUnit) -> Result<Analysis, PipelineError> {
        let ast = ast::parse(unit).map_err(PipelineError::Parse)?;
        Ok(self.analyzer.analyze(unit, &ast))
    }

    /// Compile one unit: parse, analyze (strict mode), lower, and compile
    /// the closure of its source-tree imports.
    pub fn compile_source(&self, unit: SourceUnit) -> Result<CompiledUnit, PipelineError> {
        let ast = ast::parse(&unit).map_err(PipelineError::Parse)?;

        let mut violations = vec![];
        if self.options.strict {
            let analysis = self.analyzer.analyze(&unit, &ast);
            let blocks = analysis.blocks_codegen();
            violations = analysis.violations;
            if blocks {
                info!("strict mode: refusing codegen for '{}'", unit.file);
                return Err(PipelineError::Analysis(violations));
            }
        }

        let generated =
            codegen::generate(&unit, &ast, &self.resolver).map_err(PipelineError::Codegen)?;
        violations.extend(generated.warnings.iter().cloned());
        violations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        violations.dedup();

        let mut dependencies = BTreeMap::new();
        let mut chain = vec![module_name(&unit.file)];
        self.compile_dependencies(&unit, &ast, &mut chain, &mut dependencies)?;

        Ok(CompiledUnit {
            unit,
            ast,
            generated,
            dependencies,
            violations,
        })
    }

    fn compile_dependencies(
        &self,
        unit: &SourceUnit,
        ast: &Ast,
        chain: &mut Vec<String>,
        out: &mut BTreeMap<String, String>,
    ) -> Result<(), PipelineError> {
        for import in collect_imports(&ast.statements) {
            let name = import.name.name.clone();
            let value = self
                .resolver
                .resolve(&name, Path::new(&unit.file))
                .map_err(|error| {
                    PipelineError::Resolver(ResolverError {
                        position: Some(import.position.clone()),
                        ..error
                    })
                })?;

            let ModuleValue::Source(path) = value else {
                continue;
            };
            if out.contains_key(&name) {
                continue;
            }
            if chain.contains(&name) {
                let mut cycle = chain.clone();
                cycle.push(name);
                return Err(PipelineError::Resolver(ResolverError::cycle(cycle)));
            }

            debug!("compiling dependency '{name}' from '{}'", path.display());
            let dep_unit = SourceUnit::from_file(&path).map_err(|error| PipelineError::Io {
                path: path.clone(),
                error,
            })?;
            let dep_ast = ast::parse(&dep_unit).map_err(PipelineError::Parse)?;

            if self.options.strict {
                let analysis = self.analyzer.analyze(&dep_unit, &dep_ast);
                if analysis.blocks_codegen() {
                    return Err(PipelineError::Analysis(analysis.violations));
                }
            }

            let generated = codegen::generate(&dep_unit, &dep_ast, &self.resolver)
                .map_err(PipelineError::Codegen)?;

            chain.push(name.clone());
            self.compile_dependencies(&dep_unit, &dep_ast, chain, out)?;
            chain.pop();

            out.insert(name, generated.code);
        }
        Ok(())
    }

    /// Compile a file and write `X.py` / `X.sly.map` next to it when the
    /// source is newer than the artifacts (or `force` is set).
    pub fn compile_file(&self, path: &Path) -> Result<(CompiledUnit, bool), PipelineError> {
        let unit = SourceUnit::from_file(path).map_err(|error| PipelineError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let compiled = self.compile_source(unit)?;

        if !self.options.force && artifacts_fresh(path) {
            debug!("artifacts for '{}' are up to date", path.display());
            return Ok((compiled, false));
        }

        self.write_artifacts(path, &compiled)?;
        Ok((compiled, true))
    }

    pub fn write_artifacts(
        &self,
        path: &Path,
        compiled: &CompiledUnit,
    ) -> Result<(PathBuf, PathBuf), PipelineError> {
        let (code_path, map_path) = artifact_paths(path);

        std::fs::write(&code_path, &compiled.generated.code).map_err(|error| {
            PipelineError::Io {
                path: code_path.clone(),
                error,
            }
        })?;

        let map_json = serde_json::to_string(&compiled.generated.source_map)
            .map_err(|error| PipelineError::Io {
                path: map_path.clone(),
                error: std::io::Error::from(error),
            })?;
        std::fs::write(&map_path, map_json).map_err(|error| PipelineError::Io {
            path: map_path.clone(),
            error,
        })?;

        info!(
            "wrote '{}' and '{}'",
            code_path.display(),
            map_path.display()
        );
        Ok((code_path, map_path))
    }

    /// Compile and execute in the sandbox under a fresh capability context.
    pub fn run_source(
        &self,
        unit: SourceUnit,
        grants: &[CapabilityToken],
    ) -> Result<(CompiledUnit, SandboxResult), PipelineError> {
        let compiled = self.compile_source(unit)?;

        // per-invocation context: main-process parent, sandbox child holding
        // the declared and granted tokens
        let parent = CapabilityContext::new(ExecutionKind::Main);
        let context = parent.child(ExecutionKind::Sandbox);
        for decl in compiled.ast.capability_decls() {
            let token = CapabilityToken::from_declaration(decl);
            if let Err(error) = context.add_capability(token) {
                debug!("skipping invalid capability declaration: {error}");
            }
        }
        for token in grants {
            if let Err(error) = context.add_capability(token.clone()) {
                debug!("skipping invalid granted capability: {error}");
            }
        }
        let _guard = enter_context(context.clone());

        let job = SandboxJob {
            code: compiled.generated.code.clone(),
            modules: compiled.dependencies.clone(),
            capabilities: context.get_all_capabilities(true),
            safe_attributes: safe_attrs::entries().into_iter().cloned().collect(),
            limits: self.options.limits.clone(),
        };

        let result = Sandbox::new(self.options.limits.clone())
            .execute(&job)
            .map_err(PipelineError::Sandbox)?;
        Ok((compiled, result))
    }

    pub fn run_file(
        &self,
        path: &Path,
        grants: &[CapabilityToken],
    ) -> Result<(CompiledUnit, SandboxResult), PipelineError> {
        let unit = SourceUnit::from_file(path).map_err(|error| PipelineError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        self.run_source(unit, grants)
    }
}

/// `X.sly` → (`X.py`, `X.sly.map`).
pub fn artifact_paths(source: &Path) -> (PathBuf, PathBuf) {
    let code_path = source.with_extension("py");
    let map_path = match source.file_name() {
        Some(name) => source.with_file_name(format!("{}.map", name.to_string_lossy())),
        None => source.with_extension("sly.map"),
    };
    (code_path, map_path)
}

fn artifacts_fresh(source: &Path) -> bool {
    let (code_path, map_path) = artifact_paths(source);
    let Ok(source_modified) = source.metadata().and_then(|meta| meta.modified()) else {
        return false;
    };
    for artifact in [code_path, map_path] {
        let Ok(artifact_modified) = artifact.metadata().and_then(|meta| meta.modified()) else {
            return false;
        };
        if artifact_modified < source_modified {
            return false;
        }
    }
    true
}

fn module_name(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_owned())
}

fn collect_imports(statements: &[Statement]) -> Vec<&crate::ast::Import> {
    let mut imports = vec![];
    fn walk<'a>(statements: &'a [Statement], imports: &mut Vec<&'a crate::ast::Import>) {
        for statement in statements {
            match statement {
                Statement::Import(import) => imports.push(import),
                Statement::FunctionDef(def) => walk(&def.body.statements, imports),
                Statement::If(node) => {
                    walk(&node.then_block.statements, imports);
                    for elif in &node.elif_clauses {
                        walk(&elif.block.statements, imports);
                    }
                    if let Some(block) = &node.else_block {
                        walk(&block.statements, imports);
                    }
                }
                Statement::While(node) => walk(&node.body.statements, imports),
                Statement::For(node) => walk(&node.body.statements, imports),
                Statement::Try(node) => {
                    walk(&node.body.statements, imports);
                    for clause in &node.except_clauses {
                        walk(&clause.body.statements, imports);
                    }
                    if let Some(block) = &node.finally_block {
                        walk(&block.statements, imports);
                    }
                }
                _ => {}
            }
        }
    }
    walk(statements, &mut imports);
    imports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineOptions::default())
    }

    #[test]
    fn test_compile_clean_source() {
        let compiled = pipeline()
            .compile_source(SourceUnit::new("test.sly", "x = 1 + 2 * 3;"))
            .unwrap();
        assert!(compiled.generated.code.contains("x = (1 + (2 * 3))"));
        assert!(compiled.violations.is_empty());
    }

    #[test]
    fn test_strict_mode_blocks_eval() {
        let error = pipeline()
            .compile_source(SourceUnit::new("test.sly", "result = eval(\"2+2\");"))
            .unwrap_err();
        assert!(matches!(error, PipelineError::Analysis(_)));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_non_strict_skips_static_analysis_but_not_codegen_checks() {
        let options = PipelineOptions {
            strict: false,
            ..PipelineOptions::default()
        };
        // `eval` is still not an allowed function: codegen refuses the call
        let error = Pipeline::new(options)
            .compile_source(SourceUnit::new("test.sly", "result = eval(\"2+2\");"))
            .unwrap_err();
        assert!(matches!(error, PipelineError::Codegen(_)));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_compile_file_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.sly");
        std::fs::write(&source, "x = 41 + 1;\n").unwrap();

        let (_, wrote) = pipeline().compile_file(&source).unwrap();
        assert!(wrote);
        assert!(dir.path().join("main.py").is_file());
        assert!(dir.path().join("main.sly.map").is_file());

        // second compile sees fresh artifacts
        let (_, wrote_again) = pipeline().compile_file(&source).unwrap();
        assert!(!wrote_again);
    }

    #[test]
    fn test_source_dependency_compilation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("helper.sly"),
            "function double(n) { return n * 2; }\n",
        )
        .unwrap();
        let main = dir.path().join("main.sly");
        std::fs::write(&main, "import helper;\nprint(helper.double(21));\n").unwrap();

        let unit = SourceUnit::from_file(&main).unwrap();
        let compiled = pipeline().compile_source(unit).unwrap();
        assert!(compiled.dependencies.contains_key("helper"));
        assert!(compiled.dependencies["helper"].contains("def double(n):"));
    }

    #[test]
    fn test_import_cycle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.sly"), "import b;\n").unwrap();
        std::fs::write(dir.path().join("b.sly"), "import a;\n").unwrap();

        let unit = SourceUnit::from_file(&dir.path().join("a.sly")).unwrap();
        let error = pipeline().compile_source(unit).unwrap_err();
        let PipelineError::Resolver(resolver_error) = error else {
            panic!("expected a resolver error");
        };
        assert!(resolver_error.to_string().contains("circular import"));
    }

    #[test]
    fn test_deterministic_artifacts() {
        let source = "function f(n) { return n + 1; }\nprint(f(41));\n";
        let first = pipeline()
            .compile_source(SourceUnit::new("same.sly", source))
            .unwrap();
        let second = pipeline()
            .compile_source(SourceUnit::new("same.sly", source))
            .unwrap();
        assert_eq!(first.generated.code, second.generated.code);
        assert_eq!(
            serde_json::to_string(&first.generated.source_map).unwrap(),
            serde_json::to_string(&second.generated.source_map).unwrap()
        );
    }

    #[test]
    fn test_artifact_paths() {
        let (code, map) = artifact_paths(Path::new("/x/app.sly"));
        assert_eq!(code, Path::new("/x/app.py"));
        assert_eq!(map, Path::new("/x/app.sly.map"));
    }
}

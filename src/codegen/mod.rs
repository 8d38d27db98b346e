//! Safety-aware AST→Python lowering.
//!
//! One lowering rule per node kind. The load-bearing decisions:
//!
//! - attribute *reads* go through the `_sly_attr` gate, attribute *writes*
//!   lower to plain item assignment;
//! - only names from the Allowed-Functions Registry, imports or local
//!   bindings are ever emitted; unresolved free names are errors;
//! - block structure is carried from the parse, never reconstructed;
//! - capability blocks are lifted to registration calls at module load.

pub mod emitter;
pub mod sourcemap;

pub use self::sourcemap::{
    DebugInfo, FunctionRange, Mapping, SourceMap, VariableMapping, SOURCE_MAP_VERSION,
};

use std::collections::HashSet;
use std::fmt::Display;

use log::debug;

use crate::analyzer::{Severity, Violation, ViolationKind};
use crate::ast::{
    ArrowBody, AssignTarget, Ast, Block, Expression, Identifier, LiteralValue, Position, SourceUnit,
    Statement,
};
use crate::registry::builtins;
use crate::resolver::Resolver;

use self::emitter::Emitter;

#[derive(Debug, Clone)]
pub struct CodegenError {
    pub message: String,
    pub position: Position,
    pub suggestion: Option<String>,
}

impl CodegenError {
    fn new(message: impl Into<String>, position: Position) -> Self {
        CodegenError {
            message: message.into(),
            position,
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.position)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CodegenError {}

type CResult<T> = Result<T, CodegenError>;

/// Result of lowering one source unit.
#[derive(Debug, Clone)]
pub struct GeneratedModule {
    pub code: String,
    pub source_map: SourceMap,
    /// Compile-time capability warnings (enforced at runtime regardless).
    pub warnings: Vec<Violation>,
}

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "class", "def", "del",
    "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

fn mangle(name: &str) -> String {
    if PY_KEYWORDS.contains(&name) {
        format!("{name}__s")
    } else if name.starts_with("_sly") {
        format!("v{name}")
    } else {
        name.to_owned()
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

struct Frame {
    names: HashSet<String>,
    scope_id: usize,
    label: String,
}

pub struct Codegen<'a> {
    unit: &'a SourceUnit,
    resolver: &'a Resolver,
    emitter: Emitter,
    map: SourceMap,
    frames: Vec<Frame>,
    declared_capabilities: Vec<String>,
    warnings: Vec<Violation>,
    arrow_counter: usize,
    scope_counter: usize,
    function_depth: usize,
    loop_depth: usize,
    suppress_maps: bool,
}

/// Lower a unit's AST to a Python module plus its source map.
pub fn generate(
    unit: &SourceUnit,
    ast: &Ast,
    resolver: &Resolver,
) -> Result<GeneratedModule, CodegenError> {
    debug!("generating code for '{}'", unit.file);

    let mut codegen = Codegen {
        unit,
        resolver,
        emitter: Emitter::new(),
        map: SourceMap::new(&unit.file),
        frames: vec![],
        declared_capabilities: ast.declared_capabilities(),
        warnings: vec![],
        arrow_counter: 0,
        scope_counter: 0,
        function_depth: 0,
        loop_depth: 0,
        suppress_maps: false,
    };

    codegen.push_frame("module", &ast.statements);

    codegen.emitter.line(&format!("# generated from {}", unit.file));

    // capability blocks are lifted to registration side-effects at module load
    for decl in ast.capability_decls() {
        let registration = capability_registration(decl);
        let line = codegen.emitter.line(&registration);
        codegen.record(line, 1, "capability", &decl.position, Some(&decl.name.name));
    }

    for statement in &ast.statements {
        codegen.statement(statement)?;
    }

    codegen.frames.pop();

    let mut map = codegen.map;
    map.sort();

    Ok(GeneratedModule {
        code: codegen.emitter.finish(),
        source_map: map,
        warnings: codegen.warnings,
    })
}

fn capability_registration(decl: &crate::ast::CapabilityDecl) -> String {
    let mut patterns: Vec<String> = decl
        .resources
        .iter()
        .map(|rule| python_string(&rule.pattern))
        .collect();
    let mut operations = vec![];
    for allow in &decl.allows {
        operations.push(python_string(&allow.operation.name));
        let target = python_string(&allow.target);
        if !allow.target.is_empty() && !patterns.contains(&target) {
            patterns.push(target);
        }
    }

    format!(
        "_sly_declare_capability({}, {{\"resource_patterns\": [{}], \"allowed_operations\": [{}]}})",
        python_string(&decl.name.name),
        patterns.join(", "),
        operations.join(", "),
    )
}

fn python_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn python_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Names bound anywhere in a scope: assignments, destructurings, loop
/// variables, exception bindings, imports and function definitions, without
/// descending into nested function bodies.
fn collect_bindings(statements: &[Statement], names: &mut HashSet<String>) {
    for statement in statements {
        match statement {
            Statement::Assignment(node) => {
                if let AssignTarget::Identifier(ident) = &node.target {
                    names.insert(ident.name.clone());
                }
            }
            Statement::Destructure(node) => {
                for name in &node.names {
                    names.insert(name.name.clone());
                }
            }
            Statement::FunctionDef(def) => {
                names.insert(def.name.name.clone());
            }
            Statement::Import(import) => {
                names.insert(import.binding().name.clone());
            }
            Statement::Nonlocal(node) => {
                names.insert(node.name.name.clone());
            }
            Statement::For(node) => {
                names.insert(node.variable.name.clone());
                collect_bindings(&node.body.statements, names);
            }
            Statement::If(node) => {
                collect_bindings(&node.then_block.statements, names);
                for elif in &node.elif_clauses {
                    collect_bindings(&elif.block.statements, names);
                }
                if let Some(block) = &node.else_block {
                    collect_bindings(&block.statements, names);
                }
            }
            Statement::While(node) => collect_bindings(&node.body.statements, names),
            Statement::Try(node) => {
                collect_bindings(&node.body.statements, names);
                for clause in &node.except_clauses {
                    if let Some(binding) = &clause.binding {
                        names.insert(binding.name.clone());
                    }
                    collect_bindings(&clause.body.statements, names);
                }
                if let Some(block) = &node.finally_block {
                    collect_bindings(&block.statements, names);
                }
            }
            _ => {}
        }
    }
}

impl<'a> Codegen<'a> {
    fn push_frame(&mut self, label: &str, statements: &[Statement]) -> usize {
        let mut names = HashSet::new();
        collect_bindings(statements, &mut names);
        let scope_id = self.scope_counter;
        self.scope_counter += 1;
        self.frames.push(Frame {
            names,
            scope_id,
            label: label.to_owned(),
        });
        scope_id
    }

    fn is_defined(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|frame| frame.names.contains(name))
    }

    fn current_scope(&self) -> usize {
        self.frames.last().map(|frame| frame.scope_id).unwrap_or(0)
    }

    fn scope_label(&self) -> String {
        self.frames
            .last()
            .map(|frame| frame.label.clone())
            .unwrap_or_else(|| "module".to_owned())
    }

    fn record(
        &mut self,
        generated_line: usize,
        generated_column: usize,
        node_type: &str,
        position: &Position,
        symbol: Option<&str>,
    ) {
        if self.suppress_maps {
            return;
        }
        self.map.add_mapping(Mapping {
            generated_line,
            generated_column,
            source: 0,
            original_line: position.line,
            original_column: position.column,
            node_type: node_type.to_owned(),
            symbol: symbol.map(str::to_owned),
            scope_id: Some(self.current_scope()),
        });
    }

    fn statement_line(
        &mut self,
        text: &str,
        node_type: &str,
        position: &Position,
        symbol: Option<&str>,
    ) {
        let column = self.emitter.column();
        let line = self.emitter.line(text);
        self.record(line, column, node_type, position, symbol);
    }

    fn check_attribute(&self, property: &Identifier) -> CResult<()> {
        if is_dunder(&property.name) {
            return Err(CodegenError::new(
                format!(
                    "attribute '{}' uses the host reflection convention and cannot be accessed",
                    property.name
                ),
                property.position.clone(),
            ));
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> CResult<()> {
        match statement {
            Statement::Expression(expression) => {
                let lowered = self.expr(expression)?;
                let position = expression.position();
                // at module level the value of the last expression statement
                // is the unit's return value
                let text = if self.function_depth == 0 {
                    format!("_sly_last = {lowered}")
                } else {
                    lowered
                };
                self.statement_line(&text, "expression", &position, None);
            }
            Statement::Assignment(node) => {
                let value = self.expr(&node.value)?;
                match &node.target {
                    AssignTarget::Identifier(ident) => {
                        let name = mangle(&ident.name);
                        if name != ident.name {
                            self.map.add_variable_mapping(VariableMapping {
                                original_name: ident.name.clone(),
                                generated_name: name.clone(),
                                scope: self.scope_label(),
                            });
                        }
                        self.statement_line(
                            &format!("{name} = {value}"),
                            "assignment",
                            &node.position,
                            Some(&ident.name),
                        );
                    }
                    AssignTarget::Member(member) => {
                        // attribute writes stay ungated; the shape was fixed
                        // at generation time
                        self.check_attribute(&member.property)?;
                        let object = self.expr(&member.object)?;
                        self.statement_line(
                            &format!("{object}[{}] = {value}", python_string(&member.property.name)),
                            "member-write",
                            &node.position,
                            Some(&member.property.name),
                        );
                    }
                    AssignTarget::Index(index) => {
                        let object = self.expr(&index.object)?;
                        let subscript = self.expr(&index.index)?;
                        self.statement_line(
                            &format!("{object}[{subscript}] = {value}"),
                            "index-write",
                            &node.position,
                            None,
                        );
                    }
                }
            }
            Statement::Destructure(node) => {
                let value = self.expr(&node.value)?;
                let names: Vec<String> = node.names.iter().map(|name| mangle(&name.name)).collect();
                let text = match node.kind {
                    crate::ast::PatternKind::Array => {
                        format!("{} = {value}", names.join(", "))
                    }
                    crate::ast::PatternKind::Object => {
                        let keys: Vec<String> = node
                            .names
                            .iter()
                            .map(|name| python_string(&name.name))
                            .collect();
                        format!("{} = _sly_pick({value}, {})", names.join(", "), keys.join(", "))
                    }
                };
                self.statement_line(&text, "destructure", &node.position, None);
            }
            Statement::FunctionDef(def) => {
                let name = mangle(&def.name.name);
                let params: Vec<String> =
                    def.params.iter().map(|param| mangle(&param.name.name)).collect();

                let column = self.emitter.column();
                let generated_start =
                    self.emitter.line(&format!("def {name}({}):", params.join(", ")));
                self.record(
                    generated_start,
                    column,
                    "function",
                    &def.position,
                    Some(&def.name.name),
                );

                self.push_frame(&def.name.name, &def.body.statements);
                for param in &def.params {
                    self.frames
                        .last_mut()
                        .expect("frame just pushed")
                        .names
                        .insert(param.name.name.clone());
                    if !self.suppress_maps {
                        self.map.add_variable_mapping(VariableMapping {
                            original_name: param.name.name.clone(),
                            generated_name: mangle(&param.name.name),
                            scope: def.name.name.clone(),
                        });
                    }
                }

                self.function_depth += 1;
                let outer_loop_depth = std::mem::take(&mut self.loop_depth);
                self.emitter.indent();
                self.block_body(&def.body)?;
                self.emitter.dedent();
                self.loop_depth = outer_loop_depth;
                self.function_depth -= 1;
                self.frames.pop();

                let generated_end = self.emitter.next_line() - 1;
                let original_end = def
                    .body
                    .statements
                    .last()
                    .map(|statement| statement.position().line)
                    .unwrap_or(def.position.line);
                if !self.suppress_maps {
                    self.map.add_function_range(FunctionRange {
                        name: def.name.name.clone(),
                        original_start: def.position.line,
                        original_end,
                        generated_start,
                        generated_end,
                    });
                }
            }
            Statement::If(node) => {
                // all conditions lower first so any hoisted definitions land
                // ahead of the chain instead of between its arms
                let condition = self.expr(&node.condition)?;
                let mut elif_conditions = vec![];
                for elif in &node.elif_clauses {
                    elif_conditions.push(self.expr(&elif.condition)?);
                }

                self.statement_line(&format!("if {condition}:"), "if", &node.position, None);
                self.emitter.indent();
                self.block_body(&node.then_block)?;
                self.emitter.dedent();

                for (elif, condition) in node.elif_clauses.iter().zip(elif_conditions) {
                    self.statement_line(&format!("elif {condition}:"), "elif", &elif.position, None);
                    self.emitter.indent();
                    self.block_body(&elif.block)?;
                    self.emitter.dedent();
                }

                if let Some(else_block) = &node.else_block {
                    self.statement_line("else:", "else", &else_block.position, None);
                    self.emitter.indent();
                    self.block_body(else_block)?;
                    self.emitter.dedent();
                }
            }
            Statement::While(node) => {
                let condition = self.expr(&node.condition)?;
                self.statement_line(&format!("while {condition}:"), "while", &node.position, None);
                self.loop_depth += 1;
                self.emitter.indent();
                self.block_body(&node.body)?;
                self.emitter.dedent();
                self.loop_depth -= 1;
            }
            Statement::For(node) => {
                let iterable = self.expr(&node.iterable)?;
                let variable = mangle(&node.variable.name);
                self.statement_line(
                    &format!("for {variable} in {iterable}:"),
                    "for",
                    &node.position,
                    Some(&node.variable.name),
                );
                self.loop_depth += 1;
                self.emitter.indent();
                self.block_body(&node.body)?;
                self.emitter.dedent();
                self.loop_depth -= 1;
            }
            Statement::Try(node) => {
                self.statement_line("try:", "try", &node.position, None);
                self.emitter.indent();
                self.block_body(&node.body)?;
                self.emitter.dedent();

                for (index, clause) in node.except_clauses.iter().enumerate() {
                    match &clause.binding {
                        Some(binding) => {
                            let caught = format!("_sly_exc_{index}");
                            self.statement_line(
                                &format!("except Exception as {caught}:"),
                                "except",
                                &clause.position,
                                Some(&binding.name),
                            );
                            self.emitter.indent();
                            let bound = mangle(&binding.name);
                            self.emitter
                                .line(&format!("{bound} = _sly_exc_value({caught})"));
                            self.block_body_statements(&clause.body)?;
                            self.emitter.dedent();
                        }
                        None => {
                            self.statement_line(
                                "except Exception:",
                                "except",
                                &clause.position,
                                None,
                            );
                            self.emitter.indent();
                            self.block_body(&clause.body)?;
                            self.emitter.dedent();
                        }
                    }
                }

                if let Some(finally_block) = &node.finally_block {
                    self.statement_line("finally:", "finally", &finally_block.position, None);
                    self.emitter.indent();
                    self.block_body(finally_block)?;
                    self.emitter.dedent();
                }
            }
            Statement::Throw(node) => {
                let value = self.expr(&node.value)?;
                self.statement_line(
                    &format!("raise _SlyError({value})"),
                    "throw",
                    &node.position,
                    None,
                );
            }
            Statement::Return(node) => {
                if self.function_depth == 0 {
                    return Err(CodegenError::new(
                        "'return' outside of a function",
                        node.position.clone(),
                    ));
                }
                let text = match &node.value {
                    Some(value) => format!("return {}", self.expr(value)?),
                    None => "return".to_owned(),
                };
                self.statement_line(&text, "return", &node.position, None);
            }
            Statement::Break(node) => {
                if self.loop_depth == 0 {
                    return Err(CodegenError::new(
                        "'break' outside of a loop",
                        node.position.clone(),
                    ));
                }
                self.statement_line("break", "break", &node.position, None);
            }
            Statement::Continue(node) => {
                if self.loop_depth == 0 {
                    return Err(CodegenError::new(
                        "'continue' outside of a loop",
                        node.position.clone(),
                    ));
                }
                self.statement_line("continue", "continue", &node.position, None);
            }
            Statement::Import(node) => {
                let value = self
                    .resolver
                    .resolve(&node.name.name, std::path::Path::new(&self.unit.file))
                    .map_err(|error| {
                        CodegenError::new(error.to_string(), node.position.clone())
                            .with_suggestion("check the module name and the extension paths")
                    })?;

                for capability in value.required_capabilities() {
                    if !self.declared_capabilities.contains(&capability) {
                        self.warnings.push(
                            Violation::new(
                                ViolationKind::MissingCapability,
                                Severity::Warning,
                                format!(
                                    "module '{}' requires capability '{capability}' at runtime, but no capability block declares it",
                                    node.name.name
                                ),
                                node.position.clone(),
                            )
                            .with_suggestion(format!(
                                "declare `capability {capability} {{ ... }}` or grant the token when running",
                            )),
                        );
                    }
                }

                let binding = mangle(&node.binding().name);
                self.statement_line(
                    &format!("{binding} = _sly_import({})", python_string(&node.name.name)),
                    "import",
                    &node.position,
                    Some(&node.binding().name),
                );
            }
            Statement::Nonlocal(node) => {
                if self.function_depth == 0 {
                    return Err(CodegenError::new(
                        "'nonlocal' outside of a function",
                        node.position.clone(),
                    ));
                }
                let name = mangle(&node.name.name);
                self.statement_line(
                    &format!("nonlocal {name}"),
                    "nonlocal",
                    &node.position,
                    Some(&node.name.name),
                );
            }
            // lifted to module load in `generate`
            Statement::Capability(_) => {}
        }
        Ok(())
    }

    fn block_body(&mut self, block: &Block) -> CResult<()> {
        if block.statements.is_empty()
            || block
                .statements
                .iter()
                .all(|statement| matches!(statement, Statement::Capability(_)))
        {
            self.emitter.line("pass");
            return Ok(());
        }
        for statement in &block.statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    /// Like [`Self::block_body`] but never emits a lone `pass`; used where a
    /// binding line was already emitted into the suite.
    fn block_body_statements(&mut self, block: &Block) -> CResult<()> {
        for statement in &block.statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn expr(&mut self, expression: &Expression) -> CResult<String> {
        match expression {
            Expression::Literal(node) => Ok(match &node.value {
                LiteralValue::Number(value) => python_number(*value),
                LiteralValue::String(value) => python_string(value),
                LiteralValue::Bool(true) => "True".to_owned(),
                LiteralValue::Bool(false) => "False".to_owned(),
                LiteralValue::Null => "None".to_owned(),
            }),
            Expression::Array(node) => {
                let elements: Vec<String> = node
                    .elements
                    .iter()
                    .map(|element| self.expr(element))
                    .collect::<CResult<_>>()?;
                Ok(format!("[{}]", elements.join(", ")))
            }
            Expression::Object(node) => {
                let entries: Vec<String> = node
                    .entries
                    .iter()
                    .map(|entry| {
                        Ok(format!(
                            "{}: {}",
                            python_string(&entry.key),
                            self.expr(&entry.value)?
                        ))
                    })
                    .collect::<CResult<_>>()?;
                Ok(format!("{{{}}}", entries.join(", ")))
            }
            Expression::Identifier(node) => {
                if self.is_defined(&node.name) || builtins::is_allowed(&node.name) {
                    Ok(mangle(&node.name))
                } else {
                    Err(CodegenError::new(
                        format!("unknown name '{}'", node.name),
                        node.position.clone(),
                    )
                    .with_suggestion(
                        "only locals, imports and whitelisted builtins can be referenced",
                    ))
                }
            }
            Expression::Member(node) => {
                // reads go through the safe-access gate
                self.check_attribute(&node.property)?;
                let object = self.expr(&node.object)?;
                Ok(format!(
                    "_sly_attr({object}, {})",
                    python_string(&node.property.name)
                ))
            }
            Expression::Index(node) => {
                let object = self.expr(&node.object)?;
                let index = self.expr(&node.index)?;
                Ok(format!("{object}[{index}]"))
            }
            Expression::Slice(node) => {
                let object = self.expr(&node.object)?;
                let start = node
                    .start
                    .as_ref()
                    .map(|start| self.expr(start))
                    .transpose()?
                    .unwrap_or_default();
                let stop = node
                    .stop
                    .as_ref()
                    .map(|stop| self.expr(stop))
                    .transpose()?
                    .unwrap_or_default();
                match &node.step {
                    Some(step) => {
                        let step = self.expr(step)?;
                        Ok(format!("{object}[{start}:{stop}:{step}]"))
                    }
                    None => Ok(format!("{object}[{start}:{stop}]")),
                }
            }
            Expression::Call(node) => {
                let args: Vec<String> = node
                    .args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<CResult<_>>()?;
                let args = args.join(", ");

                match node.callee.as_ref() {
                    Expression::Identifier(callee) => {
                        if self.is_defined(&callee.name) {
                            Ok(format!("{}({args})", mangle(&callee.name)))
                        } else if builtins::is_allowed(&callee.name) {
                            Ok(format!("{}({args})", callee.name))
                        } else {
                            Err(CodegenError::new(
                                format!("call to unknown function '{}'", callee.name),
                                callee.position.clone(),
                            )
                            .with_suggestion(
                                "define the function, import a module providing it, or use a whitelisted builtin",
                            ))
                        }
                    }
                    Expression::Member(member) => {
                        self.check_attribute(&member.property)?;
                        let object = self.expr(&member.object)?;
                        Ok(format!(
                            "_sly_attr({object}, {})({args})",
                            python_string(&member.property.name)
                        ))
                    }
                    other => {
                        let callee = self.expr(other)?;
                        Ok(format!("({callee})({args})"))
                    }
                }
            }
            Expression::Unary(node) => {
                let operand = self.expr(&node.operand)?;
                Ok(match node.op {
                    crate::ast::UnaryOp::Neg => format!("(-{operand})"),
                    crate::ast::UnaryOp::Not => format!("(not {operand})"),
                })
            }
            Expression::Binary(node) => {
                let lhs = self.expr(&node.lhs)?;
                let rhs = self.expr(&node.rhs)?;
                let op = match node.op {
                    crate::ast::BinaryOp::Add => "+",
                    crate::ast::BinaryOp::Sub => "-",
                    crate::ast::BinaryOp::Mul => "*",
                    crate::ast::BinaryOp::Div => "/",
                    crate::ast::BinaryOp::FloorDiv => "//",
                    crate::ast::BinaryOp::Mod => "%",
                };
                Ok(format!("({lhs} {op} {rhs})"))
            }
            Expression::Logical(node) => {
                let lhs = self.expr(&node.lhs)?;
                let rhs = self.expr(&node.rhs)?;
                let op = match node.op {
                    crate::ast::LogicalOp::And => "and",
                    crate::ast::LogicalOp::Or => "or",
                };
                Ok(format!("({lhs} {op} {rhs})"))
            }
            Expression::Compare(node) => {
                let lhs = self.expr(&node.lhs)?;
                let rhs = self.expr(&node.rhs)?;
                let op = match node.op {
                    crate::ast::CompareOp::Eq => "==",
                    crate::ast::CompareOp::Ne => "!=",
                    crate::ast::CompareOp::Lt => "<",
                    crate::ast::CompareOp::Le => "<=",
                    crate::ast::CompareOp::Gt => ">",
                    crate::ast::CompareOp::Ge => ">=",
                };
                Ok(format!("({lhs} {op} {rhs})"))
            }
            Expression::Ternary(node) => {
                let condition = self.expr(&node.condition)?;
                let then_branch = self.expr(&node.then_branch)?;
                let else_branch = self.expr(&node.else_branch)?;
                Ok(format!("({then_branch} if {condition} else {else_branch})"))
            }
            Expression::Arrow(node) => self.arrow(node),
        }
    }

    fn arrow(&mut self, node: &crate::ast::Arrow) -> CResult<String> {
        let params: Vec<String> = node
            .params
            .iter()
            .map(|param| mangle(&param.name.name))
            .collect();

        match &node.body {
            ArrowBody::Expression(body) => {
                let mut names = HashSet::new();
                for param in &node.params {
                    names.insert(param.name.name.clone());
                }
                let scope_id = self.scope_counter;
                self.scope_counter += 1;
                self.frames.push(Frame {
                    names,
                    scope_id,
                    label: "arrow".to_owned(),
                });
                self.function_depth += 1;
                let body = self.expr(body);
                self.function_depth -= 1;
                self.frames.pop();
                Ok(format!("(lambda {}: {})", params.join(", "), body?))
            }
            ArrowBody::Block(block) => {
                // a block body cannot live in a lambda; hoist a synthesized
                // def in front of the enclosing statement
                let name = format!("_sly_arrow_{}", self.arrow_counter);
                self.arrow_counter += 1;

                let mut hoisted_emitter = Emitter::new();
                std::mem::swap(&mut self.emitter, &mut hoisted_emitter);
                let was_suppressed = self.suppress_maps;
                self.suppress_maps = true;

                self.emitter.line(&format!("def {name}({}):", params.join(", ")));
                self.push_frame("arrow", &block.statements);
                for param in &node.params {
                    self.frames
                        .last_mut()
                        .expect("frame just pushed")
                        .names
                        .insert(param.name.name.clone());
                }
                self.function_depth += 1;
                let outer_loop_depth = std::mem::take(&mut self.loop_depth);
                self.emitter.indent();
                let body = self.block_body(block);
                self.emitter.dedent();
                self.loop_depth = outer_loop_depth;
                self.function_depth -= 1;
                self.frames.pop();

                self.suppress_maps = was_suppressed;
                std::mem::swap(&mut self.emitter, &mut hoisted_emitter);
                body?;

                let lines: Vec<String> = hoisted_emitter
                    .finish()
                    .lines()
                    .map(str::to_owned)
                    .collect();
                self.emitter.hoist(lines);
                Ok(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;

    fn generate_source(source: &str) -> GeneratedModule {
        let unit = SourceUnit::new("test.sly", source);
        let ast = parse(&unit).unwrap();
        generate(&unit, &ast, &Resolver::new()).unwrap()
    }

    fn generate_error(source: &str) -> CodegenError {
        let unit = SourceUnit::new("test.sly", source);
        let ast = parse(&unit).unwrap();
        generate(&unit, &ast, &Resolver::new()).unwrap_err()
    }

    #[test]
    fn test_empty_unit_compiles_to_empty_module() {
        let module = generate_source("");
        assert_eq!(module.code, "# generated from test.sly\n");
        assert!(module.source_map.mappings.is_empty());
    }

    #[test]
    fn test_arithmetic_assignment() {
        let module = generate_source("x = 1 + 2 * 3;");
        assert!(module.code.contains("x = (1 + (2 * 3))"), "{}", module.code);
    }

    #[test]
    fn test_member_read_is_gated_but_write_is_not() {
        let module = generate_source("obj = {a: 1}; obj.a = 42; y = obj.a;");
        assert!(module.code.contains(r#"obj["a"] = 42"#), "{}", module.code);
        assert!(module.code.contains(r#"y = _sly_attr(obj, "a")"#), "{}", module.code);
    }

    #[test]
    fn test_index_stays_direct() {
        let module = generate_source("arr = [1, 2, 3]; arr[0] = 99; z = arr[1];");
        assert!(module.code.contains("arr[0] = 99"), "{}", module.code);
        assert!(module.code.contains("z = arr[1]"), "{}", module.code);
    }

    #[test]
    fn test_dunder_attribute_is_rejected() {
        let error = generate_error("x = obj.__class__;");
        assert!(error.message.contains("__class__"));
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let error = generate_error("x = not_defined_anywhere;");
        assert!(error.message.contains("not_defined_anywhere"));
    }

    #[test]
    fn test_forward_reference_within_module_resolves() {
        let module = generate_source("function f() { return g(); }\nfunction g() { return 1; }\nf();");
        assert!(module.code.contains("def f():"), "{}", module.code);
    }

    #[test]
    fn test_unknown_call_is_rejected() {
        let error = generate_error("mystery();");
        assert!(error.message.contains("mystery"));
    }

    #[test]
    fn test_builtin_calls_are_allowed() {
        let module = generate_source("print(len([1, 2]));");
        assert!(module.code.contains("print(len([1, 2]))"), "{}", module.code);
    }

    #[test]
    fn test_short_circuit_operators() {
        let module = generate_source("x = a() && b() || !c;\nfunction a() { return true; }\nfunction b() { return false; }\nc = true;");
        assert!(module.code.contains("((a() and b()) or (not c))"), "{}", module.code);
    }

    #[test]
    fn test_ternary_lowering() {
        let module = generate_source("a = 1; b = 2; m = a < b ? a : b;");
        assert!(module.code.contains("(a if (a < b) else b)"), "{}", module.code);
    }

    #[test]
    fn test_if_elif_else_structure() {
        let module = generate_source("a = 1;\nif (a == 1) { x = 1; } elif (a == 2) { x = 2; } else { x = 3; }");
        let code = module.code;
        assert!(code.contains("if (a == 1):"), "{code}");
        assert!(code.contains("elif (a == 2):"), "{code}");
        assert!(code.contains("else:"), "{code}");
    }

    #[test]
    fn test_try_except_finally() {
        let module =
            generate_source("function f() { try { throw {code: 1}; } except (e) { return e.code; } finally { log(\"done\"); } }");
        let code = module.code;
        assert!(code.contains("raise _SlyError({\"code\": 1})"), "{code}");
        assert!(code.contains("except Exception as _sly_exc_0:"), "{code}");
        assert!(code.contains("e = _sly_exc_value(_sly_exc_0)"), "{code}");
        assert!(code.contains("finally:"), "{code}");
    }

    #[test]
    fn test_arrow_expression_body() {
        let module = generate_source("double = (x) => x * 2;");
        assert!(module.code.contains("double = (lambda x: (x * 2))"), "{}", module.code);
    }

    #[test]
    fn test_arrow_block_body_is_hoisted() {
        let module = generate_source("f = (a, b) => { return a + b; };");
        let code = module.code;
        let def_at = code.find("def _sly_arrow_0(a, b):").expect("hoisted def");
        let use_at = code.find("f = _sly_arrow_0").expect("assignment");
        assert!(def_at < use_at, "{code}");
    }

    #[test]
    fn test_destructuring() {
        let module = generate_source("[a, b] = [1, 2]; {x, y} = {x: 1, y: 2};");
        assert!(module.code.contains("a, b = [1, 2]"), "{}", module.code);
        assert!(
            module.code.contains(r#"x, y = _sly_pick({"x": 1, "y": 2}, "x", "y")"#),
            "{}",
            module.code
        );
    }

    #[test]
    fn test_import_lowering_and_capability_warning() {
        let module = generate_source("import regex;");
        assert!(module.code.contains(r#"regex = _sly_import("regex")"#), "{}", module.code);
        assert_eq!(module.warnings.len(), 1);
        assert_eq!(module.warnings[0].kind, ViolationKind::MissingCapability);
        assert_eq!(module.warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_declared_capability_silences_warning() {
        let module = generate_source(
            "capability regex.match { resource \"*\"; }\nimport regex;",
        );
        assert!(module.warnings.is_empty(), "{:?}", module.warnings);
        assert!(module.code.contains("_sly_declare_capability(\"regex.match\""), "{}", module.code);
    }

    #[test]
    fn test_unknown_import_fails() {
        let error = generate_error("import no_such_module;");
        assert!(error.message.contains("no_such_module"));
    }

    #[test]
    fn test_python_keyword_is_mangled() {
        let module = generate_source("class = 1; print(class);");
        assert!(module.code.contains("class__s = 1"), "{}", module.code);
        let mapped = module
            .source_map
            .debug_info
            .variable_mappings
            .iter()
            .any(|mapping| mapping.original_name == "class" && mapping.generated_name == "class__s");
        assert!(mapped);
    }

    #[test]
    fn test_source_map_records_return_lines() {
        let module = generate_source("function f(n) {\n    return n;\n}");
        let has_return = module
            .source_map
            .mappings
            .iter()
            .any(|mapping| mapping.node_type == "return" && mapping.original_line == 2);
        assert!(has_return, "{:?}", module.source_map.mappings);
    }

    #[test]
    fn test_source_map_function_ranges() {
        let module = generate_source("function f() { return 1; }");
        let range = &module.source_map.debug_info.function_ranges[0];
        assert_eq!(range.name, "f");
        assert!(range.generated_end > range.generated_start);
    }

    #[test]
    fn test_codegen_is_deterministic() {
        let source = "capability c { resource \"/tmp/*\"; }\nfunction f(n) { return n + 1; }\nprint(f(1));";
        let first = generate_source(source);
        let second = generate_source(source);
        assert_eq!(first.code, second.code);
        assert_eq!(
            serde_json::to_string(&first.source_map).unwrap(),
            serde_json::to_string(&second.source_map).unwrap()
        );
    }

    #[test]
    fn test_module_level_expression_captures_value() {
        let module = generate_source("1 + 2;");
        assert!(module.code.contains("_sly_last = (1 + 2)"), "{}", module.code);
    }
}

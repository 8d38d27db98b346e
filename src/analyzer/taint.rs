//! Data-flow / taint tracking.
//!
//! Values flowing from taint sources (network, filesystem, external input)
//! are tracked through assignments, destructuring, parameters, returns and
//! control-flow joins into sinks. External callables use the declared
//! summaries of the stdlib registry; calls within the unit are followed
//! interprocedurally with a recursion guard.
//!
//! The analysis under-approximates on purpose: a global read inside a
//! function body is treated as untainted rather than guessed, so a clean
//! program never produces a spurious critical violation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::ast::{
    ArrowBody, AssignTarget, Ast, Block, Expression, FunctionDef, Position, Statement,
};
use crate::registry::{builtins, stdlib, CallEffect};

use super::violation::{Severity, Violation, ViolationKind};

/// Lattice of provenance values: `None < Sanitized < Tainted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Taint {
    None,
    Sanitized,
    Tainted(BTreeSet<String>),
}

impl Taint {
    pub fn tainted(label: String) -> Taint {
        let mut sources = BTreeSet::new();
        sources.insert(label);
        Taint::Tainted(sources)
    }

    pub fn is_tainted(&self) -> bool {
        matches!(self, Taint::Tainted(_))
    }

    /// Least upper bound; tainted source sets union.
    pub fn join(&self, other: &Taint) -> Taint {
        match (self, other) {
            (Taint::Tainted(a), Taint::Tainted(b)) => {
                Taint::Tainted(a.union(b).cloned().collect())
            }
            (Taint::Tainted(sources), _) | (_, Taint::Tainted(sources)) => {
                Taint::Tainted(sources.clone())
            }
            (Taint::Sanitized, _) | (_, Taint::Sanitized) => Taint::Sanitized,
            (Taint::None, Taint::None) => Taint::None,
        }
    }

    fn sources(&self) -> Vec<String> {
        match self {
            Taint::Tainted(sources) => sources.iter().cloned().collect(),
            _ => vec![],
        }
    }
}

/// Per-unit digest kept in the analysis cache: which functions return
/// tainted data when called with clean arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintSummary {
    pub tainted_returns: BTreeMap<String, Vec<String>>,
}

/// Names that act as code-execution sinks even though they resolve to
/// nothing in the program; the detector flags them too, the tracker reports
/// the data path into them.
const CODE_SINKS: &[&str] = &["eval", "exec", "compile"];

enum Callable<'a> {
    Function(&'a FunctionDef),
}

struct Env {
    frames: Vec<HashMap<String, Taint>>,
}

impl Env {
    fn new() -> Self {
        Env {
            frames: vec![HashMap::new()],
        }
    }

    fn get(&self, name: &str) -> Taint {
        for frame in self.frames.iter().rev() {
            if let Some(taint) = frame.get(name) {
                return taint.clone();
            }
        }
        Taint::None
    }

    fn set(&mut self, name: &str, taint: Taint) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_owned(), taint);
        }
    }

    fn snapshot(&self) -> Vec<HashMap<String, Taint>> {
        self.frames.clone()
    }

    fn restore(&mut self, frames: Vec<HashMap<String, Taint>>) {
        self.frames = frames;
    }

    /// Join another snapshot of the same shape into the current frames.
    fn join(&mut self, other: &[HashMap<String, Taint>]) {
        join_frames(&mut self.frames, other);
    }
}

fn join_frames(frames: &mut [HashMap<String, Taint>], other: &[HashMap<String, Taint>]) {
    for (frame, other_frame) in frames.iter_mut().zip(other) {
        for (name, taint) in other_frame {
            let joined = frame
                .get(name)
                .map(|current| current.join(taint))
                .unwrap_or_else(|| taint.clone());
            frame.insert(name.clone(), joined);
        }
    }
}

pub struct TaintTracker<'a> {
    functions: HashMap<String, Callable<'a>>,
    imports: HashMap<String, String>,
    violations: Vec<Violation>,
    summaries: HashMap<String, Taint>,
    active: Vec<String>,
}

impl<'a> TaintTracker<'a> {
    pub fn track(ast: &'a Ast) -> (TaintSummary, Vec<Violation>) {
        trace!("tracking taint through '{}'", ast.position.file);

        let mut tracker = TaintTracker {
            functions: HashMap::new(),
            imports: HashMap::new(),
            violations: vec![],
            summaries: HashMap::new(),
            active: vec![],
        };
        tracker.collect(&ast.statements);

        // module body first, then every function on its own with clean
        // arguments, so flows inside uncalled functions surface too
        let mut env = Env::new();
        tracker.run_statements(&ast.statements, &mut env);

        let names: Vec<String> = tracker.functions.keys().cloned().collect();
        let mut tainted_returns = BTreeMap::new();
        for name in names {
            let result = tracker.call_function(&name, &[]);
            if let Taint::Tainted(_) = &result {
                tainted_returns.insert(name, result.sources());
            }
        }

        (TaintSummary { tainted_returns }, tracker.violations)
    }

    fn collect(&mut self, statements: &'a [Statement]) {
        for statement in statements {
            match statement {
                Statement::FunctionDef(def) => {
                    self.functions
                        .insert(def.name.name.clone(), Callable::Function(def));
                    self.collect(&def.body.statements);
                }
                Statement::Import(import) => {
                    self.imports
                        .insert(import.binding().name.clone(), import.name.name.clone());
                }
                Statement::If(node) => {
                    self.collect(&node.then_block.statements);
                    for elif in &node.elif_clauses {
                        self.collect(&elif.block.statements);
                    }
                    if let Some(block) = &node.else_block {
                        self.collect(&block.statements);
                    }
                }
                Statement::While(node) => self.collect(&node.body.statements),
                Statement::For(node) => self.collect(&node.body.statements),
                Statement::Try(node) => {
                    self.collect(&node.body.statements);
                    for clause in &node.except_clauses {
                        self.collect(&clause.body.statements);
                    }
                    if let Some(block) = &node.finally_block {
                        self.collect(&block.statements);
                    }
                }
                _ => {}
            }
        }
    }

    /// Interprocedural call into a unit-local function; memoized per
    /// argument-taint signature, recursion returns the bottom value.
    fn call_function(&mut self, name: &str, args: &[Taint]) -> Taint {
        let signature = format!("{name}/{args:?}");
        if let Some(result) = self.summaries.get(&signature) {
            return result.clone();
        }
        if self.active.iter().any(|active| active == &signature) {
            return Taint::None;
        }

        let def: &'a FunctionDef = match self.functions.get(name) {
            Some(Callable::Function(def)) => def,
            None => return Taint::None,
        };

        self.active.push(signature.clone());

        let mut env = Env::new();
        for (index, param) in def.params.iter().enumerate() {
            let taint = args.get(index).cloned().unwrap_or(Taint::None);
            env.set(&param.name.name, taint);
        }

        let result = self.run_statements(&def.body.statements, &mut env);

        self.active.pop();
        self.summaries.insert(signature, result.clone());
        result
    }

    /// Run a statement list, returning the join of all `return` values seen.
    fn run_statements(&mut self, statements: &[Statement], env: &mut Env) -> Taint {
        let mut returned = Taint::None;
        for statement in statements {
            returned = returned.join(&self.run_statement(statement, env));
        }
        returned
    }

    fn run_block(&mut self, block: &Block, env: &mut Env) -> Taint {
        self.run_statements(&block.statements, env)
    }

    fn run_statement(&mut self, statement: &Statement, env: &mut Env) -> Taint {
        match statement {
            Statement::Expression(expression) => {
                self.eval(expression, env);
                Taint::None
            }
            Statement::Assignment(node) => {
                let taint = self.eval(&node.value, env);
                match &node.target {
                    AssignTarget::Identifier(ident) => env.set(&ident.name, taint),
                    AssignTarget::Member(member) => {
                        if let Expression::Identifier(base) = member.object.as_ref() {
                            let joined = env.get(&base.name).join(&taint);
                            env.set(&base.name, joined);
                        }
                    }
                    AssignTarget::Index(index) => {
                        if let Expression::Identifier(base) = index.object.as_ref() {
                            let joined = env.get(&base.name).join(&taint);
                            env.set(&base.name, joined);
                        }
                    }
                }
                Taint::None
            }
            Statement::Destructure(node) => {
                let taint = self.eval(&node.value, env);
                for name in &node.names {
                    env.set(&name.name, taint.clone());
                }
                Taint::None
            }
            Statement::FunctionDef(_) => Taint::None,
            Statement::If(node) => {
                self.eval(&node.condition, env);
                for elif in &node.elif_clauses {
                    self.eval(&elif.condition, env);
                }
                let before = env.snapshot();

                let mut arms: Vec<&Block> = vec![&node.then_block];
                for elif in &node.elif_clauses {
                    arms.push(&elif.block);
                }
                if let Some(else_block) = &node.else_block {
                    arms.push(else_block);
                }

                let mut joined: Option<Vec<HashMap<String, Taint>>> = None;
                let mut returned = Taint::None;
                for arm in arms {
                    env.restore(before.clone());
                    returned = returned.join(&self.run_block(arm, env));
                    let after = env.snapshot();
                    match joined.as_mut() {
                        Some(acc) => join_frames(acc, &after),
                        None => joined = Some(after),
                    }
                }

                // the whole chain may be skipped unless an else arm exists
                let mut result = joined.unwrap_or_else(|| before.clone());
                if node.else_block.is_none() {
                    join_frames(&mut result, &before);
                }
                env.restore(result);
                returned
            }
            Statement::While(node) => {
                self.eval(&node.condition, env);
                let before = env.snapshot();
                // two passes propagate loop-carried taint to a fixed point
                // for this lattice
                let mut returned = self.run_block(&node.body, env);
                returned = returned.join(&self.run_block(&node.body, env));
                env.join(&before);
                returned
            }
            Statement::For(node) => {
                let iterable = self.eval(&node.iterable, env);
                env.set(&node.variable.name, iterable);
                let before = env.snapshot();
                let mut returned = self.run_block(&node.body, env);
                returned = returned.join(&self.run_block(&node.body, env));
                env.join(&before);
                returned
            }
            Statement::Try(node) => {
                let mut returned = self.run_block(&node.body, env);
                let after_body = env.snapshot();
                for clause in &node.except_clauses {
                    if let Some(binding) = &clause.binding {
                        env.set(&binding.name, Taint::None);
                    }
                    returned = returned.join(&self.run_block(&clause.body, env));
                    env.join(&after_body);
                }
                if let Some(finally_block) = &node.finally_block {
                    returned = returned.join(&self.run_block(finally_block, env));
                }
                returned
            }
            Statement::Throw(node) => {
                self.eval(&node.value, env);
                Taint::None
            }
            Statement::Return(node) => match &node.value {
                Some(value) => self.eval(value, env),
                None => Taint::None,
            },
            Statement::Break(_)
            | Statement::Continue(_)
            | Statement::Import(_)
            | Statement::Nonlocal(_)
            | Statement::Capability(_) => Taint::None,
        }
    }

    fn eval(&mut self, expression: &Expression, env: &mut Env) -> Taint {
        match expression {
            Expression::Literal(_) => Taint::None,
            Expression::Identifier(ident) => env.get(&ident.name),
            Expression::Array(node) => node
                .elements
                .iter()
                .fold(Taint::None, |taint, element| {
                    taint.join(&self.eval(element, env))
                }),
            Expression::Object(node) => node.entries.iter().fold(Taint::None, |taint, entry| {
                taint.join(&self.eval(&entry.value, env))
            }),
            Expression::Member(node) => self.eval(&node.object, env),
            Expression::Index(node) => {
                let object = self.eval(&node.object, env);
                self.eval(&node.index, env);
                object
            }
            Expression::Slice(node) => {
                let object = self.eval(&node.object, env);
                for component in [&node.start, &node.stop, &node.step].into_iter().flatten() {
                    self.eval(component, env);
                }
                object
            }
            Expression::Call(node) => self.eval_call(node, env),
            Expression::Unary(node) => self.eval(&node.operand, env),
            Expression::Binary(node) => {
                let lhs = self.eval(&node.lhs, env);
                let rhs = self.eval(&node.rhs, env);
                lhs.join(&rhs)
            }
            Expression::Logical(node) => {
                let lhs = self.eval(&node.lhs, env);
                let rhs = self.eval(&node.rhs, env);
                lhs.join(&rhs)
            }
            Expression::Compare(node) => {
                let lhs = self.eval(&node.lhs, env);
                let rhs = self.eval(&node.rhs, env);
                lhs.join(&rhs)
            }
            Expression::Ternary(node) => {
                self.eval(&node.condition, env);
                let then_branch = self.eval(&node.then_branch, env);
                let else_branch = self.eval(&node.else_branch, env);
                then_branch.join(&else_branch)
            }
            Expression::Arrow(node) => {
                // evaluate the body for sink detection; the closure value
                // itself carries no taint
                match &node.body {
                    ArrowBody::Expression(expression) => {
                        self.eval(expression, env);
                    }
                    ArrowBody::Block(block) => {
                        self.run_statements(&block.statements, env);
                    }
                }
                Taint::None
            }
        }
    }

    fn eval_call(&mut self, call: &crate::ast::Call, env: &mut Env) -> Taint {
        let args: Vec<Taint> = call.args.iter().map(|arg| self.eval(arg, env)).collect();
        let joined_args = args
            .iter()
            .fold(Taint::None, |taint, arg| taint.join(arg));

        match call.callee.as_ref() {
            Expression::Identifier(ident) => {
                let name = ident.name.as_str();

                if CODE_SINKS.contains(&name) {
                    self.check_sink(name, "code", &args, &call.position);
                    return Taint::None;
                }
                if let Some(effect) = builtins::effect(name) {
                    return self.apply_effect(name, effect, &args, joined_args, &call.position);
                }
                if self.functions.contains_key(name) {
                    let name = name.to_owned();
                    return self.call_function(&name, &args);
                }
                joined_args
            }
            Expression::Member(member) => {
                if let Expression::Identifier(base) = member.object.as_ref() {
                    let module = self
                        .imports
                        .get(&base.name)
                        .cloned()
                        .unwrap_or_else(|| base.name.clone());
                    if let Some(symbol) = stdlib::symbol(&module, &member.property.name) {
                        let qualified = format!("{module}.{}", member.property.name);
                        return self.apply_effect(
                            &qualified,
                            symbol.effect,
                            &args,
                            joined_args,
                            &call.position,
                        );
                    }
                }
                // method call on an arbitrary object: taint flows through
                self.eval(&member.object, env).join(&joined_args)
            }
            other => {
                self.eval(other, env);
                joined_args
            }
        }
    }

    fn apply_effect(
        &mut self,
        name: &str,
        effect: CallEffect,
        args: &[Taint],
        joined_args: Taint,
        position: &Position,
    ) -> Taint {
        match effect {
            CallEffect::Pure => joined_args,
            CallEffect::Sanitizer => Taint::Sanitized,
            CallEffect::Source(kind) => {
                Taint::tainted(format!("{kind} via {name} ({position})"))
            }
            CallEffect::Sink(kind) => {
                self.check_sink(name, kind, args, position);
                Taint::None
            }
        }
    }

    fn check_sink(&mut self, name: &str, kind: &str, args: &[Taint], position: &Position) {
        let sources: Vec<String> = args
            .iter()
            .filter(|arg| arg.is_tainted())
            .flat_map(|arg| arg.sources())
            .collect();
        if sources.is_empty() {
            return;
        }

        self.violations.push(
            Violation::new(
                ViolationKind::TaintedSink,
                Severity::Critical,
                format!(
                    "tainted value reaches {kind} sink '{name}': {}",
                    sources.join(", ")
                ),
                position.clone(),
            )
            .with_cwe("CWE-20")
            .with_suggestion("sanitize the value before passing it on"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse, SourceUnit};

    fn track_source(source: &str) -> (TaintSummary, Vec<Violation>) {
        let ast = parse(&SourceUnit::new("test.sly", source)).unwrap();
        TaintTracker::track(&ast)
    }

    #[test]
    fn test_clean_program_is_silent() {
        let (_, violations) =
            track_source("x = 1 + 2;\nfunction f(n) { return n * 2; }\ny = f(x);");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_source_to_sink_through_assignment() {
        let (_, violations) =
            track_source("import net;\ndata = net.fetch(\"https://x\");\nimport db;\ndb.query(data);");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Critical);
        assert!(violations[0].message.contains("network"));
    }

    #[test]
    fn test_sanitizer_clears_taint() {
        let (_, violations) = track_source(
            "import net;\nimport regex;\nimport db;\nraw = net.fetch(\"https://x\");\nclean = regex.escape(raw);\ndb.query(clean);",
        );
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_taint_through_function_return() {
        let (summary, violations) = track_source(
            "import net;\nimport db;\nfunction load() { return net.fetch(\"https://x\"); }\ndb.query(load());",
        );
        assert_eq!(violations.len(), 1);
        assert!(summary.tainted_returns.contains_key("load"));
    }

    #[test]
    fn test_taint_through_parameters() {
        let (_, violations) = track_source(
            "import net;\nimport db;\nfunction save(value) { db.query(value); }\nsave(net.fetch(\"https://x\"));",
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_join_at_if() {
        let (_, violations) = track_source(
            "import net;\nimport db;\nx = \"safe\";\nif (c) { x = net.fetch(\"https://x\"); }\ndb.query(x);",
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_destructuring_propagates() {
        let (_, violations) = track_source(
            "import net;\nimport db;\n[a, b] = [net.fetch(\"https://x\"), 2];\ndb.query(a);",
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_input_is_external_source() {
        let (_, violations) = track_source("import db;\nname = input(\"who?\");\ndb.query(name);");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("external"));
    }

    #[test]
    fn test_recursion_terminates() {
        let (_, violations) =
            track_source("function f(n) { if (n == 0) { return 0; } return f(n - 1); }\nf(3);");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_loop_carried_taint() {
        let (_, violations) = track_source(
            "import net;\nimport db;\nacc = \"\";\nfor (u in urls) { acc = acc + net.fetch(u); }\ndb.query(acc);",
        );
        assert_eq!(violations.len(), 1);
    }
}

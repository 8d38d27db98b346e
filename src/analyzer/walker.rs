//! Structural AST walk: scope resolution and shape checks.

use log::trace;

use crate::ast::{
    ArrowBody, AssignTarget, Ast, Block, Destructure, Elif, Expression, PatternKind, Statement,
};
use crate::registry::builtins;

use super::scope::{ScopeKind, ScopeStack, ScopeSummary, SymbolKind};
use super::violation::{Severity, Violation, ViolationKind};

/// Visitor that resolves scopes and reports structural mis-uses: `nonlocal`
/// without a binding target, `break`/`continue` outside a loop, `return`
/// outside a function, destructuring arity mismatches against literals.
pub struct Walker {
    scopes: ScopeStack,
    violations: Vec<Violation>,
    loop_depth: usize,
}

impl Walker {
    pub fn walk(ast: &Ast) -> (ScopeSummary, Vec<Violation>) {
        trace!("walking ast of '{}'", ast.position.file);
        let mut walker = Walker {
            scopes: ScopeStack::new(),
            violations: vec![],
            loop_depth: 0,
        };

        for name in builtins::names() {
            walker.scopes.declare(name, SymbolKind::Builtin);
        }

        walker.visit_statements(&ast.statements);

        (walker.scopes.into_summary(), walker.violations)
    }

    fn violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Visit a statement list, hoisting function names first so mutual
    /// recursion between sibling functions resolves.
    fn visit_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            if let Statement::FunctionDef(def) = statement {
                self.scopes.declare(&def.name.name, SymbolKind::Local);
            }
        }
        for statement in statements {
            self.visit_statement(statement);
        }
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Expression(expression) => self.visit_expression(expression),
            Statement::Assignment(node) => {
                self.visit_expression(&node.value);
                match &node.target {
                    AssignTarget::Identifier(ident) => {
                        // without a `nonlocal` declaration in this frame, an
                        // inner assignment creates a new local
                        if !self.scopes.declared_here(&ident.name) {
                            self.scopes.declare(&ident.name, SymbolKind::Local);
                        }
                    }
                    AssignTarget::Member(member) => self.visit_expression(&member.object),
                    AssignTarget::Index(index) => {
                        self.visit_expression(&index.object);
                        self.visit_expression(&index.index);
                    }
                }
            }
            Statement::Destructure(node) => self.visit_destructure(node),
            Statement::FunctionDef(def) => {
                self.scopes.declare(&def.name.name, SymbolKind::Local);
                self.scopes.push(ScopeKind::Function);
                for param in &def.params {
                    self.scopes.declare(&param.name.name, SymbolKind::Parameter);
                }
                let outer_loop_depth = std::mem::take(&mut self.loop_depth);
                self.visit_statements(&def.body.statements);
                self.loop_depth = outer_loop_depth;
                self.scopes.pop();
            }
            Statement::If(node) => {
                self.visit_expression(&node.condition);
                self.visit_block(&node.then_block);
                for elif in &node.elif_clauses {
                    self.visit_elif(elif);
                }
                if let Some(else_block) = &node.else_block {
                    self.visit_block(else_block);
                }
            }
            Statement::While(node) => {
                self.visit_expression(&node.condition);
                self.loop_depth += 1;
                self.visit_block(&node.body);
                self.loop_depth -= 1;
            }
            Statement::For(node) => {
                self.visit_expression(&node.iterable);
                self.scopes.declare(&node.variable.name, SymbolKind::Local);
                self.loop_depth += 1;
                self.visit_block(&node.body);
                self.loop_depth -= 1;
            }
            Statement::Try(node) => {
                self.visit_block(&node.body);
                for clause in &node.except_clauses {
                    if let Some(binding) = &clause.binding {
                        self.scopes.declare(&binding.name, SymbolKind::Local);
                    }
                    self.visit_block(&clause.body);
                }
                if let Some(finally_block) = &node.finally_block {
                    self.visit_block(finally_block);
                }
            }
            Statement::Throw(node) => self.visit_expression(&node.value),
            Statement::Return(node) => {
                if !self.scopes.in_function() {
                    self.violation(Violation::new(
                        ViolationKind::StructureError,
                        Severity::Error,
                        "'return' outside of a function",
                        node.position.clone(),
                    ));
                }
                if let Some(value) = &node.value {
                    self.visit_expression(value);
                }
            }
            Statement::Break(node) => {
                if self.loop_depth == 0 {
                    self.violation(Violation::new(
                        ViolationKind::StructureError,
                        Severity::Error,
                        "'break' outside of a loop",
                        node.position.clone(),
                    ));
                }
            }
            Statement::Continue(node) => {
                if self.loop_depth == 0 {
                    self.violation(Violation::new(
                        ViolationKind::StructureError,
                        Severity::Error,
                        "'continue' outside of a loop",
                        node.position.clone(),
                    ));
                }
            }
            Statement::Import(node) => {
                self.scopes
                    .declare(&node.binding().name, SymbolKind::Import);
            }
            Statement::Nonlocal(node) => {
                match self.scopes.nonlocal_target(&node.name.name) {
                    Some(_) => {
                        self.scopes.declare(&node.name.name, SymbolKind::Nonlocal);
                    }
                    None => self.violation(
                        Violation::new(
                            ViolationKind::ScopeError,
                            Severity::Error,
                            format!(
                                "no binding for nonlocal '{}' in an enclosing function",
                                node.name.name
                            ),
                            node.position.clone(),
                        )
                        .with_suggestion(format!(
                            "assign '{}' in an enclosing function before declaring it nonlocal",
                            node.name.name
                        )),
                    ),
                }
            }
            Statement::Capability(_) => {}
        }
    }

    fn visit_elif(&mut self, elif: &Elif) {
        self.visit_expression(&elif.condition);
        self.visit_block(&elif.block);
    }

    fn visit_block(&mut self, block: &Block) {
        self.visit_statements(&block.statements);
    }

    fn visit_destructure(&mut self, node: &Destructure) {
        self.visit_expression(&node.value);

        // arity is checkable at compile time only against a literal
        match (&node.kind, &node.value) {
            (PatternKind::Array, Expression::Array(array)) => {
                if array.elements.len() != node.names.len() {
                    self.violation(Violation::new(
                        ViolationKind::StructureError,
                        Severity::Error,
                        format!(
                            "destructuring expects {} values but the array literal has {}",
                            node.names.len(),
                            array.elements.len()
                        ),
                        node.position.clone(),
                    ));
                }
            }
            (PatternKind::Object, Expression::Object(object)) => {
                for name in &node.names {
                    if !object.entries.iter().any(|entry| entry.key == name.name) {
                        self.violation(Violation::new(
                            ViolationKind::StructureError,
                            Severity::Error,
                            format!(
                                "destructuring binds '{}' but the object literal has no such key",
                                name.name
                            ),
                            name.position.clone(),
                        ));
                    }
                }
            }
            _ => {}
        }

        for name in &node.names {
            self.scopes.declare(&name.name, SymbolKind::Local);
        }
    }

    fn visit_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Literal(_) | Expression::Identifier(_) => {}
            Expression::Array(node) => {
                for element in &node.elements {
                    self.visit_expression(element);
                }
            }
            Expression::Object(node) => {
                for entry in &node.entries {
                    self.visit_expression(&entry.value);
                }
            }
            Expression::Member(node) => self.visit_expression(&node.object),
            Expression::Index(node) => {
                self.visit_expression(&node.object);
                self.visit_expression(&node.index);
            }
            Expression::Slice(node) => {
                self.visit_expression(&node.object);
                for component in [&node.start, &node.stop, &node.step].into_iter().flatten() {
                    self.visit_expression(component);
                }
            }
            Expression::Call(node) => {
                self.visit_expression(&node.callee);
                for arg in &node.args {
                    self.visit_expression(arg);
                }
            }
            Expression::Unary(node) => self.visit_expression(&node.operand),
            Expression::Binary(node) => {
                self.visit_expression(&node.lhs);
                self.visit_expression(&node.rhs);
            }
            Expression::Logical(node) => {
                self.visit_expression(&node.lhs);
                self.visit_expression(&node.rhs);
            }
            Expression::Compare(node) => {
                self.visit_expression(&node.lhs);
                self.visit_expression(&node.rhs);
            }
            Expression::Ternary(node) => {
                self.visit_expression(&node.condition);
                self.visit_expression(&node.then_branch);
                self.visit_expression(&node.else_branch);
            }
            Expression::Arrow(node) => {
                self.scopes.push(ScopeKind::Function);
                for param in &node.params {
                    self.scopes.declare(&param.name.name, SymbolKind::Parameter);
                }
                match &node.body {
                    ArrowBody::Expression(expression) => self.visit_expression(expression),
                    ArrowBody::Block(block) => {
                        let outer_loop_depth = std::mem::take(&mut self.loop_depth);
                        self.visit_statements(&block.statements);
                        self.loop_depth = outer_loop_depth;
                    }
                }
                self.scopes.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse, SourceUnit};

    fn walk_source(source: &str) -> Vec<Violation> {
        let ast = parse(&SourceUnit::new("test.sly", source)).unwrap();
        Walker::walk(&ast).1
    }

    #[test]
    fn test_clean_program_has_no_violations() {
        let violations =
            walk_source("function f(n) { return n + 1; }\nx = f(1);\nwhile (x < 10) { x = x + 1; }");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_break_outside_loop() {
        let violations = walk_source("break;");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::StructureError);
        assert_eq!(violations[0].severity, Severity::Error);
    }

    #[test]
    fn test_continue_outside_loop_inside_function() {
        let violations = walk_source("function f() { continue; }");
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_break_does_not_leak_into_nested_function() {
        // a function body starts a fresh loop context
        let violations = walk_source("while (true) { f = () => { break; }; }");
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_return_outside_function() {
        let violations = walk_source("return 1;");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("return"));
    }

    #[test]
    fn test_nonlocal_without_binding() {
        let violations = walk_source("function f() { nonlocal missing; }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::ScopeError);
    }

    #[test]
    fn test_nonlocal_with_binding() {
        let violations = walk_source(
            "function outer() { count = 0; function inner() { nonlocal count; count = count + 1; } }",
        );
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_destructure_arity_mismatch() {
        let violations = walk_source("[a, b, c] = [1, 2];");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("3 values"));
    }

    #[test]
    fn test_destructure_missing_object_key() {
        let violations = walk_source("{x, y} = {x: 1};");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("'y'"));
    }

    #[test]
    fn test_destructure_against_non_literal_is_not_checked() {
        let violations = walk_source("pair = f();\n[a, b] = pair;");
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_scope_summary_records_symbols() {
        let ast = parse(&SourceUnit::new(
            "test.sly",
            "function f(a, b) { c = a + b; return c; }",
        ))
        .unwrap();
        let (summary, _) = Walker::walk(&ast);
        let function_scope = summary
            .scopes
            .iter()
            .find(|scope| scope.kind == ScopeKind::Function)
            .unwrap();
        let names: Vec<_> = function_scope
            .symbols
            .iter()
            .map(|symbol| symbol.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

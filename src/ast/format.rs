//! Canonical source rendering for the AST.
//!
//! Formatting is deterministic and reparse-stable: parsing the formatted
//! output yields a structurally equivalent AST (node kinds and child order;
//! positions differ). Operator operands that are themselves operator
//! expressions are parenthesized, which keeps the original nesting without
//! tracking precedence here.

use super::{
    ArrowBody, AssignTarget, Ast, Block, Expression, LiteralValue, Statement,
};

impl Ast {
    /// Render this AST back to canonical Sly source.
    pub fn to_source(&self) -> String {
        let mut writer = SourceWriter::default();
        for statement in &self.statements {
            writer.statement(statement);
        }
        writer.out
    }
}

#[derive(Default)]
struct SourceWriter {
    out: String,
    indent: usize,
}

impl SourceWriter {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn statement(&mut self, statement: &Statement) {
        self.line_start();
        match statement {
            Statement::Expression(expression) => {
                self.expression(expression);
                self.push(";\n");
            }
            Statement::Assignment(node) => {
                match &node.target {
                    AssignTarget::Identifier(ident) => self.push(&ident.name),
                    AssignTarget::Member(member) => {
                        self.operand(&member.object);
                        self.push(".");
                        self.push(&member.property.name);
                    }
                    AssignTarget::Index(index) => {
                        self.operand(&index.object);
                        self.push("[");
                        self.expression(&index.index);
                        self.push("]");
                    }
                }
                self.push(" = ");
                self.expression(&node.value);
                self.push(";\n");
            }
            Statement::Destructure(node) => {
                let (open, close) = match node.kind {
                    super::PatternKind::Array => ("[", "]"),
                    super::PatternKind::Object => ("{", "}"),
                };
                self.push(open);
                for (i, name) in node.names.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(&name.name);
                }
                self.push(close);
                self.push(" = ");
                self.expression(&node.value);
                self.push(";\n");
            }
            Statement::FunctionDef(node) => {
                self.push("function ");
                self.push(&node.name.name);
                self.push("(");
                for (i, param) in node.params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(&param.name.name);
                }
                self.push(") ");
                self.block(&node.body);
                self.push("\n");
            }
            Statement::If(node) => {
                self.push("if (");
                self.expression(&node.condition);
                self.push(") ");
                self.block(&node.then_block);
                for elif in &node.elif_clauses {
                    self.push(" elif (");
                    self.expression(&elif.condition);
                    self.push(") ");
                    self.block(&elif.block);
                }
                if let Some(else_block) = &node.else_block {
                    self.push(" else ");
                    self.block(else_block);
                }
                self.push("\n");
            }
            Statement::While(node) => {
                self.push("while (");
                self.expression(&node.condition);
                self.push(") ");
                self.block(&node.body);
                self.push("\n");
            }
            Statement::For(node) => {
                self.push("for (");
                self.push(&node.variable.name);
                self.push(" in ");
                self.expression(&node.iterable);
                self.push(") ");
                self.block(&node.body);
                self.push("\n");
            }
            Statement::Try(node) => {
                self.push("try ");
                self.block(&node.body);
                for clause in &node.except_clauses {
                    self.push(" except ");
                    if let Some(binding) = &clause.binding {
                        self.push("(");
                        self.push(&binding.name);
                        self.push(") ");
                    }
                    self.block(&clause.body);
                }
                if let Some(finally_block) = &node.finally_block {
                    self.push(" finally ");
                    self.block(finally_block);
                }
                self.push("\n");
            }
            Statement::Throw(node) => {
                self.push("throw ");
                self.expression(&node.value);
                self.push(";\n");
            }
            Statement::Return(node) => {
                self.push("return");
                if let Some(value) = &node.value {
                    self.push(" ");
                    self.expression(value);
                }
                self.push(";\n");
            }
            Statement::Break(_) => self.push("break;\n"),
            Statement::Continue(_) => self.push("continue;\n"),
            Statement::Import(node) => {
                self.push("import ");
                self.push(&node.name.name);
                if let Some(alias) = &node.alias {
                    self.push(" as ");
                    self.push(&alias.name);
                }
                self.push(";\n");
            }
            Statement::Nonlocal(node) => {
                self.push("nonlocal ");
                self.push(&node.name.name);
                self.push(";\n");
            }
            Statement::Capability(node) => {
                self.push("capability ");
                self.push(&node.name.name);
                self.push(" {\n");
                self.indent += 1;
                for resource in &node.resources {
                    self.line_start();
                    self.push("resource ");
                    self.string_literal(&resource.pattern);
                    self.push(";\n");
                }
                for allow in &node.allows {
                    self.line_start();
                    self.push("allow ");
                    self.push(&allow.operation.name);
                    self.push(" ");
                    self.string_literal(&allow.target);
                    self.push(";\n");
                }
                self.indent -= 1;
                self.line_start();
                self.push("}\n");
            }
        }
    }

    fn block(&mut self, block: &Block) {
        if block.statements.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{\n");
        self.indent += 1;
        for statement in &block.statements {
            self.statement(statement);
        }
        self.indent -= 1;
        self.line_start();
        self.push("}");
    }

    fn expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Literal(node) => match &node.value {
                LiteralValue::Number(value) => self.number(*value),
                LiteralValue::String(value) => self.string_literal(value),
                LiteralValue::Bool(value) => self.push(if *value { "true" } else { "false" }),
                LiteralValue::Null => self.push("null"),
            },
            Expression::Array(node) => {
                self.push("[");
                for (i, element) in node.elements.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expression(element);
                }
                self.push("]");
            }
            Expression::Object(node) => {
                self.push("{");
                for (i, entry) in node.entries.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    if is_plain_key(&entry.key) {
                        self.push(&entry.key);
                    } else {
                        self.string_literal(&entry.key);
                    }
                    self.push(": ");
                    self.expression(&entry.value);
                }
                self.push("}");
            }
            Expression::Identifier(node) => self.push(&node.name),
            Expression::Member(node) => {
                self.operand(&node.object);
                self.push(".");
                self.push(&node.property.name);
            }
            Expression::Index(node) => {
                self.operand(&node.object);
                self.push("[");
                self.expression(&node.index);
                self.push("]");
            }
            Expression::Slice(node) => {
                self.operand(&node.object);
                self.push("[");
                if let Some(start) = &node.start {
                    self.expression(start);
                }
                self.push(":");
                if let Some(stop) = &node.stop {
                    self.expression(stop);
                }
                if let Some(step) = &node.step {
                    self.push(":");
                    self.expression(step);
                }
                self.push("]");
            }
            Expression::Call(node) => {
                self.operand(&node.callee);
                self.push("(");
                for (i, arg) in node.args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expression(arg);
                }
                self.push(")");
            }
            Expression::Unary(node) => {
                self.push(&node.op.to_string());
                self.operand(&node.operand);
            }
            Expression::Binary(node) => {
                self.operand(&node.lhs);
                self.push(&format!(" {} ", node.op));
                self.operand(&node.rhs);
            }
            Expression::Logical(node) => {
                self.operand(&node.lhs);
                self.push(&format!(" {} ", node.op));
                self.operand(&node.rhs);
            }
            Expression::Compare(node) => {
                self.operand(&node.lhs);
                self.push(&format!(" {} ", node.op));
                self.operand(&node.rhs);
            }
            Expression::Ternary(node) => {
                self.operand(&node.condition);
                self.push(" ? ");
                self.operand(&node.then_branch);
                self.push(" : ");
                self.operand(&node.else_branch);
            }
            Expression::Arrow(node) => {
                self.push("(");
                for (i, param) in node.params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(&param.name.name);
                }
                self.push(") => ");
                match &node.body {
                    ArrowBody::Expression(expression) => self.operand(expression),
                    ArrowBody::Block(block) => self.block(block),
                }
            }
        }
    }

    /// Write a sub-expression, parenthesized when it is itself an operator
    /// expression so the original nesting survives reparsing.
    fn operand(&mut self, expression: &Expression) {
        if needs_parens(expression) {
            self.push("(");
            self.expression(expression);
            self.push(")");
        } else {
            self.expression(expression);
        }
    }

    fn number(&mut self, value: f64) {
        if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
            self.push(&format!("{}", value as i64));
        } else {
            self.push(&format!("{value}"));
        }
    }

    fn string_literal(&mut self, value: &str) {
        self.push("\"");
        for c in value.chars() {
            match c {
                '"' => self.push("\\\""),
                '\\' => self.push("\\\\"),
                '\n' => self.push("\\n"),
                '\t' => self.push("\\t"),
                '\r' => self.push("\\r"),
                _ => self.out.push(c),
            }
        }
        self.push("\"");
    }
}

fn needs_parens(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Unary(_)
            | Expression::Binary(_)
            | Expression::Logical(_)
            | Expression::Compare(_)
            | Expression::Ternary(_)
            | Expression::Arrow(_)
    )
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use crate::ast::{parse, SourceUnit};

    fn roundtrip(source: &str) {
        let first = parse(&SourceUnit::new("test.sly", source)).unwrap();
        let formatted = first.to_source();
        let second = parse(&SourceUnit::new("test.sly", &formatted)).unwrap();
        assert_eq!(
            formatted,
            second.to_source(),
            "formatting must be reparse-stable for {source}"
        );
    }

    #[test]
    fn test_roundtrip_arithmetic() {
        roundtrip("x = 1 + 2 * 3;");
        roundtrip("y = (1 + 2) * 3;");
        roundtrip("z = 7 // 2 % 3;");
    }

    #[test]
    fn test_roundtrip_control_flow() {
        roundtrip("if (a && b || !c) { x = 1; } elif (d) { x = 2; } else { x = 3; }");
        roundtrip("while (i < 10) { i = i + 1; if (i == 5) { break; } }");
        roundtrip("for (item in [1, 2, 3]) { print(item); }");
    }

    #[test]
    fn test_roundtrip_functions() {
        roundtrip("function f(n) { if (n <= 1) { return n; } return f(n - 1) + f(n - 2); }");
        roundtrip("g = (x) => x * 2; h = (a, b) => { return a + b; };");
    }

    #[test]
    fn test_roundtrip_try_throw() {
        roundtrip("try { throw {code: 1}; } except (e) { return e.code; } finally { log(\"done\"); }");
    }

    #[test]
    fn test_roundtrip_data() {
        roundtrip("a = [1, \"two\", true, null]; o = {x: 1, \"y z\": 2}; s = a[1:2:3];");
    }

    #[test]
    fn test_roundtrip_capability() {
        roundtrip("capability files { resource \"/tmp/**\"; allow read \"*\"; }");
    }

    #[test]
    fn test_roundtrip_ternary_and_slices() {
        roundtrip("m = a < b ? a : b; t = xs[:]; u = xs[::2];");
    }
}
